//! PCM sample containers shared by capture, recording, and playback.

use std::collections::VecDeque;

/// Fixed-length block of mono f32 samples delivered by the capture stream.
pub type AudioChunk = Vec<f32>;

/// Audio captured from the microphone by one or more recording sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl CapturedAudio {
    pub fn from_chunks(chunks: &[AudioChunk], sample_rate: u32) -> Self {
        let mut samples = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
        for chunk in chunks {
            samples.extend_from_slice(chunk);
        }
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Synthesized audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Bounded ring of the most recent chunks preceding confirmed speech.
///
/// The oldest chunk is evicted when the ring is full. `drain` hands the
/// contents over exactly once; the caller decides when that happens.
#[derive(Debug)]
pub struct PreBuffer {
    chunks: VecDeque<AudioChunk>,
    capacity: usize,
}

impl PreBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Creates a pre-buffer already holding `seed` chunks, evicting from
    /// the front if the seed exceeds capacity.
    pub fn seeded(capacity: usize, seed: Vec<AudioChunk>) -> Self {
        let mut buffer = Self::new(capacity);
        for chunk in seed {
            buffer.push(chunk);
        }
        buffer
    }

    pub fn push(&mut self, chunk: AudioChunk) {
        if self.capacity == 0 {
            return;
        }
        if self.chunks.len() == self.capacity {
            self.chunks.pop_front();
        }
        self.chunks.push_back(chunk);
    }

    /// Removes and returns all buffered chunks in arrival order.
    pub fn drain(&mut self) -> Vec<AudioChunk> {
        self.chunks.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
