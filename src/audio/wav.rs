//! WAV encoding and decoding via hound.
//!
//! Captured audio is encoded to 16-bit mono WAV before being sent to the
//! transcription backend; synthesis backends return WAV bytes that are
//! decoded back into f32 samples for playback.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::audio::chunk::AudioClip;
use crate::error::{ParloError, Result};

/// Encodes mono f32 samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(|e| ParloError::Io(
            std::io::Error::other(format!("Failed to create WAV writer: {}", e)),
        ))?;
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value).map_err(|e| {
                ParloError::Io(std::io::Error::other(format!(
                    "Failed to write WAV sample: {}",
                    e
                )))
            })?;
        }
        writer.finalize().map_err(|e| {
            ParloError::Io(std::io::Error::other(format!(
                "Failed to finalize WAV: {}",
                e
            )))
        })?;
    }
    Ok(cursor.into_inner())
}

/// Decodes WAV bytes into a mono f32 clip. Multi-channel input is mixed
/// down by averaging. Accepts 16-bit integer and 32-bit float formats.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip> {
    let mut reader = WavReader::new(Cursor::new(bytes)).map_err(|e| ParloError::Protocol {
        message: format!("Invalid WAV data: {}", e),
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ParloError::Protocol {
                message: format!("Corrupt WAV samples: {}", e),
            })?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ParloError::Protocol {
                message: format!("Corrupt WAV samples: {}", e),
            })?,
        (format, bits) => {
            return Err(ParloError::Protocol {
                message: format!("Unsupported WAV format: {:?}/{} bits", format, bits),
            });
        }
    };

    let samples = if channels <= 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(AudioClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}
