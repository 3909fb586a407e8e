//! Incremental sentence splitting for streamed chat replies.
//!
//! Streamed deltas arrive a few tokens at a time; synthesis wants whole
//! sentences. The splitter buffers deltas and emits a sentence as soon as
//! a terminator is seen, so playback of the first sentence starts while
//! the rest of the reply is still being generated.

/// CJK sentence enders and newline split unconditionally.
const HARD_TERMINATORS: &[char] = &['。', '！', '？', '\n'];

/// ASCII enders split only when followed by whitespace, so decimals and
/// abbreviations inside a sentence survive.
const SOFT_TERMINATORS: &[char] = &['.', '!', '?'];

#[derive(Debug, Default)]
pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a delta and returns any complete sentences it closed off.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let mut sentences = Vec::new();

        loop {
            let Some(split_at) = self.find_split_point() else {
                break;
            };
            let rest = self.buffer.split_off(split_at);
            let sentence = std::mem::replace(&mut self.buffer, rest);
            let trimmed = sentence.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
        }
        sentences
    }

    /// Returns whatever is still buffered as a final sentence.
    pub fn flush(&mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.buffer);
        let trimmed = remainder.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Byte offset just past the first terminator that closes a sentence,
    /// or `None` if the buffer holds no complete sentence yet.
    fn find_split_point(&self) -> Option<usize> {
        let mut chars = self.buffer.char_indices().peekable();
        while let Some((offset, c)) = chars.next() {
            let end = offset + c.len_utf8();
            if HARD_TERMINATORS.contains(&c) {
                return Some(end);
            }
            if SOFT_TERMINATORS.contains(&c) {
                // Needs a following char to rule out a mid-number dot;
                // the flush call handles a terminator at stream end.
                if let Some(&(_, next)) = chars.peek()
                    && next.is_whitespace()
                {
                    return Some(end);
                }
            }
        }
        None
    }
}
