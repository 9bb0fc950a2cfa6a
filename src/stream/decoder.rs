//! Incremental UTF-8 decoding
//!
//! Terminal reads split the byte stream at arbitrary points, so a multi-byte
//! character can straddle two reads. The decoder holds back an incomplete
//! trailing sequence until the next read instead of emitting replacement
//! characters for both halves. Genuinely invalid bytes still decode to U+FFFD.

/// Stateful lossy UTF-8 decoder
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next slice of bytes
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let complete = self.pending.len() - incomplete_tail_len(&self.pending);
        let tail = self.pending.split_off(complete);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Decode whatever is still pending; an unfinished sequence becomes U+FFFD
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }

    /// Number of bytes held back
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Length of a trailing sequence that is a valid prefix of a multi-byte character
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}
