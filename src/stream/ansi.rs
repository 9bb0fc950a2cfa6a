//! Terminal control sequence filtering
//!
//! Removes the escape sequences an interactive CLI paints its UI with
//! (colors, cursor movement, window titles) and stray C0 control characters,
//! keeping newlines and tabs.

use once_cell::sync::Lazy;
use regex::Regex;

/// Complete control sequences, tried in this order:
/// OSC terminated by BEL or ST, CSI (7-bit and C1 forms), nF escapes
/// such as `ESC ( B`, and two-character escapes other than a bare `ESC [`.
static CONTROL_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\x1B\][^\x07]*?(?:\x07|\x1B\\)",
        r"|(?:\x1B\[|\x{9B})[0-?]*[ -/]*[@-~]",
        r"|\x1B[ -/]+[0-~]",
        r"|\x1B[0-Z\\-~]",
    ))
    .expect("control sequence pattern is valid")
});

/// C0 controls other than tab and newline (including a stray ESC), plus DEL
static CONTROL_CHAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B-\x1F\x7F]").expect("control char pattern is valid")
});

/// A CSI or escape that has started but not yet reached its final byte
static INCOMPLETE_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\x1B(?:\[[0-?]*[ -/]*|[ -/]*)?|\x{9B}[0-?]*[ -/]*)$")
        .expect("incomplete sequence pattern is valid")
});

/// Longest CSI tail held back waiting for its final byte
const MAX_PENDING: usize = 256;

const OSC_START: &str = "\x1B]";

/// Strip control sequences from a complete piece of text
pub fn strip_ansi(text: &str) -> String {
    let without_sequences = CONTROL_SEQUENCE.replace_all(text, "");
    CONTROL_CHAR
        .replace_all(&without_sequences, "")
        .into_owned()
}

/// Byte length of an OSC payload including its BEL or ST terminator
fn osc_end(payload: &str) -> Option<usize> {
    let bel = payload.find('\x07').map(|i| i + 1);
    let st = payload.find("\x1B\\").map(|i| i + 2);
    match (bel, st) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Offset of the first OSC sequence that has no terminator yet
fn unterminated_osc(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = text[from..].find(OSC_START) {
        let start = from + offset;
        let payload = start + OSC_START.len();
        from = payload + osc_end(&text[payload..])?;
    }
    None
}

/// Streaming control sequence filter
///
/// A sequence split across two reads is held back until it is complete,
/// so neither half leaks into the output. An OSC sequence (titles,
/// hyperlinks) is dropped up to its terminator however long it runs.
#[derive(Debug, Default)]
pub struct AnsiFilter {
    pending: String,
    in_osc: bool,
}

impl AnsiFilter {
    /// Create a filter with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter the next piece of decoded text
    pub fn push(&mut self, text: &str) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.push_str(text);

        if self.in_osc {
            match osc_end(&input) {
                Some(end) => {
                    input.drain(..end);
                    self.in_osc = false;
                }
                None => {
                    self.hold_split_terminator(&input);
                    return String::new();
                }
            }
        }

        // Unterminated OSC: drop its payload and wait for BEL or ST
        if let Some(start) = unterminated_osc(&input) {
            self.hold_split_terminator(&input[start + OSC_START.len()..]);
            input.truncate(start);
            self.in_osc = true;
            return strip_ansi(&input);
        }

        if let Some(start) = input.rfind(['\x1B', '\u{9B}']) {
            let tail = &input[start..];
            if tail.len() <= MAX_PENDING && INCOMPLETE_SEQUENCE.is_match(tail) {
                self.pending = input.split_off(start);
            }
        }

        strip_ansi(&input)
    }

    /// Keep a trailing ESC, which may be the first half of an ST
    fn hold_split_terminator(&mut self, osc_payload: &str) {
        if osc_payload.ends_with('\x1B') {
            self.pending.push('\x1B');
        }
    }

    /// Filter whatever is still pending
    ///
    /// An OSC that never got its terminator is dropped.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        if std::mem::take(&mut self.in_osc) {
            return String::new();
        }
        strip_ansi(&pending)
    }

    /// Whether part of a sequence is being held back
    pub fn has_pending(&self) -> bool {
        self.in_osc || !self.pending.is_empty()
    }
}
