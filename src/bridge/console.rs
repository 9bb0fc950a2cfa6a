//! Console chat adapter
//!
//! Renders segment operations on stdout so the bridge can be driven from a
//! terminal or from another program. Plain mode prints the text as it grows;
//! JSON mode prints one object per operation.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use crate::segment::{SegmentId, SegmentPublisher};
use crate::tracing::ResultTraceExt;
use crate::types::{BridgeError, Result};

#[derive(Debug, Serialize)]
struct ConsoleEvent<'a> {
    op: &'static str,
    id: &'a SegmentId,
    text: &'a str,
}

/// Segment publisher writing to stdout, or any other writer
pub struct ConsolePublisher {
    json: bool,
    rendered: Mutex<HashMap<SegmentId, String>>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl fmt::Debug for ConsolePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsolePublisher")
            .field("json", &self.json)
            .finish_non_exhaustive()
    }
}

impl ConsolePublisher {
    /// Create a stdout publisher; `json` selects JSON lines output
    pub fn new(json: bool) -> Self {
        Self::with_writer(json, io::stdout())
    }

    /// Create a publisher rendering into `out`
    pub fn with_writer(json: bool, out: impl Write + Send + 'static) -> Self {
        Self {
            json,
            rendered: Mutex::new(HashMap::new()),
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Render one operation and remember the message's latest content
    fn render(&self, op: &'static str, id: &SegmentId, text: &str) -> Result<String> {
        let mut rendered = self
            .rendered
            .lock()
            .map_err(|_| BridgeError::internal("console state poisoned"))?;
        let previous = rendered.insert(id.clone(), text.to_string());

        if self.json {
            let mut line = serde_json::to_string(&ConsoleEvent { op, id, text })?;
            line.push('\n');
            return Ok(line);
        }

        // Updates replace the whole message; print only what was appended
        Ok(match previous {
            None => format!("\n{text}"),
            Some(previous) => match text.strip_prefix(previous.as_str()) {
                Some(appended) => appended.to_string(),
                None => format!("\n{text}"),
            },
        })
    }

    fn emit(&self, output: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| BridgeError::internal("console writer poisoned"))?;
        out.write_all(output.as_bytes())
            .and_then(|()| out.flush())
            .trace_context()
    }
}

#[async_trait]
impl SegmentPublisher for ConsolePublisher {
    async fn create_segment(&self, text: &str) -> Result<SegmentId> {
        let id = SegmentId::new(format!("seg-{}", uuid::Uuid::new_v4()));
        let output = self.render("create", &id, text)?;
        self.emit(&output)?;
        Ok(id)
    }

    async fn update_segment(&self, id: &SegmentId, text: &str) -> Result<()> {
        let output = self.render("update", id, text)?;
        self.emit(&output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;

    /// Writer whose bytes the test can read back
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_plain_mode_prints_appended_text() {
        let console = ConsolePublisher::new(false);
        let id = SegmentId::new("seg-1");

        assert_eq!(console.render("create", &id, "Thinking...").unwrap(), "\nThinking...");
        // The first update replaces the placeholder
        assert_eq!(console.render("update", &id, "> ls").unwrap(), "\n> ls");
        assert_eq!(console.render("update", &id, "> ls\nsrc\n").unwrap(), "\nsrc\n");
    }

    #[test]
    fn test_json_mode_prints_events() {
        let console = ConsolePublisher::new(true);
        let id = SegmentId::new("seg-1");

        let line = console.render("update", &id, "a \"quoted\"\nline").unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["op"], "update");
        assert_eq!(value["id"], "seg-1");
        assert_eq!(value["text"], "a \"quoted\"\nline");
    }

    #[tokio::test]
    async fn test_publishes_into_writer() {
        let captured = Captured::default();
        let console = ConsolePublisher::with_writer(false, captured.clone());

        let first = console.create_segment("Thinking...").await.unwrap();
        let second = console.create_segment("more").await.unwrap();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("seg-"));

        console.update_segment(&first, "Thinking... done").await.unwrap();
        assert_eq!(captured.text(), "\nThinking...\nmore done");
    }

    #[tokio::test]
    async fn test_write_failure_is_an_io_error() {
        let console = ConsolePublisher::with_writer(true, BrokenPipe);
        let err = console.create_segment("lost").await.unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
    }
}
