//! Bounded-length message segmentation
//!
//! Streamed chunks are appended to the current chat message until the next
//! chunk would push its rendered length (`prefix + text`, in characters) over
//! the cap. The chunk then goes into a fresh message. A chunk longer than a
//! whole message first fills the room left in the current one and the rest is
//! split over fresh messages. Only the first message of a turn carries the
//! prefix.

use std::sync::Arc;

use async_trait::async_trait;

use super::publisher::{SegmentId, SegmentPublisher};
use crate::stream::ChunkSink;
use crate::types::Result;

/// One chat message of a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Chat identifier, `None` while the create has not succeeded
    pub id: Option<SegmentId>,
    /// Text appended so far, without the prefix
    pub text: String,
    /// Only the first segment of a turn carries the prefix
    pub is_first: bool,
    len_chars: usize,
}

impl Segment {
    fn new(id: Option<SegmentId>, text: &str, is_first: bool) -> Self {
        Self {
            id,
            text: text.to_string(),
            is_first,
            len_chars: text.chars().count(),
        }
    }

    /// Length of the text in characters
    pub fn len_chars(&self) -> usize {
        self.len_chars
    }
}

/// Maps streamed chunks onto create/update operations
#[derive(Debug)]
pub struct MessageSegmenter {
    publisher: Arc<dyn SegmentPublisher>,
    prefix: String,
    prefix_len: usize,
    max_len: usize,
    current: Segment,
    finished: Vec<Segment>,
}

impl MessageSegmenter {
    /// Start a turn on an already posted placeholder message
    ///
    /// The placeholder (e.g. "Thinking...") is replaced by the first update.
    pub fn new(
        publisher: Arc<dyn SegmentPublisher>,
        initial: SegmentId,
        prefix: impl Into<String>,
        max_len: usize,
    ) -> Self {
        let prefix = prefix.into();
        Self {
            publisher,
            prefix_len: prefix.chars().count(),
            prefix,
            max_len: max_len.max(1),
            current: Segment::new(Some(initial), "", true),
            finished: Vec::new(),
        }
    }

    /// All segments of the turn, oldest first
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.finished.iter().chain(std::iter::once(&self.current))
    }

    /// Text of the whole turn without prefix
    pub fn text(&self) -> String {
        self.segments().map(|segment| segment.text.as_str()).collect()
    }

    fn rendered_len(&self, segment: &Segment) -> usize {
        let prefix_len = if segment.is_first { self.prefix_len } else { 0 };
        prefix_len + segment.len_chars
    }

    fn render(&self, segment: &Segment) -> String {
        if segment.is_first {
            format!("{}{}", self.prefix, segment.text)
        } else {
            segment.text.clone()
        }
    }

    /// Append a chunk, publishing the affected messages
    ///
    /// In-memory state always advances; the first publisher error, if any, is
    /// returned after the whole chunk has been processed.
    pub async fn push(&mut self, chunk: &str) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let chunk_len = chunk.chars().count();

        let room = self.max_len.saturating_sub(self.rendered_len(&self.current));
        if chunk_len <= room {
            self.current.text.push_str(chunk);
            self.current.len_chars += chunk_len;
            return self.publish_current().await;
        }

        let mut first_error = None;
        let mut rest = chunk;
        // Only a chunk no fresh message could hold is split into the current one
        if chunk_len > self.max_len && room > 0 {
            let (head, tail) = split_at_char(chunk, room);
            self.current.text.push_str(head);
            self.current.len_chars += room;
            if let Err(e) = self.publish_current().await {
                first_error.get_or_insert(e);
            }
            rest = tail;
        }

        for piece in split_chars(rest, self.max_len) {
            let next = Segment::new(None, piece, false);
            self.finished.push(std::mem::replace(&mut self.current, next));
            tracing::debug!(
                segment = self.finished.len() + 1,
                chars = self.current.len_chars,
                "Starting new message segment"
            );
            if let Err(e) = self.publish_current().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Update the current message, or create it if it has no id yet
    async fn publish_current(&mut self) -> Result<()> {
        let rendered = self.render(&self.current);
        if let Some(id) = &self.current.id {
            return self
                .publisher
                .update_segment(id, &rendered)
                .await
                .inspect_err(|e| tracing::warn!(segment_id = %id, error = %e, "Failed to update message"));
        }

        let id = self
            .publisher
            .create_segment(&rendered)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to create message"))?;
        self.current.id = Some(id);
        Ok(())
    }
}

#[async_trait]
impl ChunkSink for MessageSegmenter {
    async fn deliver(&mut self, chunk: String) -> Result<()> {
        self.push(&chunk).await
    }
}

/// Split after the first `chars` characters
fn split_at_char(text: &str, chars: usize) -> (&str, &str) {
    let end = text
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(index, _)| index);
    text.split_at(end)
}

/// Split `text` into pieces of at most `max_chars` characters
fn split_chars(text: &str, max_chars: usize) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let (piece, tail) = split_at_char(rest, max_chars);
        rest = tail;
        Some(piece)
    })
}
