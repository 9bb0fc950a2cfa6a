//! Chat message publishing seam
//!
//! The segmenter never talks to a chat platform directly; it issues
//! create/update operations through a [`SegmentPublisher`].

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::Result;

/// Identifier the chat system assigned to a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    /// Wrap a chat system identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Create/update operations on chat messages
#[async_trait]
pub trait SegmentPublisher: Send + Sync + fmt::Debug {
    /// Post a new message and return its identifier
    async fn create_segment(&self, text: &str) -> Result<SegmentId>;

    /// Replace the full content of an existing message
    async fn update_segment(&self, id: &SegmentId, text: &str) -> Result<()>;
}
