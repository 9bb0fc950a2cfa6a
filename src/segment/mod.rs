//! Chat message segmentation
//!
//! Keeps every chat message of a turn under the platform length cap while
//! preserving the streamed text exactly.

mod publisher;
mod segmenter;

pub use publisher::{SegmentId, SegmentPublisher};
pub use segmenter::{MessageSegmenter, Segment};

#[cfg(test)]
pub(crate) use publisher::recording::{RecordingPublisher, SegmentOp};
