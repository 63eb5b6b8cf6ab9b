//! Relayed frames
//!
//! A frame is the unit that flows from a source connection through the
//! endpoint fan-out into every sink queue.

use std::sync::Arc;

use bytes::Bytes;

/// Kind of a relayed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameTag {
    /// Untagged bytes; never filtered
    Raw,
    /// Video frame
    Video,
    /// Audio frame
    Audio,
    /// Data (script) frame, keyed by its leading AMF name when present
    Data { key: Option<Arc<str>> },
}

/// A frame to be relayed to sinks
///
/// Cheap to clone due to `Bytes` reference counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Type of frame
    pub tag: FrameTag,
    /// Timestamp in milliseconds (0 for raw frames)
    pub timestamp: u32,
    /// Frame payload
    pub data: Bytes,
}

impl Frame {
    /// Create an untagged frame
    pub fn raw(data: impl Into<Bytes>) -> Self {
        Self {
            tag: FrameTag::Raw,
            timestamp: 0,
            data: data.into(),
        }
    }

    /// Create a video frame
    pub fn video(timestamp: u32, data: impl Into<Bytes>) -> Self {
        Self {
            tag: FrameTag::Video,
            timestamp,
            data: data.into(),
        }
    }

    /// Create an audio frame
    pub fn audio(timestamp: u32, data: impl Into<Bytes>) -> Self {
        Self {
            tag: FrameTag::Audio,
            timestamp,
            data: data.into(),
        }
    }

    /// Create a data frame
    pub fn data(timestamp: u32, key: Option<&str>, data: impl Into<Bytes>) -> Self {
        Self {
            tag: FrameTag::Data {
                key: key.map(Arc::from),
            },
            timestamp,
            data: data.into(),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The data key, for data frames that carry one
    pub fn data_key(&self) -> Option<&str> {
        match &self.tag {
            FrameTag::Data { key } => key.as_deref(),
            _ => None,
        }
    }
}
