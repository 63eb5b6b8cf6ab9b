//! Per-endpoint frame filter

use std::collections::HashSet;

use crate::config::EndpointConfig;
use crate::media::{Frame, FrameTag};

/// Decides which frames an endpoint relays
#[derive(Debug, Clone)]
pub struct StreamFilter {
    video: bool,
    audio: bool,
    data: bool,
    metadata_blacklist: HashSet<String>,
}

impl Default for StreamFilter {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            data: true,
            metadata_blacklist: HashSet::new(),
        }
    }
}

impl StreamFilter {
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            video: config.video,
            audio: config.audio,
            data: config.data,
            metadata_blacklist: config.metadata_blacklist.iter().cloned().collect(),
        }
    }

    /// Whether the frame passes; raw frames always do
    pub fn allows(&self, frame: &Frame) -> bool {
        match &frame.tag {
            FrameTag::Raw => true,
            FrameTag::Video => self.video,
            FrameTag::Audio => self.audio,
            FrameTag::Data { key } => {
                self.data
                    && key
                        .as_deref()
                        .map_or(true, |key| !self.metadata_blacklist.contains(key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionRole, Direction};

    fn endpoint() -> EndpointConfig {
        EndpointConfig::new(ConnectionRole::Client, Direction::Output, ["a:1"])
    }

    #[test]
    fn test_default_allows_everything() {
        let filter = StreamFilter::from_config(&endpoint());

        assert!(filter.allows(&Frame::video(0, &b"v"[..])));
        assert!(filter.allows(&Frame::audio(0, &b"a"[..])));
        assert!(filter.allows(&Frame::data(0, Some("onMetaData"), &b"d"[..])));
        assert!(filter.allows(&Frame::raw(&b"r"[..])));
    }

    #[test]
    fn test_disabled_kinds() {
        let filter = StreamFilter::from_config(&endpoint().video(false).data(false));

        assert!(!filter.allows(&Frame::video(0, &b"v"[..])));
        assert!(filter.allows(&Frame::audio(0, &b"a"[..])));
        assert!(!filter.allows(&Frame::data(0, None, &b"d"[..])));
        // Raw bytes carry no kind to filter on
        assert!(filter.allows(&Frame::raw(&b"r"[..])));
    }

    #[test]
    fn test_metadata_blacklist() {
        let filter = StreamFilter::from_config(&endpoint().blacklist("onCuePoint"));

        assert!(!filter.allows(&Frame::data(0, Some("onCuePoint"), &b"d"[..])));
        assert!(filter.allows(&Frame::data(0, Some("onMetaData"), &b"d"[..])));
        assert!(filter.allows(&Frame::data(0, None, &b"d"[..])));
    }
}
