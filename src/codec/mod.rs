//! Link framing
//!
//! A codec cuts the byte stream read from a source link into [`Frame`]s and
//! turns frames back into bytes for sink links. Each link gets its own codec
//! instance, so per-link state (such as the FLV file header) starts fresh on
//! every reconnect.

pub mod flv;
pub mod raw;

use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::config::CodecKind;
use crate::media::Frame;

pub use flv::FlvCodec;
pub use raw::RawCodec;

/// Codec failures
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream does not follow the expected framing
    #[error("invalid stream: {0}")]
    Invalid(String),

    /// A frame does not fit the wire format
    #[error("frame of {0} bytes exceeds the maximum tag size")]
    FrameTooLarge(usize),
}

/// Codec selected by configuration
#[derive(Debug)]
pub enum LinkCodec {
    Raw(RawCodec),
    Flv(FlvCodec),
}

impl LinkCodec {
    /// Fresh codec state for a new link
    pub fn new(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Raw => LinkCodec::Raw(RawCodec),
            CodecKind::Flv => LinkCodec::Flv(FlvCodec::new()),
        }
    }
}

impl Decoder for LinkCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        match self {
            LinkCodec::Raw(codec) => codec.decode(src),
            LinkCodec::Flv(codec) => codec.decode(src),
        }
    }
}

impl Encoder<Frame> for LinkCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            LinkCodec::Raw(codec) => codec.encode(frame, dst),
            LinkCodec::Flv(codec) => codec.encode(frame, dst),
        }
    }
}
