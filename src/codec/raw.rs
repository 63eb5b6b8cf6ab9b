//! Pass-through framing: every chunk read is one untagged frame

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::CodecError;
use crate::media::Frame;

#[derive(Debug, Default, Clone, Copy)]
pub struct RawCodec;

impl Decoder for RawCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(Frame::raw(src.split().freeze())))
    }
}

impl Encoder<Frame> for RawCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        dst.extend_from_slice(&frame.data);
        Ok(())
    }
}
