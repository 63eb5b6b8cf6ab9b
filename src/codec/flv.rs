//! FLV tag framing
//!
//! ```text
//! File header (optional on input, written once per link on output):
//! +-----+---------+----------+-----------------+------------------+
//! | FLV | Ver(1)  | Flags(1) | DataOffset(4)   | PrevTagSize0(4)  |
//! +-----+---------+----------+-----------------+------------------+
//!
//! Tag:
//! +---------+-------------+-----------+--------+-------------+---------+------------------+
//! | Type(1) | DataSize(3) | TS(3)     | TSX(1) | StreamID(3) | Data(N) | PrevTagSize(4)   |
//! +---------+-------------+-----------+--------+-------------+---------+------------------+
//! ```
//!
//! Audio (8), video (9) and script data (18) tags become tagged frames. Any
//! other tag type is forwarded untouched as a raw frame holding the whole tag.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::CodecError;
use crate::media::{Frame, FrameTag};

const SIGNATURE: &[u8; 3] = b"FLV";
const FILE_HEADER_SIZE: usize = 9;
const TAG_HEADER_SIZE: usize = 11;
const PREV_TAG_SIZE: usize = 4;
const MAX_DATA_SIZE: usize = 0x00FF_FFFF;
/// Largest header padding accepted before the first tag
const MAX_DATA_OFFSET: usize = FILE_HEADER_SIZE + 1024;

const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;
const TAG_SCRIPT: u8 = 18;

/// AMF0 string marker, used to read the name of a script data tag
const AMF0_STRING: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Nothing read yet; the stream may open with a file header
    Start,
    /// Reading tags
    Tags,
}

/// FLV codec state for one link
#[derive(Debug)]
pub struct FlvCodec {
    stage: Stage,
    header_written: bool,
}

impl FlvCodec {
    pub fn new() -> Self {
        Self {
            stage: Stage::Start,
            header_written: false,
        }
    }

    /// Consume the file header if the stream opens with one
    ///
    /// Returns false when more bytes are needed to decide.
    fn skip_file_header(&mut self, src: &mut BytesMut) -> Result<bool, CodecError> {
        let prefix = src.len().min(SIGNATURE.len());
        if src[..prefix] != SIGNATURE[..prefix] {
            // Headerless stream, starts directly with a tag
            self.stage = Stage::Tags;
            return Ok(true);
        }
        if src.len() < FILE_HEADER_SIZE {
            return Ok(false);
        }

        let version = src[3];
        if version != 1 {
            return Err(CodecError::Invalid(format!(
                "unsupported FLV version {version}"
            )));
        }
        let data_offset = u32::from_be_bytes([src[5], src[6], src[7], src[8]]) as usize;
        if data_offset < FILE_HEADER_SIZE {
            return Err(CodecError::Invalid(format!(
                "FLV data offset {data_offset} is shorter than the header"
            )));
        }
        if data_offset > MAX_DATA_OFFSET {
            return Err(CodecError::Invalid(format!(
                "FLV data offset {data_offset} exceeds {MAX_DATA_OFFSET}"
            )));
        }

        let skip = data_offset + PREV_TAG_SIZE;
        if src.len() < skip {
            return Ok(false);
        }

        src.advance(skip);
        self.stage = Stage::Tags;
        Ok(true)
    }

    fn write_file_header(dst: &mut BytesMut) {
        dst.reserve(FILE_HEADER_SIZE + PREV_TAG_SIZE);
        dst.put_slice(SIGNATURE);
        dst.put_u8(1);
        // Audio and video present
        dst.put_u8(0x05);
        dst.put_u32(FILE_HEADER_SIZE as u32);
        dst.put_u32(0);
    }
}

impl Default for FlvCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u24(bytes: &[u8]) -> u32 {
    (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
}

/// Name of a script data tag, e.g. `onMetaData`
fn script_key(data: &[u8]) -> Option<&str> {
    if data.len() < 3 || data[0] != AMF0_STRING {
        return None;
    }
    let len = u16::from_be_bytes([data[1], data[2]]) as usize;
    data.get(3..3 + len)
        .and_then(|name| std::str::from_utf8(name).ok())
}

impl Decoder for FlvCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if src.is_empty() {
            return Ok(None);
        }
        if self.stage == Stage::Start && !self.skip_file_header(src)? {
            return Ok(None);
        }
        if src.len() < TAG_HEADER_SIZE {
            return Ok(None);
        }

        // Upper bits carry the filter/reserved flags
        let tag_type = src[0] & 0x1F;
        let data_size = read_u24(&src[1..4]) as usize;
        let timestamp = read_u24(&src[4..7]) | (src[7] as u32) << 24;

        let total = TAG_HEADER_SIZE + data_size + PREV_TAG_SIZE;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut tag = src.split_to(total).freeze();

        let frame = match tag_type {
            TAG_AUDIO | TAG_VIDEO | TAG_SCRIPT => {
                tag.advance(TAG_HEADER_SIZE);
                let data = tag.split_to(data_size);
                match tag_type {
                    TAG_AUDIO => Frame::audio(timestamp, data),
                    TAG_VIDEO => Frame::video(timestamp, data),
                    _ => {
                        let key = script_key(&data).map(str::to_owned);
                        Frame::data(timestamp, key.as_deref(), data)
                    }
                }
            }
            other => {
                tracing::trace!(tag_type = other, size = data_size, "Forwarding unknown FLV tag");
                Frame::raw(tag)
            }
        };

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FlvCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        let size = frame.data.len();
        let tag_type = match frame.tag {
            FrameTag::Audio => Some(TAG_AUDIO),
            FrameTag::Video => Some(TAG_VIDEO),
            FrameTag::Data { .. } => Some(TAG_SCRIPT),
            FrameTag::Raw => None,
        };
        if tag_type.is_some() && size > MAX_DATA_SIZE {
            return Err(CodecError::FrameTooLarge(size));
        }

        if !self.header_written {
            Self::write_file_header(dst);
            self.header_written = true;
        }

        let Some(tag_type) = tag_type else {
            // Already a complete tag
            dst.extend_from_slice(&frame.data);
            return Ok(());
        };

        dst.reserve(TAG_HEADER_SIZE + size + PREV_TAG_SIZE);
        dst.put_u8(tag_type);
        dst.put_uint(size as u64, 3);
        dst.put_uint((frame.timestamp & 0x00FF_FFFF) as u64, 3);
        dst.put_u8((frame.timestamp >> 24) as u8);
        // Stream ID, always 0
        dst.put_uint(0, 3);
        dst.put_slice(&frame.data);
        dst.put_u32((TAG_HEADER_SIZE + size) as u32);

        Ok(())
    }
}
