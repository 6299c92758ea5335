//! Line-delimited JSON framing.
//!
//! Every message is one JSON text followed by a single `\n`. JSON text never
//! contains a raw line feed, so every line feed in the stream is a frame
//! boundary, no matter how the bytes were chunked in transit.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::CodecError;

pub const FRAME_DELIMITER: u8 = b'\n';

/// Serialize a message and terminate it with the frame delimiter
pub fn encode_frame<T: Serialize + ?Sized>(message: &T) -> Result<Bytes, serde_json::Error> {
    let mut frame = serde_json::to_vec(message)?;
    frame.push(FRAME_DELIMITER);
    Ok(Bytes::from(frame))
}

/// One delimited span of the stream
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Message(Value),
    /// A span that was not valid JSON; decoding resumes after it
    Malformed { raw: String, error: String },
}

/// `tokio_util` codec for line-delimited JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonLineCodec {
    /// Bytes before this index are known to contain no delimiter
    next_index: usize,
    max_frame_bytes: Option<usize>,
}

impl JsonLineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_bytes(max_frame_bytes: Option<usize>) -> Self {
        Self {
            next_index: 0,
            max_frame_bytes,
        }
    }

    pub fn max_frame_bytes(&self) -> Option<usize> {
        self.max_frame_bytes
    }

    fn too_large(&mut self, buf: &mut BytesMut, limit: usize) -> CodecError {
        debug!(buffered = buf.len(), limit, "Discarding oversized frame");
        buf.clear();
        self.next_index = 0;
        CodecError::FrameTooLarge { limit }
    }
}

fn parse_span(span: &[u8]) -> DecodedFrame {
    match serde_json::from_slice(span) {
        Ok(value) => DecodedFrame::Message(value),
        Err(e) => DecodedFrame::Malformed {
            raw: String::from_utf8_lossy(span).into_owned(),
            error: e.to_string(),
        },
    }
}

impl Decoder for JsonLineCodec {
    type Item = DecodedFrame;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<DecodedFrame>, CodecError> {
        loop {
            let found = buf[self.next_index..]
                .iter()
                .position(|b| *b == FRAME_DELIMITER);

            let Some(offset) = found else {
                if let Some(limit) = self.max_frame_bytes {
                    if buf.len() > limit {
                        return Err(self.too_large(buf, limit));
                    }
                }
                self.next_index = buf.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            if let Some(limit) = self.max_frame_bytes {
                if end > limit {
                    buf.advance(end + 1);
                    return Err(CodecError::FrameTooLarge { limit });
                }
            }

            let line = buf.split_to(end + 1);
            let span = line[..end].trim_ascii();
            if span.is_empty() {
                continue;
            }
            return Ok(Some(parse_span(span)));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<DecodedFrame>, CodecError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if !buf.is_empty() {
            debug!(bytes = buf.len(), "Discarding undelimited tail at end of stream");
            buf.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl Encoder<Value> for JsonLineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), CodecError> {
        let text = serde_json::to_vec(&item)?;
        dst.reserve(text.len() + 1);
        dst.extend_from_slice(&text);
        dst.put_u8(FRAME_DELIMITER);
        Ok(())
    }
}

/// Push-style decoder for callers that receive raw chunks themselves.
///
/// Frames not pulled from the iterator returned by [`FrameDecoder::feed`]
/// stay buffered and are yielded by the next `feed` or `next_frame` call.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    codec: JsonLineCodec,
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_bytes(max_frame_bytes: Option<usize>) -> Self {
        Self {
            codec: JsonLineCodec::with_max_frame_bytes(max_frame_bytes),
            buffer: BytesMut::new(),
        }
    }

    /// Append a chunk and return a lazy iterator over the frames now available
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk);
        Frames { decoder: self }
    }

    pub fn next_frame(&mut self) -> Result<Option<DecodedFrame>, CodecError> {
        self.codec.decode(&mut self.buffer)
    }

    /// Number of bytes held that have not been yielded as frames
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Lazy iterator over decoded frames, see [`FrameDecoder::feed`]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<DecodedFrame, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame().transpose()
    }
}
