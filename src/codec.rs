//! Connection channel and wire framing
//!
//! Every text unit on the wire is a 2-byte big-endian length followed by the
//! text in "modified UTF-8", the format produced by Java's
//! `DataOutputStream::writeUTF`. This keeps the framing unambiguous for any
//! content (embedded newlines, empty strings) and lets the stock Java
//! terminal client talk to the server.

use bytes::{Buf, BufMut, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::error::AppError;

/// Size of the length prefix in bytes
const LENGTH_PREFIX: usize = 2;

/// Largest encoded payload a single frame can carry
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Codec for length-prefixed modified UTF-8 text units
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl TextCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for TextCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, AppError> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let len = u16::from_be_bytes([src[0], src[1]]) as usize;
        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let payload = src.split_to(len);
        decode_modified_utf8(&payload).map(Some)
    }
}

impl Encoder<String> for TextCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), AppError> {
        let payload = encode_modified_utf8(&item);
        if payload.len() > MAX_FRAME_LEN {
            return Err(AppError::FrameTooLong(payload.len()));
        }

        dst.reserve(LENGTH_PREFIX + payload.len());
        dst.put_u16(payload.len() as u16);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

/// Number of bytes `encode_modified_utf8` produces for `text`
pub fn encoded_len(text: &str) -> usize {
    text.encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Encode text the way `writeUTF` does
///
/// Works per UTF-16 code unit: U+0000 takes two bytes and characters outside
/// the BMP become two 3-byte surrogate encodings.
pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Decode a `readUTF` payload
///
/// Standard UTF-8 that is not valid modified UTF-8 (4-byte sequences) is
/// accepted as well, so non-Java clients may send plain UTF-8.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, AppError> {
    match decode_utf16_units(bytes) {
        Ok(units) => {
            String::from_utf16(&units).map_err(|_| AppError::MalformedFrame("unpaired surrogate"))
        }
        Err(err) => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| err),
    }
}

fn decode_utf16_units(bytes: &[u8]) -> Result<Vec<u16>, AppError> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        if lead & 0x80 == 0 {
            units.push(lead as u16);
            i += 1;
        } else if lead & 0xE0 == 0xC0 {
            let b2 = continuation(bytes, i + 1)?;
            units.push((((lead & 0x1F) as u16) << 6) | b2);
            i += 2;
        } else if lead & 0xF0 == 0xE0 {
            let b2 = continuation(bytes, i + 1)?;
            let b3 = continuation(bytes, i + 2)?;
            units.push((((lead & 0x0F) as u16) << 12) | (b2 << 6) | b3);
            i += 3;
        } else {
            return Err(AppError::MalformedFrame("invalid lead byte"));
        }
    }
    Ok(units)
}

fn continuation(bytes: &[u8], idx: usize) -> Result<u16, AppError> {
    match bytes.get(idx) {
        Some(b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
        _ => Err(AppError::MalformedFrame("truncated sequence")),
    }
}

/// Write half of a split channel
pub type LineSink<T> = SplitSink<Framed<T, TextCodec>, String>;

/// Read half of a split channel
pub type LineStream<T> = SplitStream<Framed<T, TextCodec>>;

/// Bidirectional text channel over one accepted connection
///
/// Generic over the transport so tests can drive it with in-memory pipes.
pub struct Channel<T> {
    framed: Framed<T, TextCodec>,
}

impl<T> Channel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T) -> Self {
        Self {
            framed: Framed::new(io, TextCodec::new()),
        }
    }

    /// Write one text unit and flush it
    pub async fn send_line(&mut self, text: &str) -> Result<(), AppError> {
        self.framed.send(text.to_string()).await
    }

    /// Wait for the next text unit
    ///
    /// Returns `Ok(None)` once the peer has closed the stream.
    pub async fn receive_line(&mut self) -> Result<Option<String>, AppError> {
        self.framed.next().await.transpose()
    }

    /// Split into independently owned write and read halves
    pub fn split(self) -> (LineSink<T>, LineStream<T>) {
        self.framed.split()
    }
}
