//! Frame codec for single-byte length-prefixed frames.
//!
//! # Primitive Frames
//!
//! [`FrameEncoder`] and [`FrameDecoder`] turn single values into frames whose
//! length byte counts the whole frame, itself included:
//! - byte: `[0x02, b]`
//! - string: `[len + 1, bytes...]`, at most 254 bytes of text
//! - int64: `[0x09, 8 bytes big-endian]`
//!
//! These frames carry no type information. It is up to the caller to know
//! which kind of frame comes next.
//!
//! # Tagged Frames
//!
//! The session layer exchanges [`Frame`]s:
//! - 1 byte: length `N` of the remainder (1..=255)
//! - 1 byte: type tag
//! - `N - 1` bytes: payload
//!
//! The length prefix is the only delimiter. A corrupted length byte
//! desynchronizes every later read on the stream and there is no way to
//! recover alignment.

use std::io::{Read, Write};
use std::mem::size_of;

use crate::error::{ProtocolError, Result};

/// Largest value a length byte can hold.
pub const MAX_FRAME_LEN: usize = u8::MAX as usize;

/// Maximum payload bytes in a single frame (one byte goes to the tag or length).
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_LEN - 1;

/// Length byte of a primitive byte frame.
pub const BYTE_FRAME_LEN: u8 = 2;

/// Length byte of a primitive int64 frame: 1 + size_of::<i64>().
pub const INT64_FRAME_LEN: u8 = 1 + size_of::<i64>() as u8;

/// Encodes primitive values as frames onto an underlying writer.
pub trait FrameEncoder {
    /// Write a byte frame `[0x02, b]`.
    fn encode_byte(&mut self, b: u8) -> Result<()>;

    /// Write a string frame `[len + 1, bytes...]`.
    ///
    /// Fails with [`ProtocolError::ValueTooLong`] before writing anything if
    /// the string is longer than [`MAX_PAYLOAD_SIZE`] bytes.
    fn encode_string(&mut self, s: &str) -> Result<()>;

    /// Write an int64 frame `[0x09, big-endian bytes...]`.
    fn encode_int64(&mut self, i: i64) -> Result<()>;
}

/// Decodes primitive values from frames on an underlying reader.
pub trait FrameDecoder {
    /// Read a byte frame, failing unless its length byte is 2.
    fn decode_byte(&mut self) -> Result<u8>;

    /// Read a string frame.
    fn decode_string(&mut self) -> Result<String>;

    /// Read an int64 frame, failing unless its length byte is 9.
    fn decode_int64(&mut self) -> Result<i64>;
}

/// [`FrameEncoder`] over any [`Write`].
#[derive(Debug)]
pub struct Encoder<W> {
    inner: W,
}

impl<W: Write> Encoder<W> {
    /// Create a new encoder writing to `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Get a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> FrameEncoder for Encoder<W> {
    fn encode_byte(&mut self, b: u8) -> Result<()> {
        self.inner.write_all(&[BYTE_FRAME_LEN, b])?;
        Ok(())
    }

    fn encode_string(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::ValueTooLong {
                len: bytes.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut output = Vec::with_capacity(bytes.len() + 1);
        output.push((bytes.len() + 1) as u8);
        output.extend_from_slice(bytes);
        self.inner.write_all(&output)?;
        Ok(())
    }

    fn encode_int64(&mut self, i: i64) -> Result<()> {
        let mut output = [0u8; INT64_FRAME_LEN as usize];
        output[0] = INT64_FRAME_LEN;
        output[1..].copy_from_slice(&i.to_be_bytes());
        self.inner.write_all(&output)?;
        Ok(())
    }
}

/// [`FrameDecoder`] over any [`Read`].
#[derive(Debug)]
pub struct Decoder<R> {
    inner: R,
}

impl<R: Read> Decoder<R> {
    /// Create a new decoder reading from `inner`.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Get a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_length(&mut self) -> Result<u8> {
        let mut length = [0u8; 1];
        self.inner.read_exact(&mut length)?;
        Ok(length[0])
    }
}

impl<R: Read> FrameDecoder for Decoder<R> {
    fn decode_byte(&mut self) -> Result<u8> {
        let mut frame = [0u8; BYTE_FRAME_LEN as usize];
        self.inner.read_exact(&mut frame)?;
        if frame[0] != BYTE_FRAME_LEN {
            return Err(ProtocolError::MalformedFrame {
                context: "byte frame",
                length: frame[0],
            });
        }
        Ok(frame[1])
    }

    fn decode_string(&mut self) -> Result<String> {
        let length = self.read_length()?;
        if length < 1 {
            return Err(ProtocolError::MalformedFrame {
                context: "string frame",
                length,
            });
        }

        let mut payload = vec![0u8; usize::from(length) - 1];
        self.inner.read_exact(&mut payload)?;
        String::from_utf8(payload).map_err(|_| ProtocolError::MalformedFrame {
            context: "string frame is not valid UTF-8",
            length,
        })
    }

    fn decode_int64(&mut self) -> Result<i64> {
        let length = self.read_length()?;
        if length != INT64_FRAME_LEN {
            return Err(ProtocolError::MalformedFrame {
                context: "int64 frame",
                length,
            });
        }

        let mut value = [0u8; size_of::<i64>()];
        self.inner.read_exact(&mut value)?;
        Ok(i64::from_be_bytes(value))
    }
}

/// A tagged session frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    tag: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame with the given tag and payload.
    ///
    /// Fails with [`ProtocolError::ValueTooLong`] if the payload does not fit
    /// next to the tag in one length byte.
    pub fn new(tag: impl Into<u8>, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::ValueTooLong {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            tag: tag.into(),
            payload,
        })
    }

    /// Create a frame that is just a tag, with no payload.
    pub fn signal(tag: impl Into<u8>) -> Self {
        Self {
            tag: tag.into(),
            payload: Vec::new(),
        }
    }

    /// Raw tag byte.
    #[inline]
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Payload bytes after the tag.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the frame, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Value of the length byte: the tag plus the payload.
    #[inline]
    pub fn length_byte(&self) -> u8 {
        // Bounded by MAX_PAYLOAD_SIZE at construction.
        (1 + self.payload.len()) as u8
    }

    /// Encode the frame into bytes: `[N, tag, payload...]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(2 + self.payload.len());
        output.push(self.length_byte());
        output.push(self.tag);
        output.extend_from_slice(&self.payload);
        output
    }
}

/// Write one tagged frame in a single `write_all`.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, frame: &Frame) -> Result<()> {
    writer.write_all(&frame.encode())?;
    Ok(())
}

/// Read exactly one tagged frame.
///
/// A zero length byte leaves no room for the tag and fails with
/// [`ProtocolError::MalformedFrame`]. A stream that ends mid-frame fails with
/// [`ProtocolError::ConnectionClosed`].
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Frame> {
    let mut length = [0u8; 1];
    reader.read_exact(&mut length)?;
    let length = length[0];
    if length == 0 {
        return Err(ProtocolError::MalformedFrame {
            context: "frame has no room for a tag",
            length,
        });
    }

    let mut remainder = vec![0u8; usize::from(length)];
    reader.read_exact(&mut remainder)?;
    let payload = remainder.split_off(1);
    Ok(Frame {
        tag: remainder[0],
        payload,
    })
}
