//! ## lyssna-protocols::frame
//! Envelope the capture proxy wraps around every packet it forwards.
//!
//! ```text
//! [0]    direction     0x01 request (client → server), 0x02 response
//! [1]    content type  0x00 raw, 0x01 AMF3, 0x02 text
//! [2..4] reserved
//! [4..8] body length   big-endian u32
//! [8..]  body
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 8;

/// Largest body accepted by default.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors that can occur while parsing a frame.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum FrameError {
    #[error("Insufficient data for frame header")]
    InsufficientData,
    #[error("Incomplete frame: body needs {expected} bytes, {available} available")]
    Incomplete { expected: usize, available: usize },
    #[error("Unknown direction tag 0x{0:02x}")]
    UnknownDirection(u8),
    #[error("Unknown content type 0x{0:02x}")]
    UnknownContentType(u8),
    #[error("Frame body of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
}

/// Direction of a captured packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// Client to game server.
    Request = 0x01,
    /// Game server to client.
    Response = 0x02,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x01 => Ok(Direction::Request),
            0x02 => Ok(Direction::Response),
            other => Err(FrameError::UnknownDirection(other)),
        }
    }
}

/// Content type hint attached by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentType {
    Raw = 0x00,
    Amf3 = 0x01,
    Text = 0x02,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Raw => "raw",
            ContentType::Amf3 => "amf3",
            ContentType::Text => "text",
        }
    }
}

impl TryFrom<u8> for ContentType {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x00 => Ok(ContentType::Raw),
            0x01 => Ok(ContentType::Amf3),
            0x02 => Ok(ContentType::Text),
            other => Err(FrameError::UnknownContentType(other)),
        }
    }
}

/// Raw frame header. The tag is kept undecoded so that a frame with an
/// unknown tag can still be skipped by its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub tag: [u8; 4],
    pub body_len: u32,
}

impl FrameHeader {
    pub fn new(direction: Direction, content_type: ContentType, body_len: u32) -> Self {
        Self {
            tag: [direction as u8, content_type as u8, 0, 0],
            body_len,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < HEADER_LEN {
            return Err(FrameError::InsufficientData);
        }
        let tag = [data[0], data[1], data[2], data[3]];
        let body_len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        Ok(Self { tag, body_len })
    }

    pub fn direction(&self) -> Result<Direction, FrameError> {
        Direction::try_from(self.tag[0])
    }

    pub fn content_type(&self) -> Result<ContentType, FrameError> {
        ContentType::try_from(self.tag[1])
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let len = self.body_len.to_be_bytes();
        [
            self.tag[0],
            self.tag[1],
            self.tag[2],
            self.tag[3],
            len[0],
            len[1],
            len[2],
            len[3],
        ]
    }
}

/// A complete frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub direction: Direction,
    pub content_type: ContentType,
    pub body: Bytes,
}

impl Frame {
    pub fn new(direction: Direction, content_type: ContentType, body: impl Into<Bytes>) -> Self {
        Self {
            direction,
            content_type,
            body: body.into(),
        }
    }

    /// Builds a frame from an already read header and body.
    pub fn from_parts(header: &FrameHeader, body: Bytes) -> Result<Self, FrameError> {
        Ok(Self {
            direction: header.direction()?,
            content_type: header.content_type()?,
            body,
        })
    }

    /// Parses one frame from the start of `data` without copying the body.
    ///
    /// Returns the frame and the number of bytes it occupied.
    pub fn parse(data: &Bytes, max_len: usize) -> Result<(Self, usize), FrameError> {
        let header = FrameHeader::parse(data)?;
        let body_len = header.body_len as usize;
        if body_len > max_len {
            return Err(FrameError::TooLarge {
                len: body_len,
                max: max_len,
            });
        }
        let available = data.len() - HEADER_LEN;
        if available < body_len {
            return Err(FrameError::Incomplete {
                expected: body_len,
                available,
            });
        }
        let body = data.slice(HEADER_LEN..HEADER_LEN + body_len);
        Ok((Self::from_parts(&header, body)?, HEADER_LEN + body_len))
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader::new(self.direction, self.content_type, self.body.len() as u32)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.body.len());
        buf.put_slice(&self.header().to_bytes());
        buf.put_slice(&self.body);
        buf.freeze()
    }
}
