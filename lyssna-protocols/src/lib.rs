//! # Lyssna Protocol Codecs
//!
//! Crate for the wire formats carried by the capture stream: the AMF3 value
//! codec used by the game protocol, and the frame envelope the proxy wraps
//! every captured packet in. Everything here is pure and free of I/O.

pub mod amf3;
pub mod frame;
pub mod value;

pub use amf3::{decode, encode, DecodeError, Decoder, EncodeError, Encoder};
pub use frame::{
    ContentType, Direction, Frame, FrameError, FrameHeader, DEFAULT_MAX_FRAME_LEN, HEADER_LEN,
};
pub use value::{Array, Date, Object, Properties, Traits, Value};
