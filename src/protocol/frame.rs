//! Frame type covering both framing shapes on the wire.
//!
//! Data frames are length-prefixed; END is a bare fixed-width marker.
//! Tagging them keeps the transport from ever guessing which one it holds.
//!
//! # Example
//!
//! ```
//! use agency_client::protocol::{build_frame, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::data(Bytes::from_static(b"hello"));
//! assert_eq!(build_frame(&frame).unwrap(), b"00000005hello");
//! assert_eq!(build_frame(&Frame::End).unwrap(), b"END     ");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};
use crate::error::Result;

/// Kind of a frame, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Length-prefixed data frame.
    Data,
    /// Fixed-width END signal.
    End,
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Length-prefixed payload (may be empty).
    Data(Bytes),
    /// End-of-stream signal.
    End,
}

impl Frame {
    /// Create a data frame.
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Frame::Data(payload.into())
    }

    /// Get the frame kind.
    #[inline]
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Data(_) => FrameKind::Data,
            Frame::End => FrameKind::End,
        }
    }

    /// Header this frame is written with.
    #[inline]
    pub fn header(&self) -> Header {
        match self {
            Frame::Data(payload) => Header::Length(payload.len()),
            Frame::End => Header::End,
        }
    }

    /// Payload bytes (empty for END).
    #[inline]
    pub fn payload(&self) -> &[u8] {
        match self {
            Frame::Data(payload) => payload,
            Frame::End => &[],
        }
    }

    /// Check if this is the END signal.
    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, Frame::End)
    }

    /// Total size on the wire.
    #[inline]
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload().len()
    }
}

/// Build a complete frame as a single byte vector.
///
/// Fails if the payload does not fit in the 8-digit header.
pub fn build_frame(frame: &Frame) -> Result<Vec<u8>> {
    let header = frame.header().encode()?;
    let mut buf = Vec::with_capacity(frame.wire_size());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(frame.payload());
    Ok(buf)
}
