//! Wire format encoding and decoding.
//!
//! Every data frame starts with an 8-byte header holding the payload length
//! as zero-padded ASCII decimal digits:
//! ```text
//! ┌──────────────────────┬─────────────────────┐
//! │ Length               │ Payload             │
//! │ 8 bytes, "%08d"      │ Length bytes        │
//! └──────────────────────┴─────────────────────┘
//! ```
//!
//! The END signal reuses the header slot: the literal `END` padded with
//! spaces to the header width, with no payload section behind it.

use crate::error::{ClientError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Largest payload length that fits in the header (8 decimal digits).
pub const MAX_PAYLOAD_SIZE: usize = 99_999_999;

/// The END signal as it appears on the wire: `END` plus 5 spaces.
pub const END_MARKER: [u8; HEADER_SIZE] = *b"END     ";

/// Decoded header slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// A data frame of the given payload length follows.
    Length(usize),
    /// The fixed-width END signal; nothing follows.
    End,
}

impl Header {
    /// Encode header to its 8 wire bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use agency_client::protocol::Header;
    ///
    /// assert_eq!(&Header::Length(42).encode().unwrap(), b"00000042");
    /// assert_eq!(&Header::End.encode().unwrap(), b"END     ");
    /// ```
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        match *self {
            Header::Length(len) => encode_length_header(len),
            Header::End => Ok(END_MARKER),
        }
    }

    /// Decode a header from exactly 8 bytes.
    ///
    /// Fails with [`ClientError::MalformedHeader`] on anything that is not
    /// 8 decimal digits or the END marker.
    ///
    /// # Example
    ///
    /// ```
    /// use agency_client::protocol::Header;
    ///
    /// assert_eq!(Header::decode(b"00000000").unwrap(), Header::Length(0));
    /// assert_eq!(Header::decode(b"END     ").unwrap(), Header::End);
    /// assert!(Header::decode(b"0000abcd").is_err());
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != HEADER_SIZE {
            return Err(ClientError::MalformedHeader(format!(
                "expected {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        if buf == END_MARKER {
            return Ok(Header::End);
        }

        if buf[0] == b'-' {
            return Err(ClientError::MalformedHeader(format!(
                "negative length '{}'",
                String::from_utf8_lossy(buf)
            )));
        }

        if !buf.iter().all(u8::is_ascii_digit) {
            return Err(ClientError::MalformedHeader(format!(
                "non-numeric length '{}'",
                String::from_utf8_lossy(buf)
            )));
        }

        let len = buf
            .iter()
            .fold(0usize, |acc, digit| acc * 10 + usize::from(digit - b'0'));
        Ok(Header::Length(len))
    }

    /// Check if this is the END signal.
    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, Header::End)
    }

    /// Payload length announced by this header (0 for END).
    #[inline]
    pub fn payload_length(&self) -> usize {
        match *self {
            Header::Length(len) => len,
            Header::End => 0,
        }
    }
}

/// Encode a payload length as an 8-digit zero-padded header.
pub fn encode_length_header(len: usize) -> Result<[u8; HEADER_SIZE]> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(ClientError::Protocol(format!(
            "Payload size {} exceeds maximum {}",
            len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut buf = [0u8; HEADER_SIZE];
    buf.copy_from_slice(format!("{:0width$}", len, width = HEADER_SIZE).as_bytes());
    Ok(buf)
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8]) -> Result<Header> {
    Header::decode(buf)
}
