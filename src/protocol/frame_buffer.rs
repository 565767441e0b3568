//! Frame buffer for accumulating partial reads on the aggregator side.
//!
//! Uses `bytes::BytesMut` for buffer management.
//! Fragmented socket reads are reassembled by a two-state machine:
//! - `WaitingForHeader`: Need at least 8 bytes
//! - `WaitingForPayload`: Length header parsed, need N more payload bytes
//!
//! The END marker occupies a header slot and completes immediately, so a
//! stream of batch frames followed by END decodes without lookahead.
//!
//! # Example
//!
//! ```
//! use agency_client::protocol::{Frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let frames = buffer.push(b"00000002hiEND     ").unwrap();
//!
//! assert_eq!(frames, vec![Frame::data(&b"hi"[..]), Frame::End]);
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use super::Frame;
use crate::error::{ClientError, Result};

/// Where the decoder is within the current frame.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete header (need 8 bytes).
    WaitingForHeader,
    /// Length header parsed, waiting for payload bytes.
    WaitingForPayload { remaining: usize },
}

/// Reassembles an agency's outbound byte stream into frames.
pub struct FrameBuffer {
    /// Bytes received but not yet framed.
    buffer: BytesMut,
    state: State,
    /// Largest payload accepted before erroring.
    max_payload_size: usize,
}

impl FrameBuffer {
    /// Frame buffer accepting any payload the header can express.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Frame buffer refusing payloads above `max_payload_size`.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Append a read chunk and drain every frame it completes.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns error on a malformed header or a payload over the limit.
    /// The buffer should be discarded after an error.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// One frame if enough bytes are buffered.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(None);
                }

                let header = Header::decode(&self.buffer[..HEADER_SIZE])?;
                let _ = self.buffer.split_to(HEADER_SIZE);

                match header {
                    Header::End => Ok(Some(Frame::End)),
                    Header::Length(len) if len > self.max_payload_size => {
                        Err(ClientError::Protocol(format!(
                            "Payload size {} exceeds maximum {}",
                            len, self.max_payload_size
                        )))
                    }
                    Header::Length(0) => Ok(Some(Frame::data(bytes::Bytes::new()))),
                    Header::Length(len) => {
                        self.state = State::WaitingForPayload { remaining: len };
                        self.try_extract_one()
                    }
                }
            }

            State::WaitingForPayload { remaining } => {
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                self.state = State::WaitingForHeader;

                Ok(Some(Frame::Data(payload)))
            }
        }
    }

    /// Bytes held for the next frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// No partial frame pending.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop pending bytes and expect a header next.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
