//! Protocol module - wire format, framing, and payload codecs.
//!
//! This module implements the agency/aggregator protocol:
//! - 8-byte ASCII length header and the fixed-width END marker
//! - Frame enum distinguishing data frames from END
//! - Frame buffer for accumulating partial reads
//! - Batch, ack and winners payload codecs

mod frame;
mod frame_buffer;
pub mod message;
mod wire_format;

pub use frame::{build_frame, Frame, FrameKind};
pub use frame_buffer::FrameBuffer;
pub use message::{
    decode_batch_payload, decode_winners, encode_batch_payload, encode_winners, Response,
    NO_WINNERS,
};
pub use wire_format::{
    decode_header, encode_length_header, Header, END_MARKER, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
