//! Transport module - framed I/O over a byte stream.
//!
//! Provides:
//! - `send_frame` / `receive_frame` with per-call deadlines and a receive size cap
//! - Partial-write-safe and exact-read primitives
//! - TCP dialing with a connect timeout

mod framed;
mod tcp;

pub use framed::{
    read_exact_retrying, receive_data, receive_frame, receive_frame_with_limit, send_frame,
    write_all_retrying, DEFAULT_MAX_RECEIVE_SIZE,
};
pub use tcp::connect;
