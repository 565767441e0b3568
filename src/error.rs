//! Error types for agency-client.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which half of a frame exchange an I/O failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Writing the 8-byte header (or the END marker).
    SendHeader,
    /// Writing the payload section.
    SendPayload,
    /// Reading the 8-byte header.
    ReceiveHeader,
    /// Reading the payload section.
    ReceivePayload,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::SendHeader => "send header",
            FramePhase::SendPayload => "send payload",
            FramePhase::ReceiveHeader => "receive header",
            FramePhase::ReceivePayload => "receive payload",
        };
        f.write_str(name)
    }
}

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid configuration, or a record the configured limits can never seat.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dialing the aggregator failed or timed out.
    #[error("Could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The connection was closed by the local shutdown path while an operation was blocked.
    #[error("Connection closed locally")]
    ClosedLocally,

    /// The peer closed the connection before a complete frame arrived.
    #[error("Connection closed by peer during {phase}")]
    ConnectionClosed { phase: FramePhase },

    /// I/O error on the connection.
    #[error("Transport error during {phase}: {source}")]
    Transport {
        phase: FramePhase,
        #[source]
        source: std::io::Error,
    },

    /// A read or write deadline elapsed.
    #[error("Timed out after {after:?} during {phase}")]
    Timeout { phase: FramePhase, after: Duration },

    /// Header bytes are neither a decimal length nor the END marker.
    #[error("Malformed frame header: {0}")]
    MalformedHeader(String),

    /// Protocol violation (unexpected frame kind, bad payload shape, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The aggregator answered with a failure status.
    #[error("Aggregator rejected request: status '{status}', message '{message}'")]
    Rejected { status: String, message: String },

    /// The record source could not be read.
    #[error("Record source error: {0}")]
    Source(#[source] std::io::Error),
}

impl ClientError {
    /// Wrap an I/O error from the given frame phase.
    ///
    /// EOF-style errors are reported as [`ClientError::ConnectionClosed`] so
    /// truncation is distinguishable from other transport failures.
    pub fn io(phase: FramePhase, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::WriteZero => {
                ClientError::ConnectionClosed { phase }
            }
            _ => ClientError::Transport { phase, source },
        }
    }

    /// True for errors that mean the connection itself is gone.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. }
                | ClientError::ClosedLocally
                | ClientError::ConnectionClosed { .. }
                | ClientError::Transport { .. }
        )
    }

    /// True when the aggregator replied with a failure status.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }
}

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;
