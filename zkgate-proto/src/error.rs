//! Error types for the wire protocol.

use std::io;

/// Errors that can occur while framing or coding protocol records.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A frame announced a length beyond the protocol maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced payload length.
        size: usize,
        /// Maximum allowed payload length.
        max: usize,
    },

    /// A record field ran past the end of the frame payload.
    #[error("short buffer: need {need} bytes, have {have}")]
    ShortBuffer {
        /// Bytes needed.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidString,

    /// The request header carried an opcode outside the catalog.
    #[error("unknown opcode: {0}")]
    UnknownOpCode(i32),

    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for wire protocol operations.
pub type WireResult<T> = Result<T, WireError>;
