//! Error types for the bridge server.

use std::io;
use std::time::Duration;

use zkgate_proto::WireError;

/// Errors that terminate a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// I/O error on the client socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing or record decode failure.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The first frame did not arrive (or decode) within the deadline.
    #[error("connect request not received within {0:?}")]
    HandshakeTimeout(Duration),

    /// The client sent Close; the success reply is already enqueued.
    /// Used to unwind the worker group, not reported as a failure.
    #[error("graceful connection close requested")]
    CloseRequested,

    /// A worker panicked; the panic is contained at the session boundary.
    #[error("session worker panicked: {0}")]
    WorkerPanic(String),
}

impl SessionError {
    /// Whether this is an ordinary peer disconnect rather than a fault.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        let io_err = match self {
            Self::Io(e) | Self::Wire(WireError::Io(e)) => e,
            _ => return false,
        };
        matches!(
            io_err.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::BrokenPipe
        )
    }
}

/// Errors that stop the whole server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or accepting on the listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
