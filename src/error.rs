//! Error types for the streaming library.

use std::fmt;

/// Errors that can occur in the streaming library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse) — malformed control-channel
///   requests. Malformed *replies* on the initiator side are not errors at
///   all; they are discarded. Resource failures at SETUP are not errors
///   either; they travel back as a 404 reply.
/// - **Transport**: [`Io`](Self::Io) — socket/network failures, and
///   [`RetriesExhausted`](Self::RetriesExhausted) when the control send
///   path gives up after its bounded retry loop.
/// - **Server**: [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a control-channel request message.
    #[error("control parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The control send path retried and gave up. Terminal for the session.
    #[error("control channel send failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of control-channel parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method resource Version` format.
    InvalidRequestLine,
    /// Request line carried a method other than SETUP/PLAY/PAUSE/TEARDOWN.
    UnknownMethod,
    /// The `CSeq:` line was missing or non-numeric.
    InvalidCseq,
    /// A header line did not contain a colon separator.
    InvalidHeader,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::UnknownMethod => write!(f, "unknown method"),
            Self::InvalidCseq => write!(f, "missing or invalid CSeq"),
            Self::InvalidHeader => write!(f, "invalid header"),
        }
    }
}

/// Convenience alias for `Result<T, StreamError>`.
pub type Result<T> = std::result::Result<T, StreamError>;
