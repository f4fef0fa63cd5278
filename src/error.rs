//! Error types for the probe transport and the harness.
//!
//! Transport errors (frames, handshake, I/O) surface on individual probes and
//! end up in the report as connection failures. Only
//! [`Error::TargetUnavailable`] aborts an assessment run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while probing a target.
///
/// Variants carry owned strings rather than sources so that a probe's error
/// can be cloned into its record and compared in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("malformed frame: {0}")]
    InvalidFrame(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("text message is not valid UTF-8")]
    InvalidUtf8,

    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// The peer closed, with its close code when one was sent.
    #[error("connection closed (code {0:?})")]
    ConnectionClosed(Option<u16>),

    #[error("handshake rejected: {0}")]
    InvalidHandshake(String),

    /// Handshake or HTTP response head grew past `Limits::max_handshake_size`.
    #[error("response head of {size} bytes exceeds limit of {max}")]
    HandshakeTooLarge { size: usize, max: usize },

    #[error("i/o: {0}")]
    Io(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// The static page response could not be parsed.
    #[error("bad http response: {0}")]
    Http(String),

    #[error("reserved opcode {0:#x}")]
    ReservedOpcode(u8),

    #[error("control frame is fragmented")]
    FragmentedControlFrame,

    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlFrameTooLarge(usize),

    #[error("frame from server is masked")]
    MaskedServerFrame,

    #[error("frame from client is not masked")]
    UnmaskedClientFrame,

    /// RSV1-3 set; no extensions are ever negotiated.
    #[error("reserved header bits set")]
    ReservedBitsSet,

    /// Not an error the caller sees; the codec reads more and retries.
    #[error("frame needs {needed} more bytes")]
    IncompleteFrame { needed: usize },

    #[error("opcode {0:#x} out of range")]
    InvalidOpcode(u8),

    /// A probe task crashed instead of reporting through its event channel.
    #[error("probe task panicked: {0}")]
    ProbePanicked(String),

    /// Run settings that cannot produce a meaningful assessment.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The target could not be started or reached; nothing else can be checked.
    #[error("target unavailable: {0}")]
    TargetUnavailable(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<hyper::Error> for Error {
    fn from(err: hyper::Error) -> Self {
        Error::Http(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_errors_name_both_numbers() {
        let err = Error::MessageTooLarge { size: 5000, max: 4096 };
        assert_eq!(err.to_string(), "message of 5000 bytes exceeds limit of 4096");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(msg) if msg.contains("refused")));
    }

    #[test]
    fn test_target_unavailable_display() {
        let err = Error::TargetUnavailable("nothing listening on 127.0.0.1:8080".into());
        assert_eq!(
            err.to_string(),
            "target unavailable: nothing listening on 127.0.0.1:8080"
        );
    }
}
