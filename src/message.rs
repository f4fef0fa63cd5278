//! Messages and close codes as seen by a probe (RFC 6455).

/// Close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001), e.g. the target is shutting down.
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Invalid payload (1007).
    InvalidPayload,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1007 => CloseCode::InvalidPayload,
            other => CloseCode::Other(other),
        }
    }

    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::InvalidPayload => 1007,
            CloseCode::Other(code) => *code,
        }
    }

    /// Codes that must never appear in a Close frame (1004-1006, 1015).
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

/// Close frame contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decode a Close frame payload. An empty payload carries no status.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [] => None,
            [hi, lo, reason @ ..] => Some(match std::str::from_utf8(reason) {
                Ok(reason) => CloseFrame::new(CloseCode::from_u16(u16::from_be_bytes([*hi, *lo])), reason),
                Err(_) => CloseFrame::new(CloseCode::InvalidPayload, ""),
            }),
            [_] => Some(CloseFrame::new(CloseCode::ProtocolError, "Invalid close frame")),
        }
    }
}

/// A complete message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl Message {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Text or binary.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Message::Text(_) | Message::Binary(_))
    }

    /// Raw payload bytes of a data message.
    ///
    /// The harness compares payloads byte-for-byte, so text and binary are
    /// treated alike here.
    #[must_use]
    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Message::Text(s) => Some(s.into_bytes()),
            Message::Binary(data) => Some(data),
            _ => None,
        }
    }
}
