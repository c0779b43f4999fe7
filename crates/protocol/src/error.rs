//! Error types for the protocol crate.

use thiserror::Error;

use crate::message::MessageType;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Transport errors
    /// Reading from or writing to the connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Connection was closed before a complete frame arrived.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A socket deadline expired.
    #[error("operation timed out: {0}")]
    Timeout(String),

    // Frame errors
    /// The length byte is not valid for the expected frame shape.
    #[error("malformed frame: {context} (length byte {length})")]
    MalformedFrame {
        /// What was being decoded.
        context: &'static str,
        /// The offending length byte.
        length: u8,
    },

    /// Value does not fit a single-byte length prefix.
    #[error("value too long: {len} bytes exceeds maximum of {max} bytes")]
    ValueTooLong {
        /// Actual value length.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    // Session errors
    /// The peer sent a frame with a different tag than this step expects.
    #[error("unexpected tag: expected {expected} ({:#04x}), got {got:#04x}", .expected.as_byte())]
    UnexpectedTag {
        /// Tag this protocol step expects.
        expected: MessageType,
        /// Raw tag byte received.
        got: u8,
    },

    /// Byte does not name any known message type.
    #[error("unknown message tag: {0:#04x}")]
    UnknownTag(u8),

    /// The opening frame names a message type that is not a role announcement.
    #[error("expected a role announcement, got {0}")]
    NotARole(MessageType),

    /// Connection ended before the announced payload length was delivered.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes announced.
        expected: u64,
        /// Bytes delivered before end of stream.
        actual: u64,
    },

    // Configuration errors
    /// Session configuration could not be loaded or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProtocolError {
    /// Returns true for failures of the underlying connection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::Transport(_)
                | ProtocolError::ConnectionClosed(_)
                | ProtocolError::Timeout(_)
        )
    }

    /// Returns true when the connection can no longer be trusted to be
    /// frame-aligned and must be closed.
    ///
    /// `ValueTooLong` is raised before anything is written and configuration
    /// errors happen before a connection exists, so neither affects the stream.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::ValueTooLong { .. } | ProtocolError::Config(_)
        )
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ProtocolError::Timeout(err.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed(err.to_string()),
            _ => ProtocolError::Transport(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for ProtocolError {
    fn from(err: toml::de::Error) -> Self {
        ProtocolError::Config(err.to_string())
    }
}
