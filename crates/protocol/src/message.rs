//! Message type tags carried in the first byte of every session frame.

use std::fmt;

use crate::error::ProtocolError;

/// Kind of a session frame, identified by its tag byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Announces the peer as the sending side.
    SendReady = 1,
    /// Announces the peer as the receiving side, or that it is attached and ready.
    RecvReady = 2,
    /// Shared secret code pairing the two peers. String payload.
    SecretCode = 3,
    /// Name of the file being transferred. String payload.
    FileName = 4,
    /// Size of the file in bytes. Fixed 8-byte big-endian payload.
    FileLength = 5,
}

impl MessageType {
    /// Raw tag byte for this message type.
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns true for the role announcements a peer sends as its first frame.
    pub fn is_role(self) -> bool {
        matches!(self, MessageType::SendReady | MessageType::RecvReady)
    }

    fn name(self) -> &'static str {
        match self {
            MessageType::SendReady => "send-ready",
            MessageType::RecvReady => "recv-ready",
            MessageType::SecretCode => "secret-code",
            MessageType::FileName => "file-name",
            MessageType::FileLength => "file-length",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            1 => Ok(MessageType::SendReady),
            2 => Ok(MessageType::RecvReady),
            3 => Ok(MessageType::SecretCode),
            4 => Ok(MessageType::FileName),
            5 => Ok(MessageType::FileLength),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(ty: MessageType) -> Self {
        ty.as_byte()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
