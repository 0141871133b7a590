//! Protocol error types.

use thiserror::Error;

/// Errors related to wire format handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame length mismatch: declared {declared}, received {received}")]
    FrameLengthMismatch { declared: usize, received: usize },

    #[error("unknown command tag: 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("unknown sender tag: 0x{0:02x}")]
    UnknownSender(u8),

    #[error("message too short: expected at least {expected}, got {got}")]
    MessageTooShort { expected: usize, got: usize },

    #[error("unknown app request tag: 0x{0:02x}")]
    UnknownAppRequest(u8),

    #[error("unknown notify type tag: 0x{0:02x}")]
    UnknownNotifyType(u8),

    #[error("trailing bytes after payload: {extra}")]
    TrailingBytes { extra: usize },
}
