//! Protocol error types

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("Invalid SOCKS version: {0}")]
    InvalidVersion(u8),

    #[error("Invalid command byte: {0}")]
    InvalidCommand(u8),

    #[error("Invalid address type: {0}")]
    InvalidAddressType(u8),

    #[error("Empty message")]
    EmptyMessage,

    #[error("Insufficient data in message")]
    InsufficientData,

    #[error("Invalid UTF-8 in message")]
    InvalidUtf8,

    #[error("Frame too large: {0} bytes (max {1})")]
    FrameTooLarge(usize, usize),
}
