//! Client error types

use std::io;
use thiserror::Error;

use crate::config::ConfigError;
use crate::crypto::CipherError;
use lightsword_proto::ProtoError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed SOCKS5 greeting ({0} bytes)")]
    HandshakeMalformed(usize),

    #[error("Client offered no acceptable auth method")]
    NoAcceptableAuth,

    #[error("Unparseable SOCKS5 request: {0}")]
    RequestUnparseable(#[source] ProtoError),

    #[error("Unsupported SOCKS5 command: {0:?}")]
    UnsupportedCommand(lightsword_proto::Command),

    #[error("Failed to connect to {addr}: {source}")]
    UpstreamConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Relay handshake failed: {0}")]
    UpstreamRead(String),

    #[error("Frame error: {0}")]
    Frame(#[from] ProtoError),

    #[error("No tokio runtime available to schedule connections")]
    NoRuntime,

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
