//! LightSword Client
//!
//! Local SOCKS5 proxy that sends each CONNECT either straight to its
//! destination or through a LightSword relay, behind an AES-CFB handshake
//! and a single-byte XOR stream.

pub mod cli;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod random;
pub mod router;
pub mod socks5;
pub mod stats;
pub mod tunnel;

pub use config::{ConfigError, ProxyMode, RawConfig, ServerConfig};
pub use crypto::{CipherContext, CipherError, CipherKind};
pub use error::{Error, Result};
pub use random::{OsRandom, RandomSource, SeededRandom};
pub use router::{Route, Router};
pub use socks5::{Socks5Server, Socks5ServerBuilder};
pub use stats::{TrafficSnapshot, TrafficStats};
