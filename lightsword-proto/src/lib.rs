//! LightSword Protocol Definitions
//!
//! This crate defines the wire formats spoken by the LightSword local
//! client: the SOCKS5 greeting and request seen from local applications,
//! and the encrypted handshake framing exchanged with the upstream relay.

mod error;
mod handshake;
mod socks5;

pub use error::*;
pub use handshake::*;
pub use socks5::*;
