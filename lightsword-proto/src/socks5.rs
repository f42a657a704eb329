//! SOCKS5 wire format (RFC 1928)
//!
//! Only the pieces the local client needs:
//! - greeting / method selection (no-auth only)
//! - CONNECT / BIND / UDP ASSOCIATE request parsing
//! - fixed-layout replies

use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::ProtoError;

/// SOCKS5 version byte
pub const SOCKS_VERSION: u8 = 0x05;

/// SOCKS5 authentication methods
pub const AUTH_NO_AUTH: u8 = 0x00;
pub const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

/// SOCKS5 address types
pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// SOCKS5 reply codes
pub const REP_SUCCESS: u8 = 0x00;
pub const REP_CMD_NOT_SUPPORTED: u8 = 0x07;

/// Largest greeting the client reads before negotiating
pub const MAX_GREETING_SIZE: usize = 768;

/// Largest request buffer (and forwarding read) the client handles
pub const MAX_REQUEST_SIZE: usize = 1520;

/// SOCKS5 commands
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl TryFrom<u8> for Command {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Connect),
            0x02 => Ok(Self::Bind),
            0x03 => Ok(Self::UdpAssociate),
            _ => Err(ProtoError::InvalidCommand(value)),
        }
    }
}

/// Outcome of the method-selection step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    /// Whether the client offered no-auth and the session may continue
    pub accepted: bool,
    /// Bytes to send back to the client, whatever the outcome
    pub reply: [u8; 2],
}

/// Negotiate the authentication method from a client greeting.
///
/// Layout: `[ver][nmethods][methods:nmethods]`. The version byte is not
/// checked; only the first `nmethods` method bytes that are actually
/// present are scanned for no-auth.
///
/// Rejection answers `0xFF` (no acceptable method), never `0x00`.
pub fn negotiate(greeting: &[u8]) -> Negotiation {
    let rejected = Negotiation {
        accepted: false,
        reply: [SOCKS_VERSION, AUTH_NO_ACCEPTABLE],
    };

    if greeting.len() < 2 {
        return rejected;
    }

    let nmethods = greeting[1] as usize;
    let offers_no_auth = greeting[2..].iter().take(nmethods).any(|&m| m == AUTH_NO_AUTH);

    if offers_no_auth {
        Negotiation {
            accepted: true,
            reply: [SOCKS_VERSION, AUTH_NO_AUTH],
        }
    } else {
        rejected
    }
}

/// A parsed SOCKS5 request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5Request {
    pub command: Command,
    /// Destination host: dotted IPv4, canonical IPv6 text, or domain name
    pub host: String,
    pub port: u16,
    /// Number of bytes the request header occupies in the buffer
    pub header_len: usize,
}

impl Socks5Request {
    /// Parse a raw request buffer.
    ///
    /// Format: `[ver:1][cmd:1][rsv:1][atyp:1][addr:N][port:2]`
    pub fn parse(data: &[u8]) -> Result<Self, ProtoError> {
        if data.is_empty() {
            return Err(ProtoError::EmptyMessage);
        }
        if data.len() < 4 {
            return Err(ProtoError::InsufficientData);
        }

        let mut cursor = Cursor::new(data);
        let version = cursor.get_u8();
        if version != SOCKS_VERSION {
            return Err(ProtoError::InvalidVersion(version));
        }
        let command = Command::try_from(cursor.get_u8())?;
        let _reserved = cursor.get_u8();
        let atyp = cursor.get_u8();

        let host = match atyp {
            ATYP_IPV4 => {
                if cursor.remaining() < 4 + 2 {
                    return Err(ProtoError::InsufficientData);
                }
                Ipv4Addr::from(cursor.get_u32()).to_string()
            }
            ATYP_DOMAIN => {
                if cursor.remaining() < 1 {
                    return Err(ProtoError::InsufficientData);
                }
                let len = cursor.get_u8() as usize;
                if cursor.remaining() < len + 2 {
                    return Err(ProtoError::InsufficientData);
                }
                let mut domain = vec![0u8; len];
                cursor.copy_to_slice(&mut domain);
                String::from_utf8(domain).map_err(|_| ProtoError::InvalidUtf8)?
            }
            ATYP_IPV6 => {
                if cursor.remaining() < 16 + 2 {
                    return Err(ProtoError::InsufficientData);
                }
                Ipv6Addr::from(cursor.get_u128()).to_string()
            }
            _ => return Err(ProtoError::InvalidAddressType(atyp)),
        };

        let port = cursor.get_u16();

        Ok(Self {
            command,
            host,
            port,
            header_len: cursor.position() as usize,
        })
    }
}

/// Build the CONNECT success reply by reusing the request bytes.
///
/// The reply keeps the request's address fields and only rewrites the
/// first two bytes to `[0x05, 0x00]`.
pub fn connect_reply_from_request(request: &[u8]) -> Bytes {
    let mut reply = BytesMut::from(request);
    if reply.len() >= 2 {
        reply[0] = SOCKS_VERSION;
        reply[1] = REP_SUCCESS;
    }
    reply.freeze()
}

/// Build a reply carrying `rep` with an all-zero IPv4 bind address.
pub fn reply(rep: u8) -> [u8; 10] {
    [
        SOCKS_VERSION,
        rep,
        0x00, // Reserved
        ATYP_IPV4,
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}
