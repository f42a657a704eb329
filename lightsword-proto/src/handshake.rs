//! Relay Handshake Framing
//!
//! The handshake is the only part of a relay session protected by the
//! block cipher. Plaintext layouts (before encryption):
//! - REQUEST: [tag:1][padding_len:1][padding:padding_len][socks5_request:N]
//! - REPLY:   [padding_len:1][padding:padding_len][socks5_reply:N]
//!
//! On the wire each frame is `[iv][ciphertext]`. After the handshake the
//! payload travels as raw bytes XORed with a single key byte per direction:
//! the client's own padding length outbound, the relay's padding length
//! inbound.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtoError;

/// Tag identifying a desktop SOCKS5 client to the relay
pub const CLIENT_TAG: u8 = 0xA5;

/// Largest handshake reply read from the relay
pub const MAX_HANDSHAKE_REPLY: usize = 1024;

/// Largest padding a frame can announce
pub const MAX_PADDING: usize = u8::MAX as usize;

/// Plaintext handshake request sent to the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub tag: u8,
    pub padding: Bytes,
    /// The client's original SOCKS5 request buffer, forwarded verbatim
    pub request: Bytes,
}

impl HandshakeRequest {
    /// The obfuscation key for client -> relay payload
    pub fn padding_len(&self) -> u8 {
        self.padding.len() as u8
    }

    pub fn encode(&self) -> Result<BytesMut, ProtoError> {
        if self.padding.len() > MAX_PADDING {
            return Err(ProtoError::FrameTooLarge(self.padding.len(), MAX_PADDING));
        }

        let mut buf = BytesMut::with_capacity(2 + self.padding.len() + self.request.len());
        buf.put_u8(self.tag);
        buf.put_u8(self.padding.len() as u8);
        buf.put_slice(&self.padding);
        buf.put_slice(&self.request);
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        if data.is_empty() {
            return Err(ProtoError::EmptyMessage);
        }

        let mut buf = data;
        if buf.remaining() < 2 {
            return Err(ProtoError::InsufficientData);
        }
        let tag = buf.get_u8();
        let padding_len = buf.get_u8() as usize;
        if buf.remaining() < padding_len {
            return Err(ProtoError::InsufficientData);
        }
        let padding = buf.copy_to_bytes(padding_len);
        let request = buf.copy_to_bytes(buf.remaining());

        Ok(Self {
            tag,
            padding,
            request,
        })
    }
}

/// Plaintext handshake reply received from the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReply {
    /// The obfuscation key for relay -> client payload
    pub padding_size: u8,
    /// SOCKS5 reply to hand to the local client
    pub reply: Bytes,
}

impl HandshakeReply {
    pub fn encode(padding: &[u8], reply: &[u8]) -> Result<BytesMut, ProtoError> {
        if padding.len() > MAX_PADDING {
            return Err(ProtoError::FrameTooLarge(padding.len(), MAX_PADDING));
        }

        let mut buf = BytesMut::with_capacity(1 + padding.len() + reply.len());
        buf.put_u8(padding.len() as u8);
        buf.put_slice(padding);
        buf.put_slice(reply);
        Ok(buf)
    }

    /// Split a decrypted reply, discarding the padding.
    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        if data.is_empty() {
            return Err(ProtoError::EmptyMessage);
        }

        let mut buf = data;
        let padding_size = buf.get_u8();
        if buf.remaining() < padding_size as usize {
            return Err(ProtoError::InsufficientData);
        }
        buf.advance(padding_size as usize);

        Ok(Self {
            padding_size,
            reply: Bytes::copy_from_slice(buf),
        })
    }
}

/// XOR every byte of `buf` with `key`.
#[inline]
pub fn xor_in_place(buf: &mut [u8], key: u8) {
    for b in buf.iter_mut() {
        *b ^= key;
    }
}
