//! Cipher Setup for the relay handshake
//!
//! AES in full-block CFB mode, keyed with OpenSSL's `EVP_BytesToKey`
//! (MD5, one round). Only the handshake frames go through the cipher;
//! the bulk stream after the handshake is XOR-obfuscated instead.

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use md5::{Digest, Md5};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::random::RandomSource;

/// AES block size, which is also the IV length for every supported cipher
pub const IV_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("Unsupported cipher algorithm: {0}")]
    Unsupported(String),

    #[error("Invalid IV length: {0} bytes (expected {IV_LEN})")]
    InvalidIvLength(usize),

    #[error("Key or IV does not fit the cipher")]
    InvalidKeyMaterial,
}

/// Supported handshake ciphers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Aes128Cfb,
    Aes192Cfb,
    Aes256Cfb,
}

impl CipherKind {
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::Aes128Cfb => 16,
            CipherKind::Aes192Cfb => 24,
            CipherKind::Aes256Cfb => 32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherKind::Aes128Cfb => "aes-128-cfb",
            CipherKind::Aes192Cfb => "aes-192-cfb",
            CipherKind::Aes256Cfb => "aes-256-cfb",
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherKind {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes-128-cfb" => Ok(CipherKind::Aes128Cfb),
            "aes-192-cfb" => Ok(CipherKind::Aes192Cfb),
            "aes-256-cfb" => Ok(CipherKind::Aes256Cfb),
            _ => Err(CipherError::Unsupported(s.to_string())),
        }
    }
}

/// Equivalent to OpenSSL's EVP_BytesToKey() with MD5 and count 1
pub fn bytes_to_key(password: &[u8], key_len: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(Vec::with_capacity(key_len + 16));
    let mut prev: Vec<u8> = Vec::new();
    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }
    key.truncate(key_len);
    key
}

/// Key material for one configured algorithm/password pair.
///
/// Derived once and shared by every relay connection of a server.
#[derive(Clone)]
pub struct CipherContext {
    kind: CipherKind,
    key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherContext")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl CipherContext {
    pub fn new(kind: CipherKind, password: &str) -> Self {
        Self {
            kind,
            key: bytes_to_key(password.as_bytes(), kind.key_len()),
        }
    }

    /// A fresh encrypt instance together with its random IV
    pub fn encryptor(&self, rng: &dyn RandomSource) -> (Encryptor, [u8; IV_LEN]) {
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut iv);
        let encryptor = Encryptor {
            kind: self.kind,
            key: self.key.clone(),
            iv,
        };
        (encryptor, iv)
    }

    /// A decrypt instance for the IV announced by the peer
    pub fn decryptor(&self, iv: &[u8]) -> Result<Decryptor, CipherError> {
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| CipherError::InvalidIvLength(iv.len()))?;
        Ok(Decryptor {
            kind: self.kind,
            key: self.key.clone(),
            iv,
        })
    }
}

/// One-shot encryptor, consumed by a whole-buffer encrypt
pub struct Encryptor {
    kind: CipherKind,
    key: Zeroizing<Vec<u8>>,
    iv: [u8; IV_LEN],
}

impl Encryptor {
    pub fn encrypt(self, buf: &mut [u8]) -> Result<(), CipherError> {
        let (key, iv) = (self.key.as_slice(), &self.iv[..]);
        match self.kind {
            CipherKind::Aes128Cfb => {
                cfb_mode::Encryptor::<Aes128>::new_from_slices(key, iv)
                    .map_err(|_| CipherError::InvalidKeyMaterial)?
                    .encrypt(buf)
            }
            CipherKind::Aes192Cfb => {
                cfb_mode::Encryptor::<Aes192>::new_from_slices(key, iv)
                    .map_err(|_| CipherError::InvalidKeyMaterial)?
                    .encrypt(buf)
            }
            CipherKind::Aes256Cfb => {
                cfb_mode::Encryptor::<Aes256>::new_from_slices(key, iv)
                    .map_err(|_| CipherError::InvalidKeyMaterial)?
                    .encrypt(buf)
            }
        }
        Ok(())
    }
}

/// One-shot decryptor, consumed by a whole-buffer decrypt
pub struct Decryptor {
    kind: CipherKind,
    key: Zeroizing<Vec<u8>>,
    iv: [u8; IV_LEN],
}

impl Decryptor {
    pub fn decrypt(self, buf: &mut [u8]) -> Result<(), CipherError> {
        let (key, iv) = (self.key.as_slice(), &self.iv[..]);
        match self.kind {
            CipherKind::Aes128Cfb => {
                cfb_mode::Decryptor::<Aes128>::new_from_slices(key, iv)
                    .map_err(|_| CipherError::InvalidKeyMaterial)?
                    .decrypt(buf)
            }
            CipherKind::Aes192Cfb => {
                cfb_mode::Decryptor::<Aes192>::new_from_slices(key, iv)
                    .map_err(|_| CipherError::InvalidKeyMaterial)?
                    .decrypt(buf)
            }
            CipherKind::Aes256Cfb => {
                cfb_mode::Decryptor::<Aes256>::new_from_slices(key, iv)
                    .map_err(|_| CipherError::InvalidKeyMaterial)?
                    .decrypt(buf)
            }
        }
        Ok(())
    }
}
