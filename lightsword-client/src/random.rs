//! Randomness source for IVs and handshake padding
//!
//! Passed to the server explicitly so tests can make the handshake
//! deterministic.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Mutex;

pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]);

    fn next_u8(&self) -> u8 {
        let mut b = [0u8; 1];
        self.fill_bytes(&mut b);
        b[0]
    }
}

/// Thread-local CSPRNG seeded from the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        rand::thread_rng().fill_bytes(dest);
    }
}

/// Reproducible source for tests and benchmarks
#[derive(Debug)]
pub struct SeededRandom(Mutex<StdRng>);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl RandomSource for SeededRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        let mut rng = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.fill_bytes(dest);
    }
}

/// Random padding for one handshake: length in [0, 255], random content.
///
/// The length doubles as the client -> relay obfuscation byte.
pub fn handshake_padding(rng: &dyn RandomSource) -> Vec<u8> {
    let len = rng.next_u8() as usize;
    let mut padding = vec![0u8; len];
    rng.fill_bytes(&mut padding);
    padding
}
