//! Randomness sources.
//!
//! Bucket creation needs a secure random source for the gaps between bucket
//! values. The source is injected explicitly so tests can substitute a
//! deterministic one; production code uses `SystemRandomSource`, which wraps
//! `ring::rand::SystemRandom` — the same randomness backend the ciphers use
//! for their IVs.

use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{CryptcellError, Result};

/// A source of random bytes.
pub trait RandomSource {
    /// Fill `dest` with random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<()>;

    /// Return a uniform random value in `[0, bound)`.
    ///
    /// `bound` must be a power of two (bucket gaps always are), so masking
    /// is unbiased.
    fn below(&self, bound: u32) -> Result<u32> {
        debug_assert!(bound.is_power_of_two());
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(u32::from_be_bytes(buf) & (bound - 1))
    }
}

/// The production random source, backed by the operating system.
pub struct SystemRandomSource {
    rng: SystemRandom,
}

impl SystemRandomSource {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SystemRandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandomSource {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        self.rng
            .fill(dest)
            .map_err(|_| CryptcellError::RandomnessFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_stays_in_bound() {
        let rng = SystemRandomSource::new();
        for _ in 0..64 {
            assert!(rng.below(8).unwrap() < 8);
            assert!(rng.below(1).unwrap() == 0);
        }
    }
}
