// ============================================
// File: crates/quill-common/src/entropy.rs
// ============================================
//! # Entropy Injection
//!
//! ## Creation Reason
//! Centralizes randomness behind a trait so that every nonce, orbit and
//! ephemeral key in the handshake is drawn from an injectable source,
//! keeping tests deterministic.
//!
//! ## Main Functionality
//! - `EntropySource`: fill a buffer with cryptographically secure bytes
//! - `OsEntropy`: production implementation over the OS CSPRNG
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every implementation MUST be cryptographically secure in production;
//!   deterministic sources belong in test modules only
//!
//! ## Last Modified
//! v0.1.0 - Initial entropy trait

use rand::rngs::OsRng;
use rand::RngCore;

// ============================================
// EntropySource
// ============================================

/// Cryptographically secure random byte generator.
///
/// # Purpose
/// The handshake core receives an `EntropySource` instead of reaching for a
/// process-wide RNG. Server nonces, diversification nonces, token nonces,
/// orbits and ephemeral key material all flow through this trait.
pub trait EntropySource: Send + Sync {
    /// Fills `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Allocates and returns `len` random bytes.
    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.fill_bytes(&mut buf);
        buf
    }
}

// ============================================
// OsEntropy
// ============================================

/// Production entropy source backed by the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_entropy_fills_buffer() {
        let entropy = OsEntropy;
        let a = entropy.random_bytes(32);
        let b = entropy.random_bytes(32);
        assert_eq!(a.len(), 32);
        // 2^-256 collision chance; a failure here means the source is broken
        assert_ne!(a, b);
    }

    #[test]
    fn test_random_bytes_length() {
        let entropy = OsEntropy;
        assert!(entropy.random_bytes(0).is_empty());
        assert_eq!(entropy.random_bytes(12).len(), 12);
    }
}
