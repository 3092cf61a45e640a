// ============================================
// File: crates/quill-core/src/crypto/kex.rs
// ============================================
//! # Curve25519 Key Exchange
//!
//! ## Creation Reason
//! Provides the Diffie-Hellman primitive behind both the server's static
//! config keypair and the per-connection ephemeral keypair.
//!
//! ## Main Functionality
//! - `Curve25519Kex`: keypair generation and shared-secret computation
//!
//! ## ⚠️ Important Note for Next Developer
//! - Scalar clamping per RFC 7748 is applied by x25519-dalek; do not
//!   pre-mangle the random bytes
//! - An instance is single-use by convention (one peer), but the shared
//!   key computation itself is idempotent
//!
//! ## Last Modified
//! v0.1.0 - Initial key exchange implementation

use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use quill_common::entropy::EntropySource;

use super::CURVE25519_KEY_SIZE;
use crate::error::{CoreError, Result};

// ============================================
// Curve25519Kex
// ============================================

/// Curve25519 keypair for ECDH key exchange.
///
/// # Example
/// ```
/// use quill_core::crypto::Curve25519Kex;
/// use quill_common::entropy::OsEntropy;
///
/// let a = Curve25519Kex::generate(&OsEntropy);
/// let b = Curve25519Kex::generate(&OsEntropy);
/// let sa = a.shared_key(&b.public_key()).unwrap();
/// let sb = b.shared_key(&a.public_key()).unwrap();
/// assert_eq!(sa, sb);
/// ```
pub struct Curve25519Kex {
    secret: StaticSecret,
    public: PublicKey,
}

impl Curve25519Kex {
    /// Generates a fresh keypair from the given entropy source.
    #[must_use]
    pub fn generate(entropy: &dyn EntropySource) -> Self {
        let mut bytes = [0u8; CURVE25519_KEY_SIZE];
        entropy.fill_bytes(&mut bytes);
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Returns the 32-byte public value.
    #[must_use]
    pub fn public_key(&self) -> [u8; CURVE25519_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Computes the shared secret with a peer's public value.
    ///
    /// # Errors
    /// Returns `KeyExchange` if `peer_public` is not exactly 32 bytes.
    pub fn shared_key(&self, peer_public: &[u8]) -> Result<[u8; CURVE25519_KEY_SIZE]> {
        if peer_public.len() != CURVE25519_KEY_SIZE {
            return Err(CoreError::key_exchange(format!(
                "peer public value must be {} bytes, got {}",
                CURVE25519_KEY_SIZE,
                peer_public.len()
            )));
        }
        let mut peer = [0u8; CURVE25519_KEY_SIZE];
        peer.copy_from_slice(peer_public);
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
        Ok(shared.to_bytes())
    }
}

impl std::fmt::Debug for Curve25519Kex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the private scalar
        f.debug_struct("Curve25519Kex")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
