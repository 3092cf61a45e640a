// ============================================
// File: crates/quill-core/src/crypto/null_aead.rs
// ============================================
//! # Null Authenticator
//!
//! ## Creation Reason
//! Packets exchanged before any real key is installed still need integrity
//! framing. The null authenticator appends a truncated FNV-1a-128 hash over
//! the associated data and payload instead of encrypting.
//!
//! ## Main Functionality
//! - `NullAead`: [`Aead`] implementation with no confidentiality
//! - `fnv1a_128`: the 128-bit FNV-1a hash it truncates
//!
//! ## ⚠️ Important Note for Next Developer
//! - This provides NO confidentiality and NO cryptographic authentication;
//!   it only detects accidental corruption and trivial tampering
//! - It must never be selected once a real AEAD is installed
//!
//! ## Last Modified
//! v0.1.0 - Initial null authenticator

use super::{Aead, NULL_AEAD_HASH_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::PacketNumber;

// ============================================
// FNV-1a-128
// ============================================

const FNV128_OFFSET_BASIS: u128 = 0x6c62_272e_07bb_0142_62b8_2175_6295_c58d;
const FNV128_PRIME: u128 = 0x0000_0000_0100_0000_0000_0000_0000_013b;

/// Computes the 128-bit FNV-1a hash over the concatenation of the inputs.
fn fnv1a_128(parts: &[&[u8]]) -> u128 {
    let mut hash = FNV128_OFFSET_BASIS;
    for part in parts {
        for &byte in *part {
            hash ^= u128::from(byte);
            hash = hash.wrapping_mul(FNV128_PRIME);
        }
    }
    hash
}

/// Truncates an FNV-1a-128 value to the 12-byte wire hash (low 96 bits,
/// little-endian).
fn truncated_hash(hash: u128) -> [u8; NULL_AEAD_HASH_SIZE] {
    let mut out = [0u8; NULL_AEAD_HASH_SIZE];
    out.copy_from_slice(&hash.to_le_bytes()[..NULL_AEAD_HASH_SIZE]);
    out
}

// ============================================
// NullAead
// ============================================

/// Framing-only authenticator used before key establishment.
///
/// `seal` emits `plaintext ‖ hash12` where `hash12` is the truncated
/// FNV-1a-128 of `associated_data ‖ plaintext`; `open` verifies and strips
/// the hash. The packet number does not participate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAead;

impl NullAead {
    /// Creates a new null authenticator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Aead for NullAead {
    fn seal(
        &self,
        _packet_number: PacketNumber,
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let hash = truncated_hash(fnv1a_128(&[associated_data, plaintext]));
        let mut out = Vec::with_capacity(plaintext.len() + NULL_AEAD_HASH_SIZE);
        out.extend_from_slice(plaintext);
        out.extend_from_slice(&hash);
        Ok(out)
    }

    fn open(
        &self,
        _packet_number: PacketNumber,
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        if ciphertext.len() < NULL_AEAD_HASH_SIZE {
            return Err(CoreError::Decryption);
        }
        let (plaintext, received) = ciphertext.split_at(ciphertext.len() - NULL_AEAD_HASH_SIZE);
        let expected = truncated_hash(fnv1a_128(&[associated_data, plaintext]));
        if received != expected {
            return Err(CoreError::Decryption);
        }
        Ok(plaintext.to_vec())
    }

    fn overhead(&self) -> usize {
        NULL_AEAD_HASH_SIZE
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let aead = NullAead::new();
        let sealed = aead.seal(1, b"header", b"payload").unwrap();
        assert_eq!(sealed.len(), 7 + NULL_AEAD_HASH_SIZE);
        let opened = aead.open(1, b"header", &sealed).unwrap();
        assert_eq!(opened, b"payload");
    }

    #[test]
    fn test_open_detects_aad_change() {
        let aead = NullAead::new();
        let sealed = aead.seal(1, b"header", b"payload").unwrap();
        assert!(matches!(
            aead.open(1, b"other", &sealed),
            Err(CoreError::Decryption)
        ));
    }

    #[test]
    fn test_open_detects_payload_change() {
        let aead = NullAead::new();
        let mut sealed = aead.seal(1, b"header", b"payload").unwrap();
        sealed[0] ^= 0xff;
        assert!(matches!(
            aead.open(1, b"header", &sealed),
            Err(CoreError::Decryption)
        ));
    }

    #[test]
    fn test_open_rejects_short_input() {
        let aead = NullAead::new();
        assert!(matches!(
            aead.open(1, b"", &[0u8; 5]),
            Err(CoreError::Decryption)
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let aead = NullAead::new();
        let sealed = aead.seal(1, b"hdr", b"").unwrap();
        assert_eq!(sealed.len(), NULL_AEAD_HASH_SIZE);
        assert_eq!(aead.open(1, b"hdr", &sealed).unwrap(), b"");
    }

    #[test]
    fn test_fnv1a_known_values() {
        // FNV-1a-128 of the empty string is the offset basis
        assert_eq!(fnv1a_128(&[&b""[..]]), FNV128_OFFSET_BASIS);
        // Concatenation is associative across parts
        assert_eq!(fnv1a_128(&[&b"ab"[..], &b"c"[..]]), fnv1a_128(&[&b"abc"[..]]));
    }
}
