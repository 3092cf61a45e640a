// ============================================
// File: crates/quill-core/src/crypto/chacha20.rs
// ============================================
//! # ChaCha20-Poly1305 Packet Protection
//!
//! ## Creation Reason
//! Implements the real packet-protection AEAD: one sealing direction and
//! one opening direction, each with its own key and 4-byte IV prefix.
//!
//! ## Main Functionality
//! - `ChaCha20Poly1305Aead`: directional cipher pair implementing [`Aead`]
//!
//! ## Nonce Construction
//! ```text
//! nonce (12 bytes) = IV prefix (4 bytes) ‖ packet number (8 bytes LE)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A (key, packet number) pair MUST be unique in the seal direction;
//!   nonce reuse is a catastrophic failure
//! - The associated data is the packet's public header, byte-exact
//!
//! ## Last Modified
//! v0.1.0 - Initial ChaCha20-Poly1305 implementation

use chacha20poly1305::{
    aead::{Aead as _, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};

use quill_common::error::CommonError;

use super::{Aead, AEAD_IV_PREFIX_SIZE, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, CHACHA20_KEY_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::PacketNumber;

// ============================================
// ChaCha20Poly1305Aead
// ============================================

/// Directional ChaCha20-Poly1305 AEAD pair.
///
/// Holds independent keys and IV prefixes for the seal (outbound) and open
/// (inbound) directions. The key-derivation pipeline assigns the client
/// write key to one direction and the server write key to the other,
/// depending on perspective.
pub struct ChaCha20Poly1305Aead {
    sealer: ChaCha20Poly1305,
    opener: ChaCha20Poly1305,
    seal_iv: [u8; AEAD_IV_PREFIX_SIZE],
    open_iv: [u8; AEAD_IV_PREFIX_SIZE],
}

impl ChaCha20Poly1305Aead {
    /// Creates an AEAD pair from raw key material.
    ///
    /// # Arguments
    /// * `open_key` - 32-byte key the peer seals with
    /// * `seal_key` - 32-byte key this side seals with
    /// * `open_iv` - 4-byte IV prefix for the open direction
    /// * `seal_iv` - 4-byte IV prefix for the seal direction
    ///
    /// # Errors
    /// Returns `InvalidLength` if any input has the wrong size.
    pub fn new(open_key: &[u8], seal_key: &[u8], open_iv: &[u8], seal_iv: &[u8]) -> Result<Self> {
        if open_key.len() != CHACHA20_KEY_SIZE {
            return Err(CommonError::invalid_length(CHACHA20_KEY_SIZE, open_key.len()).into());
        }
        if seal_key.len() != CHACHA20_KEY_SIZE {
            return Err(CommonError::invalid_length(CHACHA20_KEY_SIZE, seal_key.len()).into());
        }
        if open_iv.len() != AEAD_IV_PREFIX_SIZE {
            return Err(CommonError::invalid_length(AEAD_IV_PREFIX_SIZE, open_iv.len()).into());
        }
        if seal_iv.len() != AEAD_IV_PREFIX_SIZE {
            return Err(CommonError::invalid_length(AEAD_IV_PREFIX_SIZE, seal_iv.len()).into());
        }

        let mut open_prefix = [0u8; AEAD_IV_PREFIX_SIZE];
        open_prefix.copy_from_slice(open_iv);
        let mut seal_prefix = [0u8; AEAD_IV_PREFIX_SIZE];
        seal_prefix.copy_from_slice(seal_iv);

        Ok(Self {
            sealer: ChaCha20Poly1305::new(Key::from_slice(seal_key)),
            opener: ChaCha20Poly1305::new(Key::from_slice(open_key)),
            seal_iv: seal_prefix,
            open_iv: open_prefix,
        })
    }

    /// Builds the 12-byte nonce for a packet number in one direction.
    fn make_nonce(iv_prefix: &[u8; AEAD_IV_PREFIX_SIZE], packet_number: PacketNumber) -> [u8; AEAD_NONCE_SIZE] {
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        nonce[..AEAD_IV_PREFIX_SIZE].copy_from_slice(iv_prefix);
        nonce[AEAD_IV_PREFIX_SIZE..].copy_from_slice(&packet_number.to_le_bytes());
        nonce
    }
}

impl Aead for ChaCha20Poly1305Aead {
    fn seal(
        &self,
        packet_number: PacketNumber,
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let nonce = Self::make_nonce(&self.seal_iv, packet_number);
        self.sealer
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| CoreError::encryption("packet payload"))
    }

    fn open(
        &self,
        packet_number: PacketNumber,
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let nonce = Self::make_nonce(&self.open_iv, packet_number);
        self.opener
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map_err(|_| CoreError::Decryption)
    }

    fn overhead(&self) -> usize {
        AEAD_TAG_SIZE
    }
}

impl std::fmt::Debug for ChaCha20Poly1305Aead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("ChaCha20Poly1305Aead").finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
