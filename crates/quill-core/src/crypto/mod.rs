// ============================================
// File: crates/quill-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes the cryptographic operations behind the early-QUIC
//! handshake, using audited RustCrypto implementations.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`chacha20`]: ChaCha20-Poly1305 packet protection
//! - [`null_aead`]: FNV-1a framing authenticator for unencrypted packets
//! - [`kex`]: Curve25519 key exchange
//! - [`kdf`]: QUIC key expansion (HKDF-SHA256)
//! - [`stk`]: source-address token issuance and verification
//!
//! ## Cryptographic Design
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Handshake Phase                          │
//! │   client PUBS ──► Curve25519 ──► shared secret               │
//! │                                      │                       │
//! │   nonces, conn id, CHLO, SCFG, cert  │                       │
//! │                      └───────────────┼──► HKDF-SHA256        │
//! │                                      ▼                       │
//! │              key + IV pairs ──► ChaCha20-Poly1305            │
//! └──────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Packet Phase                             │
//! │   nonce = IV prefix (4) ‖ packet number LE (8)               │
//! │   AAD   = public header bytes                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL implementations use RustCrypto (audited)
//! - NEVER roll your own crypto primitives
//! - Key material flowing through local buffers MUST be zeroized
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod chacha20;
pub mod kdf;
pub mod kex;
pub mod null_aead;
pub mod stk;

// Re-export primary types at module level
pub use chacha20::ChaCha20Poly1305Aead;
pub use kex::Curve25519Kex;
pub use null_aead::NullAead;
pub use stk::{StkError, StkSource};

use crate::error::Result;
use crate::protocol::PacketNumber;

// ============================================
// Constants
// ============================================

/// Size of a ChaCha20-Poly1305 key in bytes.
pub const CHACHA20_KEY_SIZE: usize = 32;

/// Size of the per-direction IV prefix in bytes.
pub const AEAD_IV_PREFIX_SIZE: usize = 4;

/// Size of the per-packet AEAD nonce in bytes.
pub const AEAD_NONCE_SIZE: usize = 12;

/// Size of the Poly1305 / GCM authentication tag in bytes.
pub const AEAD_TAG_SIZE: usize = 16;

/// Size of the truncated FNV-1a hash appended by the null authenticator.
pub const NULL_AEAD_HASH_SIZE: usize = 12;

/// Size of a Curve25519 public value or shared secret in bytes.
pub const CURVE25519_KEY_SIZE: usize = 32;

// ============================================
// Aead Trait
// ============================================

/// Per-packet authenticated encryption.
///
/// # Purpose
/// A single interface over the three protection tiers the handshake moves
/// through: the null authenticator, the initial-secure AEAD, and the
/// forward-secure AEAD. The dispatcher in the handshake core selects one of
/// these per packet.
///
/// # Nonce Discipline
/// The packet number is the only varying nonce input. Callers MUST NOT
/// reuse a packet number under the same key in the seal direction.
pub trait Aead: Send + Sync {
    /// Seals `plaintext`, authenticating `associated_data` alongside it.
    ///
    /// # Returns
    /// Ciphertext followed by the authentication tag.
    ///
    /// # Errors
    /// Returns `Encryption` if the plaintext exceeds the cipher's limits.
    fn seal(
        &self,
        packet_number: PacketNumber,
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Opens `ciphertext`, verifying the tag over it and `associated_data`.
    ///
    /// # Errors
    /// Returns `Decryption` if the tag does not verify.
    fn open(
        &self,
        packet_number: PacketNumber,
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Returns the per-packet overhead added by `seal`, in bytes.
    fn overhead(&self) -> usize;
}
