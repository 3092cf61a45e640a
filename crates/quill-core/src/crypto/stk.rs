// ============================================
// File: crates/quill-core/src/crypto/stk.rs
// ============================================
//! # Source-Address Tokens
//!
//! ## Creation Reason
//! Implements the address-validation cookie: an opaque, server-sealed blob
//! binding a client IP to an issuance timestamp. A valid token proves the
//! client can receive packets at the address it claims.
//!
//! ## Main Functionality
//! - `StkSource`: issues and verifies tokens under a derived AES-128-GCM key
//! - `SourceAddressToken`: the 12- or 24-byte plaintext payload
//! - `StkError`: the non-fatal verification taxonomy
//!
//! ## Wire Format
//! ```text
//! envelope  = nonce (12) ‖ ciphertext ‖ tag (16)
//! plaintext = timestamp u64 LE (8) ‖ ip (4 or 16)
//! ```
//!
//! ## Main Logical Flow
//! 1. Rejection replies carry a fresh token
//! 2. A client echoes the token in its next client hello
//! 3. Verification failure is never fatal; it downgrades the hello to
//!    inchoate handling and a fresh token is issued
//!
//! ## ⚠️ Important Note for Next Developer
//! - IPv4-mapped IPv6 addresses MUST normalize to the 4-byte form before
//!   sealing and before comparison, or dual-stack clients flap
//! - Verification must not panic on any byte string
//!
//! ## Last Modified
//! v0.1.0 - Initial source-address tokens

use std::net::IpAddr;
use std::sync::Arc;

use aes_gcm::aead::{Aead as _, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

use quill_common::entropy::EntropySource;
use quill_common::error::CommonError;
use quill_common::time::{Clock, Timestamp};

use super::{AEAD_NONCE_SIZE, AEAD_TAG_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::STK_EXPIRY_SECONDS;

// ============================================
// Constants
// ============================================

/// Size of the derived token-sealing key (AES-128-GCM).
pub const STK_KEY_SIZE: usize = 16;

/// HKDF info label for the token-sealing key.
const STK_KEY_LABEL: &[u8] = b"QUIC source address token key";

/// Timestamp prefix length inside the plaintext.
const TIMESTAMP_SIZE: usize = 8;

// ============================================
// StkError
// ============================================

/// Non-fatal source-address token verification outcomes.
///
/// None of these terminate a session; they downgrade the client hello to
/// inchoate handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StkError {
    /// No token was supplied, or it is too short to carry a sealed payload.
    #[error("STK missing or empty")]
    EmptyToken,

    /// The sealed envelope failed authentication or decrypted to garbage.
    #[error("STK decryption failed")]
    DecryptionFailed,

    /// The embedded timestamp is older than the expiry window.
    #[error("STK expired ({age_secs}s old)")]
    Expired {
        /// Age of the token in seconds
        age_secs: u64,
    },

    /// The embedded address does not match the packet's source address.
    #[error("invalid IP in STK")]
    InvalidIp,
}

// ============================================
// SourceAddressToken
// ============================================

/// Decrypted token payload: issuance time plus normalized client address.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceAddressToken {
    ip: Vec<u8>,
    timestamp: Timestamp,
}

impl SourceAddressToken {
    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TIMESTAMP_SIZE + self.ip.len());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.ip);
        out
    }

    fn parse(data: &[u8]) -> std::result::Result<Self, CommonError> {
        if data.len() < TIMESTAMP_SIZE + 4 {
            return Err(CommonError::invalid_length(TIMESTAMP_SIZE + 4, data.len()));
        }
        let (ts_bytes, ip) = data.split_at(TIMESTAMP_SIZE);
        if ip.len() != 4 && ip.len() != 16 {
            return Err(CommonError::invalid_input(
                "stk ip",
                format!("address must be 4 or 16 bytes, got {}", ip.len()),
            ));
        }
        let mut ts = [0u8; TIMESTAMP_SIZE];
        ts.copy_from_slice(ts_bytes);
        Ok(Self {
            ip: ip.to_vec(),
            timestamp: Timestamp::from_le_bytes(ts),
        })
    }
}

/// Normalizes an address to its wire form: IPv4 and IPv4-mapped IPv6
/// addresses become 4 bytes, everything else stays 16.
fn normalize_ip(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.octets().to_vec(),
            None => v6.octets().to_vec(),
        },
    }
}

// ============================================
// Key Derivation
// ============================================

/// Derives the token-sealing key from the server's STK secret.
///
/// # Errors
/// Returns `KeyDerivation` on HKDF failure (unreachable for 16 bytes).
fn derive_key(secret: &[u8]) -> Result<[u8; STK_KEY_SIZE]> {
    let hk = Hkdf::<Sha256>::new(None, secret);
    let mut key = [0u8; STK_KEY_SIZE];
    hk.expand(STK_KEY_LABEL, &mut key)
        .map_err(|_| CoreError::key_derivation("STK key expansion failed"))?;
    Ok(key)
}

// ============================================
// StkSource
// ============================================

/// Issues and verifies source-address tokens.
///
/// Shared read-only across all sessions; the sealing key is derived once
/// from the process-provided secret at construction.
pub struct StkSource {
    aead: Aes128Gcm,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
}

impl StkSource {
    /// Creates a token source from the server's STK secret.
    ///
    /// # Errors
    /// Returns `KeyDerivation` if the sealing key cannot be derived.
    pub fn new(
        secret: &[u8],
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn EntropySource>,
    ) -> Result<Self> {
        let mut key = derive_key(secret)?;
        let aead = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&key));
        key.zeroize();
        Ok(Self {
            aead,
            clock,
            entropy,
        })
    }

    /// Issues a fresh token binding `ip` to the current time.
    ///
    /// # Errors
    /// Returns `Encryption` if sealing fails.
    pub fn new_token(&self, ip: IpAddr) -> Result<Vec<u8>> {
        let token = SourceAddressToken {
            ip: normalize_ip(ip),
            timestamp: self.clock.now(),
        };
        self.seal(&token)
    }

    /// Verifies a token against the packet's source address.
    ///
    /// # Errors
    /// - `EmptyToken` when `token` is absent or shorter than the envelope
    /// - `DecryptionFailed` when authentication fails or the payload is
    ///   malformed
    /// - `Expired` when the embedded timestamp is older than the window
    /// - `InvalidIp` when the embedded address differs from `ip`
    pub fn verify_token(
        &self,
        ip: IpAddr,
        token: Option<&[u8]>,
    ) -> std::result::Result<(), StkError> {
        let token = token.ok_or(StkError::EmptyToken)?;
        if token.len() < AEAD_NONCE_SIZE + AEAD_TAG_SIZE {
            return Err(StkError::EmptyToken);
        }

        let (nonce, ciphertext) = token.split_at(AEAD_NONCE_SIZE);
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StkError::DecryptionFailed)?;
        let parsed =
            SourceAddressToken::parse(&plaintext).map_err(|_| StkError::DecryptionFailed)?;

        let age_secs = self.clock.now().seconds_since(parsed.timestamp);
        if age_secs > STK_EXPIRY_SECONDS {
            return Err(StkError::Expired { age_secs });
        }

        if parsed.ip != normalize_ip(ip) {
            return Err(StkError::InvalidIp);
        }

        Ok(())
    }

    /// Seals a token payload into the wire envelope.
    fn seal(&self, token: &SourceAddressToken) -> Result<Vec<u8>> {
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        self.entropy.fill_bytes(&mut nonce);

        let plaintext = token.serialize();
        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| CoreError::encryption("source-address token"))?;

        let mut out = Vec::with_capacity(AEAD_NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

impl std::fmt::Debug for StkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the sealing key
        f.debug_struct("StkSource").finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
