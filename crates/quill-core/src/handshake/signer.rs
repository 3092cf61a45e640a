// ============================================
// File: crates/quill-core/src/handshake/signer.rs
// ============================================
//! # Certificate Signer Interface
//!
//! ## Creation Reason
//! Certificate loading, chain compression and RSA-PSS signing live outside
//! the handshake core. This module defines the contract the core drives
//! and the canonical payload the proof signature covers.
//!
//! ## Main Functionality
//! - `ProofSigner`: trait for leaf-cert lookup, chain compression and
//!   server-proof signing
//! - `server_proof_payload`: the exact byte string a proof signs
//!
//! ## ⚠️ Important Note for Next Developer
//! - Signer failures are fatal handshake errors, never silently skipped
//! - The payload layout is wire-compatible state; do not reorder it
//!
//! ## Last Modified
//! v0.1.0 - Initial signer interface

use crate::error::Result;

// ============================================
// Constants
// ============================================

/// Signature label when the proof covers the client hello.
const PROOF_LABEL_WITH_CHLO: &[u8] = b"QUIC CHLO and server config signature\0";

/// Signature label for older versions where the proof covers the server
/// config alone.
const PROOF_LABEL_CONFIG_ONLY: &[u8] = b"QUIC server config signature\0";

// ============================================
// ProofSigner
// ============================================

/// External certificate and signing provider.
///
/// # Purpose
/// The handshake core treats certificates and signatures as opaque: it
/// fetches the uncompressed leaf (key-expansion input), the compressed
/// chain (REJ `CERT` value) and the signed proof (REJ `PROF` value) through
/// this trait.
///
/// # Thread Safety
/// Implementations are shared read-only across all sessions.
pub trait ProofSigner: Send + Sync {
    /// Returns the uncompressed DER leaf certificate for `sni`.
    ///
    /// # Errors
    /// Returns `Signer` if no certificate is configured for the name.
    fn get_leaf_cert(&self, sni: &str) -> Result<Vec<u8>>;

    /// Returns the compressed certificate chain for `sni`.
    ///
    /// `common_set_hashes` and `cached_hashes` are the client's CCS/CCRT
    /// values (possibly empty); the compression format is opaque to the
    /// handshake core.
    ///
    /// # Errors
    /// Returns `Signer` on lookup or compression failure.
    fn get_certs_compressed(
        &self,
        sni: &str,
        common_set_hashes: &[u8],
        cached_hashes: &[u8],
    ) -> Result<Vec<u8>>;

    /// Signs the server proof (RSA-PSS-SHA256) over
    /// [`server_proof_payload`]`(chlo, scfg)`.
    ///
    /// # Errors
    /// Returns `Signer` on signing failure.
    fn sign_server_proof(&self, sni: &str, chlo: Option<&[u8]>, scfg: &[u8]) -> Result<Vec<u8>>;
}

// ============================================
// Proof Payload
// ============================================

/// Builds the byte string the server proof signs.
///
/// With a client hello: label ‖ CHLO length u32 BE ‖ CHLO ‖ SCFG.
/// Without (version ≤ 30): config-only label ‖ SCFG.
#[must_use]
pub fn server_proof_payload(chlo: Option<&[u8]>, scfg: &[u8]) -> Vec<u8> {
    match chlo {
        Some(chlo) => {
            let mut payload = Vec::with_capacity(
                PROOF_LABEL_WITH_CHLO.len() + 4 + chlo.len() + scfg.len(),
            );
            payload.extend_from_slice(PROOF_LABEL_WITH_CHLO);
            #[allow(clippy::cast_possible_truncation)]
            payload.extend_from_slice(&(chlo.len() as u32).to_be_bytes());
            payload.extend_from_slice(chlo);
            payload.extend_from_slice(scfg);
            payload
        }
        None => {
            let mut payload =
                Vec::with_capacity(PROOF_LABEL_CONFIG_ONLY.len() + scfg.len());
            payload.extend_from_slice(PROOF_LABEL_CONFIG_ONLY);
            payload.extend_from_slice(scfg);
            payload
        }
    }
}

// ============================================
// Tests
// ============================================
