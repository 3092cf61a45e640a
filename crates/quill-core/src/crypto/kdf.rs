// ============================================
// File: crates/quill-core/src/crypto/kdf.rs
// ============================================
//! # QUIC Key Expansion
//!
//! ## Creation Reason
//! Maps a Diffie-Hellman shared secret plus the handshake transcript to a
//! directional ChaCha20-Poly1305 AEAD pair, for both the initial-secure and
//! the forward-secure tier.
//!
//! ## Main Functionality
//! - `Perspective`: which half of the expansion is the local seal key
//! - `derive_keys_chacha20`: HKDF-SHA256 expansion into key + IV pairs
//! - key diversification for the server's initial write key
//!
//! ## Main Logical Flow
//! 1. HKDF salt = nonce material (client nonce, or client ‖ server nonce)
//! 2. HKDF IKM = shared secret
//! 3. info = label ‖ 0x00 ‖ connection id LE ‖ CHLO ‖ SCFG ‖ cert
//! 4. 72-byte output splits into client key, server key, client IV, server IV
//! 5. Initial tier, version ≥ 33: server key + IV rewritten under the
//!    diversification nonce
//!
//! ## ⚠️ Important Note for Next Developer
//! - The transcript inputs (CHLO, SCFG, cert) MUST be the exact wire bytes;
//!   any re-serialization breaks interop with the client's derivation
//! - Intermediate key material is zeroized before returning
//!
//! ## Last Modified
//! v0.1.0 - Initial key expansion

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use quill_common::types::ConnectionId;

use super::chacha20::ChaCha20Poly1305Aead;
use super::{AEAD_IV_PREFIX_SIZE, CHACHA20_KEY_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::VersionNumber;

// ============================================
// Constants
// ============================================

/// HKDF info label for the initial-secure tier.
const KEY_EXPANSION_LABEL: &[u8] = b"QUIC key expansion";

/// HKDF info label for the forward-secure tier.
const FORWARD_SECURE_KEY_EXPANSION_LABEL: &[u8] = b"QUIC forward secure key expansion";

/// HKDF info label for server-key diversification.
const KEY_DIVERSIFICATION_LABEL: &[u8] = b"QUIC key diversification";

/// Total HKDF output: two keys plus two IV prefixes.
const EXPANSION_SIZE: usize = 2 * CHACHA20_KEY_SIZE + 2 * AEAD_IV_PREFIX_SIZE;

// ============================================
// Perspective
// ============================================

/// Which endpoint the derived AEAD pair belongs to.
///
/// The expansion always produces (client write key, server write key); the
/// perspective decides which of the two becomes the local seal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    /// Derive keys as the client: seal with the client write key.
    Client,
    /// Derive keys as the server: seal with the server write key.
    Server,
}

// ============================================
// Key Derivation
// ============================================

/// Derives a ChaCha20-Poly1305 AEAD pair from a handshake shared secret.
///
/// # Arguments
/// * `version` - negotiated protocol version
/// * `forward_secure` - selects the forward-secure expansion label
/// * `perspective` - which write key becomes the local seal key
/// * `shared_secret` - ECDH output (static for initial, ephemeral for
///   forward-secure)
/// * `nonces` - client nonce, or client nonce ‖ server nonce
/// * `conn_id` - connection the keys are bound to
/// * `chlo` - exact client-hello wire bytes
/// * `scfg` - exact serialized server config
/// * `cert` - uncompressed leaf certificate (DER)
/// * `div_nonce` - diversification nonce; initial tier only
///
/// # Errors
/// Returns `KeyDerivation` on HKDF failure (unreachable for this output
/// size) and propagates AEAD construction errors.
#[allow(clippy::too_many_arguments)]
pub fn derive_keys_chacha20(
    version: VersionNumber,
    forward_secure: bool,
    perspective: Perspective,
    shared_secret: &[u8],
    nonces: &[u8],
    conn_id: ConnectionId,
    chlo: &[u8],
    scfg: &[u8],
    cert: &[u8],
    div_nonce: Option<&[u8]>,
) -> Result<ChaCha20Poly1305Aead> {
    let label = if forward_secure {
        FORWARD_SECURE_KEY_EXPANSION_LABEL
    } else {
        KEY_EXPANSION_LABEL
    };

    let mut info =
        Vec::with_capacity(label.len() + 1 + 8 + chlo.len() + scfg.len() + cert.len());
    info.extend_from_slice(label);
    info.push(0x00);
    info.extend_from_slice(&conn_id.to_le_bytes());
    info.extend_from_slice(chlo);
    info.extend_from_slice(scfg);
    info.extend_from_slice(cert);

    let hk = Hkdf::<Sha256>::new(Some(nonces), shared_secret);
    let mut okm = [0u8; EXPANSION_SIZE];
    hk.expand(&info, &mut okm)
        .map_err(|_| CoreError::key_derivation("HKDF expansion failed"))?;

    let (client_key, rest) = okm.split_at_mut(CHACHA20_KEY_SIZE);
    let (server_key, rest) = rest.split_at_mut(CHACHA20_KEY_SIZE);
    let (client_iv, server_iv) = rest.split_at_mut(AEAD_IV_PREFIX_SIZE);

    // The server's initial write key is diversified per connection so that
    // observers cannot correlate connections resumed under the same SCFG.
    if !forward_secure && version.uses_diversification_nonce() {
        if let Some(nonce) = div_nonce {
            diversify(server_key, server_iv, nonce)?;
        }
    }

    let aead = match perspective {
        Perspective::Server => {
            ChaCha20Poly1305Aead::new(client_key, server_key, client_iv, server_iv)
        }
        Perspective::Client => {
            ChaCha20Poly1305Aead::new(server_key, client_key, server_iv, client_iv)
        }
    };

    okm.zeroize();
    info.zeroize();

    aead
}

/// Rewrites `key` and `iv` in place under the diversification nonce.
fn diversify(key: &mut [u8], iv: &mut [u8], div_nonce: &[u8]) -> Result<()> {
    let mut secret = Vec::with_capacity(key.len() + iv.len());
    secret.extend_from_slice(key);
    secret.extend_from_slice(iv);

    let hk = Hkdf::<Sha256>::new(Some(div_nonce), &secret);
    let mut okm = vec![0u8; key.len() + iv.len()];
    hk.expand(KEY_DIVERSIFICATION_LABEL, &mut okm)
        .map_err(|_| CoreError::key_derivation("HKDF diversification failed"))?;

    key.copy_from_slice(&okm[..key.len()]);
    iv.copy_from_slice(&okm[key.len()..]);

    secret.zeroize();
    okm.zeroize();
    Ok(())
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Aead;
    use crate::protocol::version;

    const SHARED: [u8; 32] = [0x42; 32];
    const NONCES: [u8; 32] = [0x11; 32];

    fn derive(perspective: Perspective, forward_secure: bool) -> ChaCha20Poly1305Aead {
        derive_keys_chacha20(
            version::VERSION_34,
            forward_secure,
            perspective,
            &SHARED,
            &NONCES,
            ConnectionId::new(0x1337),
            b"chlo bytes",
            b"scfg bytes",
            b"certificate",
            Some(&[0x99; 32]),
        )
        .unwrap()
    }

    #[test]
    fn test_client_server_halves_interoperate() {
        let server = derive(Perspective::Server, false);
        let client = derive(Perspective::Client, false);

        let sealed = server.seal(7, b"hdr", b"from server").unwrap();
        assert_eq!(client.open(7, b"hdr", &sealed).unwrap(), b"from server");

        let sealed = client.seal(8, b"hdr", b"from client").unwrap();
        assert_eq!(server.open(8, b"hdr", &sealed).unwrap(), b"from client");
    }

    #[test]
    fn test_forward_secure_differs_from_initial() {
        let initial = derive(Perspective::Server, false);
        let forward = derive(Perspective::Server, true);
        let sealed = initial.seal(1, b"hdr", b"payload").unwrap();
        // Opening under the other tier's keys must fail
        let client_forward = derive(Perspective::Client, true);
        assert!(client_forward.open(1, b"hdr", &sealed).is_err());
        drop(forward);
    }

    #[test]
    fn test_diversification_changes_server_keys() {
        let plain = derive_keys_chacha20(
            version::VERSION_34,
            false,
            Perspective::Server,
            &SHARED,
            &NONCES,
            ConnectionId::new(0x1337),
            b"chlo bytes",
            b"scfg bytes",
            b"certificate",
            None,
        )
        .unwrap();
        let diversified = derive(Perspective::Server, false);

        let a = plain.seal(1, b"hdr", b"payload").unwrap();
        let b = diversified.seal(1, b"hdr", b"payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_old_versions_skip_diversification() {
        let with_nonce = derive_keys_chacha20(
            version::VERSION_32,
            false,
            Perspective::Server,
            &SHARED,
            &NONCES,
            ConnectionId::new(0x1337),
            b"chlo bytes",
            b"scfg bytes",
            b"certificate",
            Some(&[0x99; 32]),
        )
        .unwrap();
        let without = derive_keys_chacha20(
            version::VERSION_32,
            false,
            Perspective::Server,
            &SHARED,
            &NONCES,
            ConnectionId::new(0x1337),
            b"chlo bytes",
            b"scfg bytes",
            b"certificate",
            None,
        )
        .unwrap();
        assert_eq!(
            with_nonce.seal(1, b"hdr", b"x").unwrap(),
            without.seal(1, b"hdr", b"x").unwrap()
        );
    }

    #[test]
    fn test_transcript_binds_keys() {
        let base = derive(Perspective::Server, false);
        let other = derive_keys_chacha20(
            version::VERSION_34,
            false,
            Perspective::Server,
            &SHARED,
            &NONCES,
            ConnectionId::new(0x1337),
            b"different chlo",
            b"scfg bytes",
            b"certificate",
            Some(&[0x99; 32]),
        )
        .unwrap();
        assert_ne!(
            base.seal(1, b"hdr", b"x").unwrap(),
            other.seal(1, b"hdr", b"x").unwrap()
        );
    }
}
