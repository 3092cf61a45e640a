// ============================================
// File: crates/quill-core/src/handshake/server_config.rs
// ============================================
//! # Server Config
//!
//! ## Creation Reason
//! The server advertises its long-term crypto parameters as a single
//! immutable bundle (SCFG): the static key-exchange public value, accepted
//! algorithms, orbit and expiry. Clients cache it and resume against its
//! id (SCID).
//!
//! ## Main Functionality
//! - `ServerConfig`: immutable config with cached wire serialization
//! - SCID derivation: SHA-256 over the serialization with a zeroed SCID
//!   placeholder, truncated to 16 bytes, patched into place
//! - proof signing and certificate delegation to the [`ProofSigner`]
//!
//! ## Wire Format
//! A handshake message tagged SCFG whose entries land in ascending tag
//! order: VER, AEAD, SCID, PUBS, KEXS, OBIT, EXPY. PUBS carries a 24-bit
//! little-endian length prefix before the 32-byte public value.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The serialization is cached at construction and MUST stay byte-stable;
//!   key expansion and the proof signature bind to it
//! - The SCID placeholder trick works because the real SCID has the same
//!   length as the placeholder; offsets do not move
//!
//! ## Last Modified
//! v0.1.0 - Initial server config

use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use quill_common::entropy::EntropySource;
use quill_common::time::{Clock, Timestamp};

use super::signer::ProofSigner;
use crate::crypto::{Curve25519Kex, StkSource};
use crate::error::Result;
use crate::protocol::version::VERSION_32;
use crate::protocol::{HandshakeMessage, Tag, SCFG_EXPIRY_SECONDS};

// ============================================
// Constants
// ============================================

/// Size of the server config id in bytes.
pub const SCID_SIZE: usize = 16;

/// Size of the orbit field in bytes.
pub const ORBIT_SIZE: usize = 8;

/// Accepted AEAD algorithm tags, preference-ordered.
const AEAD_TAGS: &[u8] = b"CC20";

/// Accepted key-exchange algorithm tags, preference-ordered.
const KEX_TAGS: &[u8] = b"C255";

// ============================================
// ServerConfig
// ============================================

/// Long-lived server crypto configuration, shared by all sessions.
///
/// Immutable after construction; the wire serialization is computed once
/// and cached.
pub struct ServerConfig {
    id: [u8; SCID_SIZE],
    kex: Curve25519Kex,
    stk_source: StkSource,
    signer: Arc<dyn ProofSigner>,
    serialized: Bytes,
}

impl ServerConfig {
    /// Creates a server config with a random orbit and a 30-day expiry.
    ///
    /// # Arguments
    /// * `kex` - the static key-exchange keypair the config advertises
    /// * `signer` - certificate and proof provider
    /// * `stk_source` - source-address token issuer shared with sessions
    /// * `entropy` - source for the orbit
    /// * `clock` - source for the expiry
    #[must_use]
    pub fn new(
        kex: Curve25519Kex,
        signer: Arc<dyn ProofSigner>,
        stk_source: StkSource,
        entropy: &dyn EntropySource,
        clock: &dyn Clock,
    ) -> Self {
        let mut orbit = [0u8; ORBIT_SIZE];
        entropy.fill_bytes(&mut orbit);
        let expiry = clock.now().saturating_add_secs(SCFG_EXPIRY_SECONDS);
        Self::from_parts(kex, signer, stk_source, orbit, expiry)
    }

    /// Creates a server config from explicit orbit and expiry values.
    pub(crate) fn from_parts(
        kex: Curve25519Kex,
        signer: Arc<dyn ProofSigner>,
        stk_source: StkSource,
        orbit: [u8; ORBIT_SIZE],
        expiry: Timestamp,
    ) -> Self {
        let placeholder = [0u8; SCID_SIZE];
        let unhashed = Self::serialize_config(&kex.public_key(), &placeholder, &orbit, expiry);

        let digest = Sha256::digest(&unhashed);
        let mut id = [0u8; SCID_SIZE];
        id.copy_from_slice(&digest[..SCID_SIZE]);

        let serialized = Self::serialize_config(&kex.public_key(), &id, &orbit, expiry);

        Self {
            id,
            kex,
            stk_source,
            signer,
            serialized,
        }
    }

    /// Serializes the config map with the given SCID value.
    fn serialize_config(
        public_key: &[u8; 32],
        scid: &[u8; SCID_SIZE],
        orbit: &[u8; ORBIT_SIZE],
        expiry: Timestamp,
    ) -> Bytes {
        // 24-bit little-endian length prefix before the public value
        let mut pubs = Vec::with_capacity(3 + public_key.len());
        #[allow(clippy::cast_possible_truncation)]
        pubs.extend_from_slice(&[public_key.len() as u8, 0x00, 0x00]);
        pubs.extend_from_slice(public_key);

        let mut message = HandshakeMessage::new(Tag::SCFG, std::collections::BTreeMap::new());
        message.insert(Tag::VER, VERSION_32.tag().to_vec());
        message.insert(Tag::AEAD, AEAD_TAGS.to_vec());
        message.insert(Tag::SCID, scid.to_vec());
        message.insert(Tag::PUBS, pubs);
        message.insert(Tag::KEXS, KEX_TAGS.to_vec());
        message.insert(Tag::OBIT, orbit.to_vec());
        message.insert(Tag::EXPY, expiry.to_le_bytes().to_vec());
        message.serialize()
    }

    /// Returns the 16-byte server config id.
    #[must_use]
    pub const fn id(&self) -> &[u8; SCID_SIZE] {
        &self.id
    }

    /// Returns the cached wire serialization.
    #[must_use]
    pub fn get(&self) -> &[u8] {
        &self.serialized
    }

    /// Returns the static key-exchange keypair.
    #[must_use]
    pub const fn kex(&self) -> &Curve25519Kex {
        &self.kex
    }

    /// Returns the shared source-address token issuer.
    #[must_use]
    pub const fn stk_source(&self) -> &StkSource {
        &self.stk_source
    }

    /// Returns the uncompressed DER leaf certificate for `sni`.
    ///
    /// # Errors
    /// Propagates signer failures.
    pub fn leaf_cert(&self, sni: &str) -> Result<Vec<u8>> {
        self.signer.get_leaf_cert(sni)
    }

    /// Signs the server proof over the optional client hello and this
    /// config's serialization.
    ///
    /// # Errors
    /// Propagates signer failures.
    pub fn sign(&self, sni: &str, chlo: Option<&[u8]>) -> Result<Vec<u8>> {
        self.signer.sign_server_proof(sni, chlo, self.get())
    }

    /// Returns the compressed certificate chain for `sni`.
    ///
    /// # Errors
    /// Propagates signer failures.
    pub fn get_certs_compressed(
        &self,
        sni: &str,
        common_set_hashes: &[u8],
        cached_hashes: &[u8],
    ) -> Result<Vec<u8>> {
        self.signer
            .get_certs_compressed(sni, common_set_hashes, cached_hashes)
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("id", &hex::encode(self.id))
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
