// ============================================
// File: crates/quill-core/src/handshake/crypto_setup.rs
// ============================================
//! # Crypto Setup
//!
//! ## Creation Reason
//! Drives the server side of the handshake on the crypto stream and owns
//! the three-tier packet-protection dispatcher the session seals and opens
//! every packet through.
//!
//! ## Handshake Flow
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       CryptoSetup                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  1. Read handshake message (must be CHLO)                    │
//! │     │                                                        │
//! │     ▼                                                        │
//! │  2. Inchoate? (SCID mismatch or STK invalid)                 │
//! │     │ yes                          │ no                      │
//! │     ▼                              ▼                         │
//! │  3. Send REJ                    4. Compute shared secrets    │
//! │     {SCFG, CERT, PROF, STK}        install secure +          │
//! │     loop to 1.                     forward-secure AEADs      │
//! │                                    │                         │
//! │                                    ▼                         │
//! │                                 5. Send SHLO, then fire      │
//! │                                    aead-changed, done        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Protection Tiers
//! Seal: forward-secure once the peer has demonstrated it, else secure
//! once installed, else the null authenticator. Open tries highest-first
//! and latches: a success at a tier makes that tier the floor.
//!
//! ## Concurrency
//! `handle_crypto_stream` runs on the session's crypto task; `seal`,
//! `open` and `diversification_nonce` are called concurrently by the
//! packet processor. The AEAD slots sit behind one readers-writer lock;
//! the received-packet latches are monotonic atomics. Both AEADs are
//! installed in a single write-lock critical section, and the lock is
//! never held across stream I/O or the aead-changed send.
//!
//! ## ⚠️ Important Note for Next Developer
//! - SHLO MUST be flushed to the stream before aead-changed fires
//! - The received-packet latches only ever go from false to true
//! - The raw CHLO bytes feed key expansion and the proof signature;
//!   never re-serialize the parsed message for those inputs
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake state machine

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use quill_common::entropy::EntropySource;
use quill_common::types::ConnectionId;

use super::params::ConnectionParametersManager;
use super::server_config::ServerConfig;
use crate::crypto::kdf::{derive_keys_chacha20, Perspective};
use crate::crypto::{Aead, ChaCha20Poly1305Aead, Curve25519Kex, NullAead};
use crate::error::{CoreError, Result};
use crate::protocol::version::supported_versions_as_tags;
use crate::protocol::{
    HandshakeMessage, PacketNumber, Tag, VersionNumber, CLIENT_HELLO_MIN_SIZE,
};

// ============================================
// Constants
// ============================================

/// Size of the server nonce echoed in the SHLO.
pub const SERVER_NONCE_SIZE: usize = 32;

/// Size of the diversification nonce.
pub const DIVERSIFICATION_NONCE_SIZE: usize = 32;

// ============================================
// HandshakeState
// ============================================

/// Explicit handshake progress. Transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeState {
    /// No acceptable client hello has been processed yet.
    AwaitingChlo,
    /// An inchoate client hello was answered with a rejection.
    RejSent,
    /// A full client hello installed the secure and forward-secure AEADs.
    SecureInstalled,
    /// The peer has demonstrated possession of the forward-secure key.
    ForwardSecureInstalled,
}

// ============================================
// CryptoSetup
// ============================================

/// AEAD slots and handshake progress, guarded by one lock.
struct AeadState {
    state: HandshakeState,
    secure: Option<ChaCha20Poly1305Aead>,
    forward_secure: Option<ChaCha20Poly1305Aead>,
}

/// Per-session handshake state machine and packet-protection dispatcher.
pub struct CryptoSetup {
    conn_id: ConnectionId,
    peer_ip: IpAddr,
    version: VersionNumber,
    scfg: Arc<ServerConfig>,
    server_nonce: [u8; SERVER_NONCE_SIZE],
    diversification_nonce: [u8; DIVERSIFICATION_NONCE_SIZE],

    aead_state: RwLock<AeadState>,
    received_secure_packet: AtomicBool,
    received_forward_secure_packet: AtomicBool,

    params: Arc<ConnectionParametersManager>,
    aead_changed: mpsc::Sender<()>,
    entropy: Arc<dyn EntropySource>,
    null_aead: NullAead,
}

impl CryptoSetup {
    /// Creates the handshake state for one session.
    ///
    /// # Arguments
    /// * `conn_id` - connection the derived keys are bound to
    /// * `peer_ip` - source address tokens are verified against
    /// * `version` - negotiated protocol version
    /// * `scfg` - shared server config
    /// * `params` - shared transport-parameter store
    /// * `aead_changed` - fired once, after the SHLO is on the wire
    /// * `entropy` - source for nonces and the ephemeral key
    #[must_use]
    pub fn new(
        conn_id: ConnectionId,
        peer_ip: IpAddr,
        version: VersionNumber,
        scfg: Arc<ServerConfig>,
        params: Arc<ConnectionParametersManager>,
        aead_changed: mpsc::Sender<()>,
        entropy: Arc<dyn EntropySource>,
    ) -> Self {
        let mut server_nonce = [0u8; SERVER_NONCE_SIZE];
        entropy.fill_bytes(&mut server_nonce);
        let mut diversification_nonce = [0u8; DIVERSIFICATION_NONCE_SIZE];
        entropy.fill_bytes(&mut diversification_nonce);

        Self {
            conn_id,
            peer_ip,
            version,
            scfg,
            server_nonce,
            diversification_nonce,
            aead_state: RwLock::new(AeadState {
                state: HandshakeState::AwaitingChlo,
                secure: None,
                forward_secure: None,
            }),
            received_secure_packet: AtomicBool::new(false),
            received_forward_secure_packet: AtomicBool::new(false),
            params,
            aead_changed,
            entropy,
            null_aead: NullAead::new(),
        }
    }

    /// Reads and answers handshake messages until the handshake completes.
    ///
    /// Returns `Ok(())` once a full client hello has been answered with a
    /// SHLO. Closing the stream unwinds the loop with an I/O error.
    ///
    /// # Errors
    /// All fatal handshake errors of the §7 taxonomy surface here and
    /// terminate the session.
    pub async fn handle_crypto_stream<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        loop {
            let (message, raw) = HandshakeMessage::read_from(stream).await?;
            if message.tag() != Tag::CHLO {
                return Err(CoreError::invalid_message_type(message.tag().to_string()));
            }
            debug!(connection = %self.conn_id, "Received {message}");

            let done = self.handle_message(stream, &raw, &message).await?;
            if done {
                return Ok(());
            }
        }
    }

    /// Handles one client hello; returns `true` when the handshake is done.
    async fn handle_message<S>(
        &self,
        stream: &mut S,
        chlo_bytes: &[u8],
        message: &HandshakeMessage,
    ) -> Result<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let sni = message
            .get(Tag::SNI)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| CoreError::parameter_not_found("SNI"))?;
        let sni = std::str::from_utf8(sni)
            .map_err(|_| CoreError::invalid_message("SNI is not valid UTF-8"))?;

        if self.is_inchoate_chlo(message) {
            let reply = self.handle_inchoate_chlo(sni, chlo_bytes, message)?;
            stream.write_all(&reply).await?;
            stream.flush().await?;

            let mut state = self.aead_state.write();
            if state.state == HandshakeState::AwaitingChlo {
                state.state = HandshakeState::RejSent;
            }
            drop(state);

            info!(connection = %self.conn_id, sni, "Rejection sent");
            return Ok(false);
        }

        let reply = self.handle_chlo(sni, chlo_bytes, message)?;
        stream.write_all(&reply).await?;
        stream.flush().await?;

        // SHLO is on the wire; the session may switch to the new keys now.
        if self.aead_changed.send(()).await.is_err() {
            warn!(connection = %self.conn_id, "aead-changed receiver gone");
        }

        info!(connection = %self.conn_id, sni, "Handshake complete");
        Ok(true)
    }

    /// A hello is inchoate unless it names the current config and carries
    /// a token valid for the peer's address. Token failures downgrade to a
    /// rejection; they are never fatal.
    fn is_inchoate_chlo(&self, message: &HandshakeMessage) -> bool {
        match message.get(Tag::SCID) {
            Some(scid) if scid == self.scfg.id().as_slice() => {}
            _ => return true,
        }
        if let Err(err) = self
            .scfg
            .stk_source()
            .verify_token(self.peer_ip, message.get(Tag::STK))
        {
            warn!(connection = %self.conn_id, error = %err, "Invalid STK, rejecting 0-RTT");
            return true;
        }
        false
    }

    /// Builds the rejection reply: config, compressed chain, signed proof
    /// and a fresh source-address token.
    fn handle_inchoate_chlo(
        &self,
        sni: &str,
        chlo_bytes: &[u8],
        message: &HandshakeMessage,
    ) -> Result<bytes::Bytes> {
        if chlo_bytes.len() < CLIENT_HELLO_MIN_SIZE {
            return Err(CoreError::invalid_value_length(format!(
                "CHLO must be at least {CLIENT_HELLO_MIN_SIZE} bytes, got {}",
                chlo_bytes.len()
            )));
        }

        let chlo_for_proof = self
            .version
            .chlo_in_proof_signature()
            .then_some(chlo_bytes);
        let proof = self.scfg.sign(sni, chlo_for_proof)?;

        let common_set_hashes = message.get(Tag::CCS).unwrap_or_default();
        let cached_hashes = message.get(Tag::CCRT).unwrap_or_default();
        let certs = self
            .scfg
            .get_certs_compressed(sni, common_set_hashes, cached_hashes)?;

        let token = self.scfg.stk_source().new_token(self.peer_ip)?;

        let mut reply = HandshakeMessage::new(Tag::REJ, std::collections::BTreeMap::new());
        reply.insert(Tag::SCFG, self.scfg.get().to_vec());
        reply.insert(Tag::CERT, certs);
        reply.insert(Tag::PROF, proof);
        reply.insert(Tag::STK, token);
        Ok(reply.serialize())
    }

    /// Completes the 0-RTT handshake: installs both AEAD tiers and builds
    /// the server hello.
    fn handle_chlo(
        &self,
        sni: &str,
        chlo_bytes: &[u8],
        message: &HandshakeMessage,
    ) -> Result<bytes::Bytes> {
        let peer_public = message
            .get(Tag::PUBS)
            .ok_or_else(|| CoreError::parameter_not_found("PUBS"))?;
        let client_nonce = message
            .get(Tag::NONC)
            .ok_or_else(|| CoreError::parameter_not_found("NONC"))?;

        let mut shared_secret = self.scfg.kex().shared_key(peer_public)?;
        let leaf_cert = self.scfg.leaf_cert(sni)?;

        let secure = derive_keys_chacha20(
            self.version,
            false,
            Perspective::Server,
            &shared_secret,
            client_nonce,
            self.conn_id,
            chlo_bytes,
            self.scfg.get(),
            &leaf_cert,
            Some(&self.diversification_nonce),
        )?;
        shared_secret.zeroize();

        // Fresh curve instance for the forward-secure tier
        let ephemeral = Curve25519Kex::generate(self.entropy.as_ref());
        let mut ephemeral_shared = ephemeral.shared_key(peer_public)?;

        let mut forward_secure_nonce =
            Vec::with_capacity(client_nonce.len() + SERVER_NONCE_SIZE);
        forward_secure_nonce.extend_from_slice(client_nonce);
        forward_secure_nonce.extend_from_slice(&self.server_nonce);

        let forward_secure = derive_keys_chacha20(
            self.version,
            true,
            Perspective::Server,
            &ephemeral_shared,
            &forward_secure_nonce,
            self.conn_id,
            chlo_bytes,
            self.scfg.get(),
            &leaf_cert,
            None,
        )?;
        ephemeral_shared.zeroize();

        {
            // Both tiers become visible atomically
            let mut state = self.aead_state.write();
            state.secure = Some(secure);
            state.forward_secure = Some(forward_secure);
            state.state = HandshakeState::SecureInstalled;
        }
        info!(connection = %self.conn_id, version = %self.version, "Installed secure and forward-secure keys");

        self.params.set_from_map(message)?;

        let mut reply = HandshakeMessage::new(Tag::SHLO, self.params.get_shlo_map());
        reply.insert(Tag::PUBS, ephemeral.public_key().to_vec());
        reply.insert(Tag::SNO, self.server_nonce.to_vec());
        reply.insert(Tag::VER, supported_versions_as_tags());
        Ok(reply.serialize())
    }

    /// Seals an outbound packet under the highest committed tier.
    ///
    /// # Errors
    /// Propagates AEAD seal failures.
    pub fn seal(
        &self,
        packet_number: PacketNumber,
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let state = self.aead_state.read();
        if self.received_forward_secure_packet.load(Ordering::Acquire) {
            if let Some(aead) = state.forward_secure.as_ref() {
                return aead.seal(packet_number, associated_data, plaintext);
            }
        }
        if let Some(aead) = state.secure.as_ref() {
            return aead.seal(packet_number, associated_data, plaintext);
        }
        self.null_aead.seal(packet_number, associated_data, plaintext)
    }

    /// Opens an inbound packet, trying tiers highest-first.
    ///
    /// A success at a tier latches that tier as the floor: once the peer
    /// has demonstrated a key, packets below that tier are rejected.
    ///
    /// # Errors
    /// Returns `Decryption` when no admissible tier verifies the packet.
    pub fn open(
        &self,
        packet_number: PacketNumber,
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let state = self.aead_state.read();

        if let Some(aead) = state.forward_secure.as_ref() {
            match aead.open(packet_number, associated_data, ciphertext) {
                Ok(plaintext) => {
                    self.received_forward_secure_packet
                        .store(true, Ordering::Release);
                    return Ok(plaintext);
                }
                Err(err) => {
                    if self.received_forward_secure_packet.load(Ordering::Acquire) {
                        return Err(err);
                    }
                }
            }
        }

        if let Some(aead) = state.secure.as_ref() {
            match aead.open(packet_number, associated_data, ciphertext) {
                Ok(plaintext) => {
                    self.received_secure_packet.store(true, Ordering::Release);
                    return Ok(plaintext);
                }
                Err(err) => {
                    if self.received_secure_packet.load(Ordering::Acquire) {
                        return Err(err);
                    }
                }
            }
        }

        self.null_aead
            .open(packet_number, associated_data, ciphertext)
    }

    /// Returns the diversification nonce while the next sealed packet
    /// still needs to carry it: secure keys installed, version uses
    /// diversification, and the peer has not yet gone forward-secure.
    #[must_use]
    pub fn diversification_nonce(&self) -> Option<&[u8; DIVERSIFICATION_NONCE_SIZE]> {
        if !self.version.uses_diversification_nonce() {
            return None;
        }
        if self.received_forward_secure_packet.load(Ordering::Acquire) {
            return None;
        }
        if self.aead_state.read().secure.is_none() {
            return None;
        }
        Some(&self.diversification_nonce)
    }

    /// Returns the current handshake progress.
    #[must_use]
    pub fn handshake_state(&self) -> HandshakeState {
        if self.received_forward_secure_packet.load(Ordering::Acquire) {
            return HandshakeState::ForwardSecureInstalled;
        }
        self.aead_state.read().state
    }
}

impl Drop for CryptoSetup {
    fn drop(&mut self) {
        self.server_nonce.zeroize();
        self.diversification_nonce.zeroize();
    }
}

impl std::fmt::Debug for CryptoSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print nonces or key state internals
        f.debug_struct("CryptoSetup")
            .field("connection", &self.conn_id)
            .field("version", &self.version)
            .field("state", &self.handshake_state())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use sha2::{Digest, Sha256};
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    use quill_common::entropy::OsEntropy;
    use quill_common::time::SystemClock;

    use crate::crypto::StkSource;
    use crate::handshake::signer::{server_proof_payload, ProofSigner};
    use crate::protocol::version::{VERSION_30, VERSION_32, VERSION_33};

    const CONN_ID: u64 = 42;
    const CLIENT_NONCE: [u8; 32] = [0xab; 32];

    struct TestSigner;

    impl ProofSigner for TestSigner {
        fn get_leaf_cert(&self, sni: &str) -> Result<Vec<u8>> {
            Ok(format!("leaf cert for {sni}").into_bytes())
        }

        fn get_certs_compressed(
            &self,
            sni: &str,
            _common_set_hashes: &[u8],
            _cached_hashes: &[u8],
        ) -> Result<Vec<u8>> {
            Ok(format!("compressed chain for {sni}").into_bytes())
        }

        fn sign_server_proof(
            &self,
            _sni: &str,
            chlo: Option<&[u8]>,
            scfg: &[u8],
        ) -> Result<Vec<u8>> {
            Ok(Sha256::digest(server_proof_payload(chlo, scfg)).to_vec())
        }
    }

    fn peer_ip() -> IpAddr {
        "1.2.3.4".parse().unwrap()
    }

    fn make_scfg() -> Arc<ServerConfig> {
        let stk = StkSource::new(
            b"TESTING",
            Arc::new(SystemClock),
            Arc::new(OsEntropy),
        )
        .unwrap();
        Arc::new(ServerConfig::new(
            Curve25519Kex::generate(&OsEntropy),
            Arc::new(TestSigner),
            stk,
            &OsEntropy,
            &SystemClock,
        ))
    }

    fn make_setup(
        version: VersionNumber,
        scfg: Arc<ServerConfig>,
    ) -> (Arc<CryptoSetup>, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        let setup = CryptoSetup::new(
            ConnectionId::new(CONN_ID),
            peer_ip(),
            version,
            scfg,
            Arc::new(ConnectionParametersManager::new()),
            tx,
            Arc::new(OsEntropy),
        );
        (Arc::new(setup), rx)
    }

    fn spawn_handler(
        setup: &Arc<CryptoSetup>,
        mut stream: DuplexStream,
    ) -> JoinHandle<Result<()>> {
        let setup = setup.clone();
        tokio::spawn(async move { setup.handle_crypto_stream(&mut stream).await })
    }

    /// A first-flight hello: SNI plus padding, no config id.
    fn inchoate_chlo() -> HandshakeMessage {
        let mut values = BTreeMap::new();
        values.insert(Tag::SNI, b"example.com".to_vec());
        values.insert(Tag::PAD, vec![0u8; CLIENT_HELLO_MIN_SIZE]);
        HandshakeMessage::new(Tag::CHLO, values)
    }

    /// A resuming hello carrying config id, token, public value and nonce.
    fn full_chlo(scfg: &ServerConfig, client_kex: &Curve25519Kex) -> HandshakeMessage {
        let token = scfg.stk_source().new_token(peer_ip()).unwrap();
        let mut values = BTreeMap::new();
        values.insert(Tag::SNI, b"example.com".to_vec());
        values.insert(Tag::SCID, scfg.id().to_vec());
        values.insert(Tag::STK, token);
        values.insert(Tag::PUBS, client_kex.public_key().to_vec());
        values.insert(Tag::NONC, CLIENT_NONCE.to_vec());
        HandshakeMessage::new(Tag::CHLO, values)
    }

    /// Derives the client's view of one tier for interop checks.
    fn client_aead(
        scfg: &ServerConfig,
        client_kex: &Curve25519Kex,
        chlo_bytes: &[u8],
        shlo: Option<&HandshakeMessage>,
        version: VersionNumber,
        div_nonce: Option<&[u8]>,
    ) -> ChaCha20Poly1305Aead {
        let cert = b"leaf cert for example.com";
        match shlo {
            None => {
                // Initial tier: against the config's static public value
                let (scfg_msg, _) = HandshakeMessage::parse(scfg.get()).unwrap();
                let static_public = &scfg_msg.get(Tag::PUBS).unwrap()[3..];
                let shared = client_kex.shared_key(static_public).unwrap();
                derive_keys_chacha20(
                    version,
                    false,
                    Perspective::Client,
                    &shared,
                    &CLIENT_NONCE,
                    ConnectionId::new(CONN_ID),
                    chlo_bytes,
                    scfg.get(),
                    cert,
                    div_nonce,
                )
                .unwrap()
            }
            Some(shlo) => {
                // Forward-secure tier: against the SHLO's ephemeral value
                let shared = client_kex.shared_key(shlo.get(Tag::PUBS).unwrap()).unwrap();
                let mut nonces = CLIENT_NONCE.to_vec();
                nonces.extend_from_slice(shlo.get(Tag::SNO).unwrap());
                derive_keys_chacha20(
                    version,
                    true,
                    Perspective::Client,
                    &shared,
                    &nonces,
                    ConnectionId::new(CONN_ID),
                    chlo_bytes,
                    scfg.get(),
                    cert,
                    None,
                )
                .unwrap()
            }
        }
    }

    #[tokio::test]
    async fn test_inchoate_chlo_produces_rej() {
        let scfg = make_scfg();
        let (setup, _rx) = make_setup(VERSION_32, scfg.clone());
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        let chlo = inchoate_chlo();
        let chlo_bytes = chlo.serialize();
        client.write_all(&chlo_bytes).await.unwrap();

        let (reply, _) = HandshakeMessage::read_from(&mut client).await.unwrap();
        assert_eq!(reply.tag(), Tag::REJ);
        assert_eq!(reply.get(Tag::SCFG), Some(scfg.get()));
        assert_eq!(
            reply.get(Tag::CERT),
            Some(&b"compressed chain for example.com"[..])
        );
        // Version 32 proofs cover the client hello bytes
        assert_eq!(
            reply.get(Tag::PROF).unwrap(),
            Sha256::digest(server_proof_payload(Some(&chlo_bytes[..]), scfg.get())).as_slice()
        );
        // The fresh token verifies for this peer
        assert_eq!(
            scfg.stk_source().verify_token(peer_ip(), reply.get(Tag::STK)),
            Ok(())
        );

        // No keys installed: output still opens under the null tier
        assert_eq!(setup.handshake_state(), HandshakeState::RejSent);
        let sealed = setup.seal(1, b"aad", b"data").unwrap();
        assert_eq!(NullAead::new().open(1, b"aad", &sealed).unwrap(), b"data");

        drop(client);
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_old_version_proof_omits_chlo() {
        let scfg = make_scfg();
        let (setup, _rx) = make_setup(VERSION_30, scfg.clone());
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        client.write_all(&inchoate_chlo().serialize()).await.unwrap();
        let (reply, _) = HandshakeMessage::read_from(&mut client).await.unwrap();
        assert_eq!(
            reply.get(Tag::PROF).unwrap(),
            Sha256::digest(server_proof_payload(None, scfg.get())).as_slice()
        );

        drop(client);
        let _ = handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_undersized_inchoate_chlo_is_fatal() {
        let scfg = make_scfg();
        let (setup, _rx) = make_setup(VERSION_32, scfg);
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        let mut values = BTreeMap::new();
        values.insert(Tag::SNI, b"example.com".to_vec());
        client
            .write_all(&HandshakeMessage::new(Tag::CHLO, values).serialize())
            .await
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::CryptoInvalidValueLength { .. }));
    }

    #[tokio::test]
    async fn test_non_chlo_message_is_fatal() {
        let scfg = make_scfg();
        let (setup, _rx) = make_setup(VERSION_32, scfg);
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        let mut values = BTreeMap::new();
        values.insert(Tag::SNI, b"example.com".to_vec());
        client
            .write_all(&HandshakeMessage::new(Tag::SHLO, values).serialize())
            .await
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::InvalidCryptoMessageType { .. }));
    }

    #[tokio::test]
    async fn test_missing_sni_is_fatal() {
        let scfg = make_scfg();
        let (setup, _rx) = make_setup(VERSION_32, scfg);
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        let mut values = BTreeMap::new();
        values.insert(Tag::PAD, vec![0u8; CLIENT_HELLO_MIN_SIZE]);
        client
            .write_all(&HandshakeMessage::new(Tag::CHLO, values).serialize())
            .await
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::CryptoMessageParameterNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_sni_is_fatal() {
        let scfg = make_scfg();
        let (setup, _rx) = make_setup(VERSION_32, scfg);
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        let mut values = BTreeMap::new();
        values.insert(Tag::SNI, Vec::new());
        values.insert(Tag::PAD, vec![0u8; CLIENT_HELLO_MIN_SIZE]);
        client
            .write_all(&HandshakeMessage::new(Tag::CHLO, values).serialize())
            .await
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::CryptoMessageParameterNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_stk_downgrades_to_rejection() {
        let scfg = make_scfg();
        let (setup, _rx) = make_setup(VERSION_32, scfg.clone());
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        let client_kex = Curve25519Kex::generate(&OsEntropy);
        let mut chlo = full_chlo(&scfg, &client_kex);
        chlo.insert(Tag::STK, vec![0x5a; 64]); // garbage token
        chlo.insert(Tag::PAD, vec![0u8; CLIENT_HELLO_MIN_SIZE]);
        client.write_all(&chlo.serialize()).await.unwrap();

        let (reply, _) = HandshakeMessage::read_from(&mut client).await.unwrap();
        assert_eq!(reply.tag(), Tag::REJ);
        assert_eq!(setup.handshake_state(), HandshakeState::RejSent);

        drop(client);
        let _ = handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_chlo_missing_pubs_is_fatal() {
        let scfg = make_scfg();
        let (setup, _rx) = make_setup(VERSION_32, scfg.clone());
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        let client_kex = Curve25519Kex::generate(&OsEntropy);
        let mut chlo = full_chlo(&scfg, &client_kex);
        let _ = chlo.remove(Tag::PUBS);
        client.write_all(&chlo.serialize()).await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::CryptoMessageParameterNotFound { .. }));
    }

    #[tokio::test]
    async fn test_full_chlo_produces_shlo_and_installs_keys() {
        let scfg = make_scfg();
        let (setup, mut rx) = make_setup(VERSION_33, scfg.clone());
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        let client_kex = Curve25519Kex::generate(&OsEntropy);
        let chlo = full_chlo(&scfg, &client_kex);
        let chlo_bytes = chlo.serialize();
        client.write_all(&chlo_bytes).await.unwrap();

        let (shlo, _) = HandshakeMessage::read_from(&mut client).await.unwrap();
        assert_eq!(shlo.tag(), Tag::SHLO);
        assert_eq!(shlo.get(Tag::PUBS).unwrap().len(), 32);
        assert_eq!(shlo.get(Tag::SNO).unwrap().len(), SERVER_NONCE_SIZE);
        assert_eq!(shlo.get(Tag::VER).unwrap().len() % 4, 0);
        assert!(shlo.get(Tag::SFCW).is_some());

        // The handler completes and fires the signal
        handle.await.unwrap().unwrap();
        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(setup.handshake_state(), HandshakeState::SecureInstalled);

        // Seal now uses the secure tier, not the null tier
        let sealed = setup.seal(1, b"aad", b"data").unwrap();
        assert!(NullAead::new().open(1, b"aad", &sealed).is_err());

        // The client's derivation of the initial tier opens it
        let div_nonce = setup.diversification_nonce().map(|n| n.to_vec());
        assert!(div_nonce.is_some(), "version 33 must expose the nonce");
        let client_secure = client_aead(
            &scfg,
            &client_kex,
            &chlo_bytes,
            None,
            VERSION_33,
            div_nonce.as_deref(),
        );
        assert_eq!(client_secure.open(1, b"aad", &sealed).unwrap(), b"data");

        // And the server opens the client's initial-tier packets
        let from_client = client_secure.seal(2, b"aad", b"client data").unwrap();
        assert_eq!(setup.open(2, b"aad", &from_client).unwrap(), b"client data");
    }

    #[tokio::test]
    async fn test_forward_secure_interop_and_monotonic_tiers() {
        let scfg = make_scfg();
        let (setup, mut rx) = make_setup(VERSION_33, scfg.clone());
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        let client_kex = Curve25519Kex::generate(&OsEntropy);
        let chlo = full_chlo(&scfg, &client_kex);
        let chlo_bytes = chlo.serialize();
        client.write_all(&chlo_bytes).await.unwrap();

        let (shlo, _) = HandshakeMessage::read_from(&mut client).await.unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(rx.recv().await, Some(()));

        let div_nonce = setup.diversification_nonce().map(|n| n.to_vec());
        let client_secure = client_aead(
            &scfg,
            &client_kex,
            &chlo_bytes,
            None,
            VERSION_33,
            div_nonce.as_deref(),
        );
        let client_forward = client_aead(
            &scfg,
            &client_kex,
            &chlo_bytes,
            Some(&shlo),
            VERSION_33,
            None,
        );

        // Until any tier is demonstrated, null-framed packets still open
        let null_packet = NullAead::new().seal(1, b"aad", b"early").unwrap();
        assert_eq!(setup.open(1, b"aad", &null_packet).unwrap(), b"early");

        // Secure tier demonstrated: the null tier is no longer admissible
        let secure_packet = client_secure.seal(2, b"aad", b"secure").unwrap();
        assert_eq!(setup.open(2, b"aad", &secure_packet).unwrap(), b"secure");
        let null_packet = NullAead::new().seal(3, b"aad", b"late null").unwrap();
        assert!(setup.open(3, b"aad", &null_packet).is_err());

        // Forward-secure demonstrated: everything below is rejected
        let fs_packet = client_forward.seal(4, b"aad", b"forward").unwrap();
        assert_eq!(setup.open(4, b"aad", &fs_packet).unwrap(), b"forward");
        assert_eq!(
            setup.handshake_state(),
            HandshakeState::ForwardSecureInstalled
        );
        let secure_packet = client_secure.seal(5, b"aad", b"stale").unwrap();
        assert!(setup.open(5, b"aad", &secure_packet).is_err());

        // The nonce disappears once the peer is forward-secure
        assert!(setup.diversification_nonce().is_none());

        // Outbound now seals under the forward-secure tier
        let sealed = setup.seal(6, b"aad", b"reply").unwrap();
        assert_eq!(client_forward.open(6, b"aad", &sealed).unwrap(), b"reply");
    }

    #[tokio::test]
    async fn test_rej_then_full_chlo_on_same_stream() {
        let scfg = make_scfg();
        let (setup, mut rx) = make_setup(VERSION_32, scfg.clone());
        let (mut client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        client.write_all(&inchoate_chlo().serialize()).await.unwrap();
        let (reply, _) = HandshakeMessage::read_from(&mut client).await.unwrap();
        assert_eq!(reply.tag(), Tag::REJ);

        let client_kex = Curve25519Kex::generate(&OsEntropy);
        client
            .write_all(&full_chlo(&scfg, &client_kex).serialize())
            .await
            .unwrap();
        let (reply, _) = HandshakeMessage::read_from(&mut client).await.unwrap();
        assert_eq!(reply.tag(), Tag::SHLO);

        handle.await.unwrap().unwrap();
        assert_eq!(rx.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_shlo_written_before_signal_fires() {
        let scfg = make_scfg();
        let (setup, mut rx) = make_setup(VERSION_32, scfg.clone());
        // Buffer smaller than the SHLO: the write blocks until we drain it
        let (mut client, server) = duplex(128);
        let handle = spawn_handler(&setup, server);

        let client_kex = Curve25519Kex::generate(&OsEntropy);
        client
            .write_all(&full_chlo(&scfg, &client_kex).serialize())
            .await
            .unwrap();

        // The handler is stalled mid-SHLO; the signal must not exist yet
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        // Draining the stream completes the write, then the signal fires
        let (shlo, _) = HandshakeMessage::read_from(&mut client).await.unwrap();
        assert_eq!(shlo.tag(), Tag::SHLO);
        assert_eq!(rx.recv().await, Some(()));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stream_close_unwinds_handler() {
        let scfg = make_scfg();
        let (setup, _rx) = make_setup(VERSION_32, scfg);
        let (client, server) = duplex(1 << 16);
        let handle = spawn_handler(&setup, server);

        drop(client);
        assert!(matches!(handle.await.unwrap(), Err(CoreError::Io(_))));
        assert_eq!(setup.handshake_state(), HandshakeState::AwaitingChlo);
    }
}
