// ============================================
// File: crates/quill-core/src/lib.rs
// ============================================
//! # Quill Core - Handshake & Packet Protection
//!
//! ## Creation Reason
//! Implements the server side of an early QUIC transport's cryptographic
//! handshake and the per-packet authenticated encryption it installs.
//! This crate is the security backbone of the server.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - Handshake tags and the tag-value message codec
//! - Protocol versions and feature thresholds
//!
//! ### Crypto Module ([`crypto`])
//! - ChaCha20-Poly1305 packet protection and the null authenticator
//! - Curve25519 key exchange and QUIC key expansion
//! - Source-address token issuance and verification
//!
//! ### Handshake Module ([`handshake`])
//! - `ServerConfig`: the advertised long-term crypto bundle
//! - `CryptoSetup`: the CHLO/REJ/SHLO state machine and the three-tier
//!   seal/open dispatcher
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            session / packet processor               │
//! │                       │                             │
//! │                       ▼                             │
//! │                  quill-core                         │
//! │                  You are here                       │
//! │                       │                             │
//! │                       ▼                             │
//! │                 quill-common                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Guarantees
//! - **Confidentiality**: ChaCha20-Poly1305 once keys are installed
//! - **Integrity**: Poly1305 tags; FNV framing before key establishment
//! - **Forward Secrecy**: ephemeral Curve25519 exchange per connection
//! - **Address Validation**: sealed source-address tokens with expiry
//! - **Monotonic Upgrade**: a demonstrated key tier becomes the floor
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL cryptographic code uses audited RustCrypto implementations
//! - NEVER implement custom crypto primitives
//! - Wire serializations are transcript inputs; keep them byte-stable
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod handshake;
pub mod protocol;

// Re-export commonly used items
pub use crypto::{Aead, ChaCha20Poly1305Aead, Curve25519Kex, NullAead, StkError, StkSource};
pub use error::{CoreError, Result};
pub use handshake::{ConnectionParametersManager, CryptoSetup, HandshakeState, ProofSigner, ServerConfig};
pub use protocol::{HandshakeMessage, PacketNumber, Tag, VersionNumber};
