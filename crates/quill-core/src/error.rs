// ============================================
// File: crates/quill-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines the error taxonomy for the handshake state machine and the
//! cryptographic primitives driving it.
//!
//! ## Error Categories
//! 1. **Handshake errors**: wrong message type, missing parameters,
//!    malformed tag maps. Fatal; they terminate the session.
//! 2. **Per-packet errors**: `Decryption` from an AEAD open. Non-fatal;
//!    the caller drops the packet.
//! 3. **Primitive failures**: key exchange, key derivation, signing.
//!    Fatal; they indicate a broken peer value or a broken signer.
//!
//! Source-address token validation has its own non-fatal taxonomy in
//! [`crate::crypto::stk::StkError`]; it never escalates past the decision
//! to treat a client hello as inchoate.
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material or token plaintext in error messages
//! - All errors must be loggable without leaking secrets
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use quill_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Errors raised by the handshake core and its crypto primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Handshake Errors (fatal)
    // ========================================

    /// A message other than a client hello arrived on the crypto stream.
    #[error("Invalid crypto message type: expected CHLO, got {got}")]
    InvalidCryptoMessageType {
        /// Display form of the tag received
        got: String,
    },

    /// A required handshake parameter is absent or empty.
    #[error("Crypto message parameter not found: {parameter}")]
    CryptoMessageParameterNotFound {
        /// Name of the missing tag
        parameter: String,
    },

    /// A handshake value has an invalid length.
    #[error("Crypto invalid value length: {context}")]
    CryptoInvalidValueLength {
        /// What was being validated
        context: String,
    },

    /// The tag-value framing on the crypto stream is malformed.
    #[error("Invalid crypto message: {reason}")]
    InvalidCryptoMessage {
        /// What's wrong with the framing
        reason: String,
    },

    // ========================================
    // Per-Packet Errors (non-fatal)
    // ========================================

    /// AEAD open failed (authentication error). The packet is dropped.
    #[error("Decryption failed: authentication error")]
    Decryption,

    /// AEAD seal failed (plaintext exceeds the cipher's limits).
    #[error("Encryption failed: {context}")]
    Encryption {
        /// What was being encrypted
        context: String,
    },

    // ========================================
    // Primitive Failures (fatal)
    // ========================================

    /// Key exchange failed (malformed peer public value).
    #[error("Key exchange failed: {reason}")]
    KeyExchange {
        /// Why the exchange failed
        reason: String,
    },

    /// Key derivation failed.
    #[error("Key derivation failed: {reason}")]
    KeyDerivation {
        /// Why derivation failed
        reason: String,
    },

    /// Certificate lookup or proof signing failed.
    #[error("Signer failure: {context}")]
    Signer {
        /// What the signer was asked to do
        context: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Crypto stream I/O error.
    #[error("Crypto stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Creates an `InvalidCryptoMessageType` error.
    pub fn invalid_message_type(got: impl Into<String>) -> Self {
        Self::InvalidCryptoMessageType { got: got.into() }
    }

    /// Creates a `CryptoMessageParameterNotFound` error.
    pub fn parameter_not_found(parameter: impl Into<String>) -> Self {
        Self::CryptoMessageParameterNotFound {
            parameter: parameter.into(),
        }
    }

    /// Creates a `CryptoInvalidValueLength` error.
    pub fn invalid_value_length(context: impl Into<String>) -> Self {
        Self::CryptoInvalidValueLength {
            context: context.into(),
        }
    }

    /// Creates an `InvalidCryptoMessage` error.
    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidCryptoMessage {
            reason: reason.into(),
        }
    }

    /// Creates an `Encryption` error.
    pub fn encryption(context: impl Into<String>) -> Self {
        Self::Encryption {
            context: context.into(),
        }
    }

    /// Creates a `KeyExchange` error.
    pub fn key_exchange(reason: impl Into<String>) -> Self {
        Self::KeyExchange {
            reason: reason.into(),
        }
    }

    /// Creates a `KeyDerivation` error.
    pub fn key_derivation(reason: impl Into<String>) -> Self {
        Self::KeyDerivation {
            reason: reason.into(),
        }
    }

    /// Creates a `Signer` error.
    pub fn signer(context: impl Into<String>) -> Self {
        Self::Signer {
            context: context.into(),
        }
    }

    /// Returns `true` if the error is a per-packet failure the session may
    /// absorb by dropping the packet.
    #[must_use]
    pub const fn is_per_packet(&self) -> bool {
        matches!(self, Self::Decryption)
    }
}

// ============================================
// Tests
// ============================================
