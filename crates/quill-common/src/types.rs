// ============================================
// File: crates/quill-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes protocol identifier types shared by the Quill crates,
//! ensuring consistent wire representations.
//!
//! ## Main Functionality
//! - `ConnectionId`: 64-bit QUIC connection identifier
//!
//! ## Main Logical Flow
//! 1. The session layer assigns a `ConnectionId` per connection
//! 2. The handshake binds derived keys to it (key-expansion input)
//! 3. It appears in packet public headers, little-endian
//!
//! ## ⚠️ Important Note for Next Developer
//! - The connection id is public wire data, not a secret
//! - Wire order is little-endian everywhere in this protocol generation
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entropy::EntropySource;
use crate::error::{CommonError, Result};

// ============================================
// Constants
// ============================================

/// Size of a connection id on the wire, in bytes.
pub const CONNECTION_ID_SIZE: usize = 8;

// ============================================
// ConnectionId
// ============================================

/// 64-bit identifier naming one connection across migrating client paths.
///
/// # Example
/// ```
/// use quill_common::types::ConnectionId;
///
/// let id = ConnectionId::new(0x0102_0304_0506_0708);
/// assert_eq!(id.to_le_bytes()[0], 0x08);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a connection id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Generates a random connection id.
    #[must_use]
    pub fn generate(entropy: &dyn EntropySource) -> Self {
        let mut bytes = [0u8; CONNECTION_ID_SIZE];
        entropy.fill_bytes(&mut bytes);
        Self(u64::from_le_bytes(bytes))
    }

    /// Creates a connection id from wire bytes.
    ///
    /// # Errors
    /// Returns `InvalidLength` if `bytes` is not exactly 8 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CONNECTION_ID_SIZE {
            return Err(CommonError::invalid_length(CONNECTION_ID_SIZE, bytes.len()));
        }
        let mut id = [0u8; CONNECTION_ID_SIZE];
        id.copy_from_slice(bytes);
        Ok(Self(u64::from_le_bytes(id)))
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the wire representation (little-endian).
    #[must_use]
    pub const fn to_le_bytes(&self) -> [u8; CONNECTION_ID_SIZE] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_be_bytes()))
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::OsEntropy;

    #[test]
    fn test_connection_id_roundtrip() {
        let id = ConnectionId::new(0x0102_0304_0506_0708);
        let bytes = id.to_le_bytes();
        assert_eq!(bytes, [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(ConnectionId::from_bytes(&bytes).unwrap(), id);
    }

    #[test]
    fn test_connection_id_rejects_wrong_length() {
        let result = ConnectionId::from_bytes(&[1, 2, 3]);
        assert!(matches!(
            result,
            Err(CommonError::InvalidLength {
                expected: 8,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_connection_id_display_is_hex() {
        let id = ConnectionId::new(0xdead_beef_0000_0001);
        assert_eq!(id.to_string(), "deadbeef00000001");
    }

    #[test]
    fn test_generate_uses_entropy() {
        let a = ConnectionId::generate(&OsEntropy);
        let b = ConnectionId::generate(&OsEntropy);
        assert_ne!(a, b);
    }
}
