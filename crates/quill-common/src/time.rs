// ============================================
// File: crates/quill-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Provides the timestamp type carried in protocol payloads (source-address
//! tokens, config expiry) and the injectable clock the handshake core reads
//! time from.
//!
//! ## Main Functionality
//! - `Timestamp`: Unix-seconds timestamp with little-endian wire conversions
//! - `Clock`: trait abstracting "now" so tests can freeze or advance time
//! - `SystemClock`: production implementation over `SystemTime`
//!
//! ## Main Logical Flow
//! 1. Token issuance stamps `clock.now()` into the plaintext
//! 2. Token verification compares the embedded stamp against `clock.now()`
//! 3. Config expiry is `clock.now()` plus a fixed lifetime
//!
//! ## ⚠️ Important Note for Next Developer
//! - All wire-visible timestamps are unsigned Unix seconds, little-endian
//! - Arithmetic saturates; a hostile timestamp must never panic the server
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================
// Timestamp
// ============================================

/// Unix timestamp in seconds.
///
/// # Purpose
/// Used in protocol payloads for time-based validation: source-address
/// token ages and server-config expiry.
///
/// # Example
/// ```
/// use quill_common::time::Timestamp;
///
/// let ts = Timestamp::from_secs(0xdead_beef);
/// assert_eq!(ts.to_le_bytes()[..4], [0xef, 0xbe, 0xad, 0xde]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a new timestamp from Unix seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Creates a timestamp for the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("System time before Unix epoch")
            .as_secs();
        Self(secs)
    }

    /// Returns the Unix timestamp in seconds.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Returns the timestamp as little-endian bytes.
    #[must_use]
    pub const fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Creates a timestamp from little-endian bytes.
    #[must_use]
    pub const fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Returns this timestamp advanced by `secs`, saturating at `u64::MAX`.
    #[must_use]
    pub const fn saturating_add_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Returns the number of seconds elapsed from `earlier` to `self`.
    ///
    /// Saturates at zero when `earlier` lies in the future, so clock skew
    /// cannot underflow.
    #[must_use]
    pub const fn seconds_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

// ============================================
// Clock
// ============================================

/// Source of the current time.
///
/// # Purpose
/// The handshake core never reads the system clock directly; it is handed
/// a `Clock` so token-expiry tests can freeze and advance time
/// deterministically.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Production clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ============================================
// Tests
// ============================================
