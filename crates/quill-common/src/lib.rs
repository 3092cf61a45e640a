// ============================================
// File: crates/quill-common/src/lib.rs
// ============================================
//! # Quill Common - Shared Foundations
//!
//! ## Creation Reason
//! Provides the foundational types shared by all Quill crates: error
//! primitives, timestamps and clocks, entropy injection, and protocol
//! identifiers.
//!
//! ## Main Functionality
//! - [`error`]: `CommonError` and the common `Result` alias
//! - [`time`]: `Timestamp`, the `Clock` trait and `SystemClock`
//! - [`entropy`]: the `EntropySource` trait and `OsEntropy`
//! - [`types`]: `ConnectionId`
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              quill-core                 │
//! │                  │                      │
//! │                  ▼                      │
//! │             quill-common                │
//! │             You are here                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Time and randomness are injected through traits so that the
//!   handshake core stays deterministic under test
//! - Nothing in this crate may depend on quill-core
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod entropy;
pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used items
pub use entropy::{EntropySource, OsEntropy};
pub use error::{CommonError, Result};
pub use time::{Clock, SystemClock, Timestamp};
pub use types::ConnectionId;
