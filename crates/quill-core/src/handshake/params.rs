// ============================================
// File: crates/quill-core/src/handshake/params.rs
// ============================================
//! # Connection Parameters
//!
//! ## Creation Reason
//! The client hello carries transport parameters (flow-control windows,
//! idle timeout, stream limits, connection options) alongside the crypto
//! material. This module ingests the peer's values and produces the
//! server's half of the server hello.
//!
//! ## Main Functionality
//! - `ConnectionParametersManager`: thread-safe parameter store
//! - `set_from_map`: ingest SFCW / CFCW / ICSL / MSPC / COPT from a CHLO
//! - `get_shlo_map`: the server's advertised values for the SHLO
//!
//! ## Main Logical Flow
//! 1. The full-CHLO handler calls `set_from_map` with the tag map
//! 2. The SHLO reply is seeded from `get_shlo_map`
//! 3. The session reads negotiated values through the typed getters
//!
//! ## Last Modified
//! v0.1.0 - Initial parameter manager

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{CoreError, Result};
use crate::protocol::{HandshakeMessage, Tag};

// ============================================
// Constants
// ============================================

/// Stream-level flow-control window the server advertises (32 KiB).
pub const DEFAULT_STREAM_FLOW_CONTROL_WINDOW: u32 = 32 * 1024;

/// Connection-level flow-control window the server advertises (48 KiB).
pub const DEFAULT_CONNECTION_FLOW_CONTROL_WINDOW: u32 = 48 * 1024;

/// Idle connection state lifetime the server advertises, in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u32 = 30;

/// Maximum streams per connection the server advertises.
pub const DEFAULT_MAX_STREAMS_PER_CONNECTION: u32 = 100;

// ============================================
// ConnectionParametersManager
// ============================================

#[derive(Debug, Default)]
struct PeerParameters {
    stream_flow_control_window: Option<u32>,
    connection_flow_control_window: Option<u32>,
    idle_timeout_secs: Option<u32>,
    max_streams: Option<u32>,
    connection_options: Vec<Tag>,
}

/// Thread-safe store for negotiated transport parameters.
///
/// Shared between the handshake (writer) and the session (reader).
#[derive(Debug, Default)]
pub struct ConnectionParametersManager {
    peer: RwLock<PeerParameters>,
}

impl ConnectionParametersManager {
    /// Creates a manager with no peer values yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests the peer's transport parameters from a client hello.
    ///
    /// Absent tags keep their defaults; present tags must be well-formed.
    ///
    /// # Errors
    /// Returns `CryptoInvalidValueLength` for values of the wrong size.
    pub fn set_from_map(&self, message: &HandshakeMessage) -> Result<()> {
        let stream_window = Self::get_u32(message, Tag::SFCW)?;
        let connection_window = Self::get_u32(message, Tag::CFCW)?;
        let idle_timeout = Self::get_u32(message, Tag::ICSL)?;
        let max_streams = Self::get_u32(message, Tag::MSPC)?;
        let options = Self::get_options(message)?;

        let mut peer = self.peer.write();
        peer.stream_flow_control_window = stream_window;
        peer.connection_flow_control_window = connection_window;
        peer.idle_timeout_secs = idle_timeout;
        peer.max_streams = max_streams;
        peer.connection_options = options;
        Ok(())
    }

    /// Produces the server's transport parameters for the server hello.
    #[must_use]
    pub fn get_shlo_map(&self) -> BTreeMap<Tag, Vec<u8>> {
        let mut map = BTreeMap::new();
        map.insert(
            Tag::SFCW,
            DEFAULT_STREAM_FLOW_CONTROL_WINDOW.to_le_bytes().to_vec(),
        );
        map.insert(
            Tag::CFCW,
            DEFAULT_CONNECTION_FLOW_CONTROL_WINDOW.to_le_bytes().to_vec(),
        );
        map.insert(Tag::ICSL, DEFAULT_IDLE_TIMEOUT_SECS.to_le_bytes().to_vec());
        map.insert(
            Tag::MSPC,
            DEFAULT_MAX_STREAMS_PER_CONNECTION.to_le_bytes().to_vec(),
        );
        map
    }

    /// Window available for sending on one stream (peer's advertisement).
    #[must_use]
    pub fn stream_flow_control_window(&self) -> u32 {
        self.peer
            .read()
            .stream_flow_control_window
            .unwrap_or(DEFAULT_STREAM_FLOW_CONTROL_WINDOW)
    }

    /// Window available for sending on the connection (peer's advertisement).
    #[must_use]
    pub fn connection_flow_control_window(&self) -> u32 {
        self.peer
            .read()
            .connection_flow_control_window
            .unwrap_or(DEFAULT_CONNECTION_FLOW_CONTROL_WINDOW)
    }

    /// Negotiated idle timeout: the smaller of both sides' values.
    #[must_use]
    pub fn idle_timeout_secs(&self) -> u32 {
        self.peer
            .read()
            .idle_timeout_secs
            .map_or(DEFAULT_IDLE_TIMEOUT_SECS, |peer| {
                peer.min(DEFAULT_IDLE_TIMEOUT_SECS)
            })
    }

    /// Negotiated stream limit: the smaller of both sides' values.
    #[must_use]
    pub fn max_streams_per_connection(&self) -> u32 {
        self.peer
            .read()
            .max_streams
            .map_or(DEFAULT_MAX_STREAMS_PER_CONNECTION, |peer| {
                peer.min(DEFAULT_MAX_STREAMS_PER_CONNECTION)
            })
    }

    /// Returns `true` if the peer requested the given connection option.
    #[must_use]
    pub fn has_connection_option(&self, option: Tag) -> bool {
        self.peer.read().connection_options.contains(&option)
    }

    fn get_u32(message: &HandshakeMessage, tag: Tag) -> Result<Option<u32>> {
        match message.get(tag) {
            None => Ok(None),
            Some(value) => {
                let bytes: [u8; 4] = value.try_into().map_err(|_| {
                    CoreError::invalid_value_length(format!(
                        "{tag} must be 4 bytes, got {}",
                        value.len()
                    ))
                })?;
                Ok(Some(u32::from_le_bytes(bytes)))
            }
        }
    }

    fn get_options(message: &HandshakeMessage) -> Result<Vec<Tag>> {
        match message.get(Tag::COPT) {
            None => Ok(Vec::new()),
            Some(value) => {
                if value.len() % 4 != 0 {
                    return Err(CoreError::invalid_value_length(format!(
                        "COPT must be a multiple of 4 bytes, got {}",
                        value.len()
                    )));
                }
                Ok(value
                    .chunks_exact(4)
                    .map(|chunk| Tag::new([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .collect())
            }
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chlo_with(values: Vec<(Tag, Vec<u8>)>) -> HandshakeMessage {
        HandshakeMessage::new(Tag::CHLO, values.into_iter().collect())
    }

    #[test]
    fn test_defaults_before_negotiation() {
        let params = ConnectionParametersManager::new();
        assert_eq!(
            params.stream_flow_control_window(),
            DEFAULT_STREAM_FLOW_CONTROL_WINDOW
        );
        assert_eq!(params.idle_timeout_secs(), DEFAULT_IDLE_TIMEOUT_SECS);
        assert!(!params.has_connection_option(Tag::new(*b"TSTP")));
    }

    #[test]
    fn test_set_from_map_ingests_values() {
        let params = ConnectionParametersManager::new();
        let message = chlo_with(vec![
            (Tag::SFCW, 0x0001_0000u32.to_le_bytes().to_vec()),
            (Tag::CFCW, 0x0002_0000u32.to_le_bytes().to_vec()),
            (Tag::ICSL, 10u32.to_le_bytes().to_vec()),
            (Tag::MSPC, 7u32.to_le_bytes().to_vec()),
        ]);
        params.set_from_map(&message).unwrap();

        assert_eq!(params.stream_flow_control_window(), 0x0001_0000);
        assert_eq!(params.connection_flow_control_window(), 0x0002_0000);
        assert_eq!(params.idle_timeout_secs(), 10);
        assert_eq!(params.max_streams_per_connection(), 7);
    }

    #[test]
    fn test_negotiation_takes_minimum() {
        let params = ConnectionParametersManager::new();
        let message = chlo_with(vec![
            (Tag::ICSL, 600u32.to_le_bytes().to_vec()),
            (Tag::MSPC, 10_000u32.to_le_bytes().to_vec()),
        ]);
        params.set_from_map(&message).unwrap();

        assert_eq!(params.idle_timeout_secs(), DEFAULT_IDLE_TIMEOUT_SECS);
        assert_eq!(
            params.max_streams_per_connection(),
            DEFAULT_MAX_STREAMS_PER_CONNECTION
        );
    }

    #[test]
    fn test_rejects_wrong_value_length() {
        let params = ConnectionParametersManager::new();
        let message = chlo_with(vec![(Tag::SFCW, vec![0x01, 0x02])]);
        assert!(matches!(
            params.set_from_map(&message),
            Err(CoreError::CryptoInvalidValueLength { .. })
        ));
    }

    #[test]
    fn test_connection_options() {
        let params = ConnectionParametersManager::new();
        let mut copt = Vec::new();
        copt.extend_from_slice(b"TSTP");
        copt.extend_from_slice(b"FHL2");
        let message = chlo_with(vec![(Tag::COPT, copt)]);
        params.set_from_map(&message).unwrap();

        assert!(params.has_connection_option(Tag::new(*b"TSTP")));
        assert!(params.has_connection_option(Tag::new(*b"FHL2")));
        assert!(!params.has_connection_option(Tag::new(*b"XXXX")));
    }

    #[test]
    fn test_rejects_ragged_options() {
        let params = ConnectionParametersManager::new();
        let message = chlo_with(vec![(Tag::COPT, b"TST".to_vec())]);
        assert!(params.set_from_map(&message).is_err());
    }

    #[test]
    fn test_shlo_map_contents() {
        let params = ConnectionParametersManager::new();
        let map = params.get_shlo_map();
        assert_eq!(map.len(), 4);
        assert_eq!(
            map.get(&Tag::SFCW).unwrap(),
            &DEFAULT_STREAM_FLOW_CONTROL_WINDOW.to_le_bytes().to_vec()
        );
        assert_eq!(
            map.get(&Tag::ICSL).unwrap(),
            &DEFAULT_IDLE_TIMEOUT_SECS.to_le_bytes().to_vec()
        );
    }
}
