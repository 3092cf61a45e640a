// ============================================
// File: crates/quill-core/src/protocol/message.rs
// ============================================
//! # Handshake Message Codec
//!
//! ## Creation Reason
//! Handshake traffic on the crypto stream is framed as tag-value maps.
//! This module owns the only parser and writer for that framing.
//!
//! ## Wire Format
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ message tag (4)                                      │
//! │ entry count u16 LE (2) │ padding (2)                 │
//! ├──────────────────────────────────────────────────────┤
//! │ N × [ tag (4) │ end-offset u32 LE (4) ]              │  index
//! ├──────────────────────────────────────────────────────┤
//! │ concatenated values (last end-offset bytes)          │
//! └──────────────────────────────────────────────────────┘
//! ```
//! Index tags must be strictly increasing as little-endian words; the
//! end-offsets are cumulative and must not decrease.
//!
//! ## Parsing Strategy
//! 1. Read the 8-byte header, bound the entry count
//! 2. Read and validate the index
//! 3. Read exactly the value region the index describes and slice it
//!
//! No outer length prefix exists; the codec consumes exactly what the
//! index describes, so the reader variant also hands back the raw bytes
//! for transcript binding (key expansion, proof signature).
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always validate counts and offsets before allocating
//! - Use checked arithmetic; all inputs are attacker-controlled
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use std::collections::BTreeMap;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::tags::Tag;
use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Fixed header: message tag, entry count, padding.
const HEADER_SIZE: usize = 8;

/// One index entry: tag plus end-offset.
const INDEX_ENTRY_SIZE: usize = 8;

/// Upper bound on index entries in one message.
const MAX_ENTRIES: usize = 128;

/// Upper bound on the concatenated value region of one message.
const MAX_VALUE_SIZE: usize = 1 << 20;

// ============================================
// HandshakeMessage
// ============================================

/// A parsed or to-be-written handshake message: a message tag plus an
/// ordered tag-value map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    tag: Tag,
    values: BTreeMap<Tag, Vec<u8>>,
}

impl HandshakeMessage {
    /// Creates a message from a tag and value map.
    #[must_use]
    pub fn new(tag: Tag, values: BTreeMap<Tag, Vec<u8>>) -> Self {
        Self { tag, values }
    }

    /// Returns the message tag (CHLO, REJ, SHLO, ...).
    #[must_use]
    pub const fn tag(&self) -> Tag {
        self.tag
    }

    /// Returns the value stored under `tag`, if present.
    #[must_use]
    pub fn get(&self, tag: Tag) -> Option<&[u8]> {
        self.values.get(&tag).map(Vec::as_slice)
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, tag: Tag, value: Vec<u8>) {
        self.values.insert(tag, value);
    }

    /// Removes a value, returning it if it was present.
    pub fn remove(&mut self, tag: Tag) -> Option<Vec<u8>> {
        self.values.remove(&tag)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when the message carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serializes the message into its wire form.
    ///
    /// Entries are emitted in ascending tag order with cumulative
    /// end-offsets, matching what [`HandshakeMessage::parse`] accepts.
    #[must_use]
    pub fn serialize(&self) -> Bytes {
        let total: usize = self.values.values().map(Vec::len).sum();
        let mut buf =
            BytesMut::with_capacity(HEADER_SIZE + self.values.len() * INDEX_ENTRY_SIZE + total);

        buf.put_u32_le(self.tag.as_u32());
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u16_le(self.values.len() as u16);
        buf.put_u16_le(0); // padding

        let mut offset = 0u32;
        for (tag, value) in &self.values {
            buf.put_u32_le(tag.as_u32());
            #[allow(clippy::cast_possible_truncation)]
            {
                offset += value.len() as u32;
            }
            buf.put_u32_le(offset);
        }
        for value in self.values.values() {
            buf.put_slice(value);
        }

        buf.freeze()
    }

    /// Parses one message from the start of `data`.
    ///
    /// # Returns
    /// The message and the number of bytes consumed.
    ///
    /// # Errors
    /// Returns `InvalidCryptoMessage` on truncation, oversized counts or
    /// value regions, non-increasing index tags, or decreasing offsets.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let mut buf = data;
        if buf.remaining() < HEADER_SIZE {
            return Err(CoreError::invalid_message("truncated header"));
        }
        let tag = Tag::from(buf.get_u32_le());
        let count = buf.get_u16_le() as usize;
        let _padding = buf.get_u16_le();

        if count > MAX_ENTRIES {
            return Err(CoreError::invalid_message(format!(
                "too many entries: {count}"
            )));
        }
        if buf.remaining() < count * INDEX_ENTRY_SIZE {
            return Err(CoreError::invalid_message("truncated index"));
        }

        let mut index = Vec::with_capacity(count);
        let mut previous_tag: Option<Tag> = None;
        let mut previous_end = 0u32;
        for _ in 0..count {
            let entry_tag = Tag::from(buf.get_u32_le());
            let end = buf.get_u32_le();
            if let Some(prev) = previous_tag {
                if entry_tag <= prev {
                    return Err(CoreError::invalid_message(format!(
                        "index tags not strictly increasing: {prev} then {entry_tag}"
                    )));
                }
            }
            if end < previous_end {
                return Err(CoreError::invalid_message("decreasing end-offset"));
            }
            index.push((entry_tag, end));
            previous_tag = Some(entry_tag);
            previous_end = end;
        }

        let total = previous_end as usize;
        if total > MAX_VALUE_SIZE {
            return Err(CoreError::invalid_message(format!(
                "value region too large: {total}"
            )));
        }
        if buf.remaining() < total {
            return Err(CoreError::invalid_message("truncated values"));
        }

        let values_start = data.len() - buf.remaining();
        let mut values = BTreeMap::new();
        let mut start = 0usize;
        for (entry_tag, end) in index {
            let end = end as usize;
            values.insert(
                entry_tag,
                data[values_start + start..values_start + end].to_vec(),
            );
            start = end;
        }

        Ok((Self { tag, values }, values_start + total))
    }

    /// Reads exactly one message from the crypto stream.
    ///
    /// # Returns
    /// The message and its raw wire bytes. The raw bytes are what the key
    /// expansion and the proof signature bind to; they must not be
    /// re-serialized.
    ///
    /// # Errors
    /// Propagates stream I/O errors and the validation failures of
    /// [`HandshakeMessage::parse`].
    pub async fn read_from<R>(reader: &mut R) -> Result<(Self, Vec<u8>)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut raw = vec![0u8; HEADER_SIZE];
        reader.read_exact(&mut raw).await?;

        let count = u16::from_le_bytes([raw[4], raw[5]]) as usize;
        if count > MAX_ENTRIES {
            return Err(CoreError::invalid_message(format!(
                "too many entries: {count}"
            )));
        }

        let index_size = count * INDEX_ENTRY_SIZE;
        raw.resize(HEADER_SIZE + index_size, 0);
        reader.read_exact(&mut raw[HEADER_SIZE..]).await?;

        let total = if count == 0 {
            0
        } else {
            let end_pos = HEADER_SIZE + index_size - 4;
            u32::from_le_bytes([raw[end_pos], raw[end_pos + 1], raw[end_pos + 2], raw[end_pos + 3]])
                as usize
        };
        if total > MAX_VALUE_SIZE {
            return Err(CoreError::invalid_message(format!(
                "value region too large: {total}"
            )));
        }

        let values_start = raw.len();
        raw.resize(values_start + total, 0);
        reader.read_exact(&mut raw[values_start..]).await?;

        let (message, consumed) = Self::parse(&raw)?;
        debug_assert_eq!(consumed, raw.len());
        Ok((message, raw))
    }
}

impl fmt::Display for HandshakeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.tag)?;
        for (i, (tag, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", tag, value.len())?;
        }
        write!(f, "]")
    }
}

// ============================================
// Tests
// ============================================
