//! Bundle container
//!
//! Packs many signed data items into a single container transaction so
//! any record count costs one network POST. Layout:
//!
//! ```text
//! | 32 bytes | item count, little-endian                  |
//! | 64 bytes | per item: 32-byte size ++ 32-byte raw id   |
//! | ...      | concatenated item bytes                    |
//! ```
//!
//! The container is itself signed as a data item carrying the
//! `Bundle-Format` / `Bundle-Version` tags, so the bundle transaction id
//! is known before upload like any record id.

use permalog_core::constants::{self, tags as tag_names};
use permalog_core::{ChainError, ChainResult, Tag};
use permalog_wallet::Wallet;

use crate::dataitem::{self, DataItem};

/// A sealed bundle ready for upload
#[derive(Debug, Clone)]
pub struct SignedBundle {
    /// Transaction id of the container
    pub bundle_tx: String,
    /// Encoded container envelope
    pub bytes: Vec<u8>,
    /// Ids of the carried items, in order
    pub item_ids: Vec<String>,
}

impl SignedBundle {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn item_count(&self) -> usize {
        self.item_ids.len()
    }
}

/// Concatenate items into the container layout.
pub fn assemble_container(items: &[DataItem]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(|i| i.bytes.len()).sum();
    let mut out = Vec::with_capacity(32 + items.len() * 64 + payload_len);

    out.extend_from_slice(&wide_le(items.len() as u64));
    for item in items {
        out.extend_from_slice(&wide_le(item.bytes.len() as u64));
        out.extend_from_slice(&item.raw_id);
    }
    for item in items {
        out.extend_from_slice(&item.bytes);
    }
    out
}

/// Build and sign the container envelope for `items`.
pub fn seal_bundle(wallet: &Wallet, items: &[DataItem]) -> SignedBundle {
    let container = assemble_container(items);
    let tags = vec![
        Tag::new(tag_names::BUNDLE_FORMAT, constants::BUNDLE_FORMAT),
        Tag::new(tag_names::BUNDLE_VERSION, constants::BUNDLE_VERSION),
        Tag::new(tag_names::APP_NAME, constants::APP_NAME),
    ];
    let envelope = dataitem::sign_item(wallet, &tags, &container);

    SignedBundle {
        bundle_tx: envelope.id,
        bytes: envelope.bytes,
        item_ids: items.iter().map(|i| i.id.clone()).collect(),
    }
}

/// Split a container back into `(raw_id, item bytes)` pairs.
pub fn parse_container(bytes: &[u8]) -> ChainResult<Vec<([u8; 32], Vec<u8>)>> {
    let truncated = || ChainError::Serialization("truncated bundle container".to_string());

    if bytes.len() < 32 {
        return Err(truncated());
    }
    let count = read_wide_le(&bytes[..32])? as usize;

    let headers_end = 32usize
        .checked_add(count.checked_mul(64).ok_or_else(truncated)?)
        .ok_or_else(truncated)?;
    if bytes.len() < headers_end {
        return Err(truncated());
    }

    let mut entries = Vec::with_capacity(count);
    let mut offset = headers_end;
    for i in 0..count {
        let header = &bytes[32 + i * 64..32 + (i + 1) * 64];
        let size = read_wide_le(&header[..32])? as usize;
        let mut raw_id = [0u8; 32];
        raw_id.copy_from_slice(&header[32..]);

        let end = offset.checked_add(size).ok_or_else(truncated)?;
        if bytes.len() < end {
            return Err(truncated());
        }
        entries.push((raw_id, bytes[offset..end].to_vec()));
        offset = end;
    }
    Ok(entries)
}

/// A u64 widened into the 32-byte little-endian field the layout uses.
fn wide_le(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..8].copy_from_slice(&value.to_le_bytes());
    out
}

fn read_wide_le(bytes: &[u8]) -> ChainResult<u64> {
    if bytes[8..].iter().any(|b| *b != 0) {
        return Err(ChainError::Serialization(
            "oversized length field in bundle container".to_string(),
        ));
    }
    Ok(u64::from_le_bytes(bytes[..8].try_into().expect("8-byte slice")))
}
