//! Data-item codec
//!
//! Binary encoding of a single signed record. Layout:
//!
//! ```text
//! | Field        | Size | Notes                              |
//! |--------------|------|------------------------------------|
//! | sig_type     | 2    | little-endian, 2 = Ed25519         |
//! | signature    | 64   |                                    |
//! | owner        | 32   | signer public key                  |
//! | target flag  | 1    | 0 (no target)                      |
//! | anchor flag  | 1    | 0 (no anchor)                      |
//! | tag_count    | 8    | little-endian                      |
//! | tag_bytes_len| 8    | little-endian                      |
//! | tag_bytes    | var  | Avro-style encoded tag array       |
//! | data         | var  | record payload JSON                |
//! ```
//!
//! Tags use Avro array encoding: a zigzag-varint count, then
//! length-prefixed UTF-8 name/value pairs, then a zero terminator. The
//! signature covers the SHA-256 digest of every field except itself, and
//! the item id is base64url(SHA-256(signature)) — derivable immediately
//! after signing, before any upload.

use base64::Engine;
use sha2::{Digest, Sha256};

use permalog_core::constants::{ED25519_PUB_LEN, ED25519_SIG_LEN, SIG_TYPE_ED25519};
use permalog_core::{ChainError, ChainResult, Tag};
use permalog_wallet::Wallet;

/// A signed, encoded data item
#[derive(Debug, Clone)]
pub struct DataItem {
    /// base64url(SHA-256(signature))
    pub id: String,
    /// Raw 32-byte id, used in bundle headers
    pub raw_id: [u8; 32],
    pub signature: [u8; 64],
    /// Full encoded item
    pub bytes: Vec<u8>,
}

impl DataItem {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Sign `data` with `tags` attached, producing the encoded item.
pub fn sign_item(wallet: &Wallet, tags: &[Tag], data: &[u8]) -> DataItem {
    let tag_bytes = encode_tags(tags);
    let owner = wallet.owner_bytes();

    // Everything except the signature, in layout order.
    let mut unsigned = Vec::with_capacity(2 + ED25519_PUB_LEN + 2 + 16 + tag_bytes.len() + data.len());
    unsigned.extend_from_slice(&SIG_TYPE_ED25519.to_le_bytes());
    unsigned.extend_from_slice(&owner);
    unsigned.push(0); // no target
    unsigned.push(0); // no anchor
    unsigned.extend_from_slice(&(tags.len() as u64).to_le_bytes());
    unsigned.extend_from_slice(&(tag_bytes.len() as u64).to_le_bytes());
    unsigned.extend_from_slice(&tag_bytes);
    unsigned.extend_from_slice(data);

    let digest = Sha256::digest(&unsigned);
    let signature = wallet.sign(&digest);

    let raw_id: [u8; 32] = Sha256::digest(signature).into();
    let id = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw_id);

    let mut bytes = Vec::with_capacity(unsigned.len() + ED25519_SIG_LEN);
    bytes.extend_from_slice(&SIG_TYPE_ED25519.to_le_bytes());
    bytes.extend_from_slice(&signature);
    bytes.extend_from_slice(&unsigned[2..]); // owner onward

    DataItem {
        id,
        raw_id,
        signature,
        bytes,
    }
}

/// Decoded view of an item, for verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub signature: [u8; 64],
    pub owner: [u8; 32],
    pub tags: Vec<Tag>,
    pub data: Vec<u8>,
}

impl ParsedItem {
    /// The digest the signature covers.
    pub fn signing_digest(&self) -> [u8; 32] {
        let tag_bytes = encode_tags(&self.tags);
        let mut unsigned = Vec::new();
        unsigned.extend_from_slice(&SIG_TYPE_ED25519.to_le_bytes());
        unsigned.extend_from_slice(&self.owner);
        unsigned.push(0);
        unsigned.push(0);
        unsigned.extend_from_slice(&(self.tags.len() as u64).to_le_bytes());
        unsigned.extend_from_slice(&(tag_bytes.len() as u64).to_le_bytes());
        unsigned.extend_from_slice(&tag_bytes);
        unsigned.extend_from_slice(&self.data);
        Sha256::digest(&unsigned).into()
    }
}

/// Parse an encoded item back into its fields.
pub fn parse_item(bytes: &[u8]) -> ChainResult<ParsedItem> {
    let mut reader = Reader::new(bytes);

    let sig_type = u16::from_le_bytes(reader.take_array::<2>()?);
    if sig_type != SIG_TYPE_ED25519 {
        return Err(ChainError::Serialization(format!(
            "unsupported signature type {}",
            sig_type
        )));
    }
    let signature: [u8; 64] = reader.take_array::<64>()?;
    let owner: [u8; 32] = reader.take_array::<32>()?;

    for flag_name in ["target", "anchor"] {
        let flag = reader.take_array::<1>()?[0];
        if flag != 0 {
            return Err(ChainError::Serialization(format!(
                "unexpected {} flag {}",
                flag_name, flag
            )));
        }
    }

    let tag_count = u64::from_le_bytes(reader.take_array::<8>()?);
    let tag_bytes_len = u64::from_le_bytes(reader.take_array::<8>()?) as usize;
    let tag_bytes = reader.take(tag_bytes_len)?;
    let tags = decode_tags(tag_bytes)?;
    if tags.len() as u64 != tag_count {
        return Err(ChainError::Serialization(format!(
            "tag count mismatch: header {} vs encoded {}",
            tag_count,
            tags.len()
        )));
    }

    Ok(ParsedItem {
        signature,
        owner,
        tags,
        data: reader.rest().to_vec(),
    })
}

/// Encode tags as an Avro-style array block.
pub fn encode_tags(tags: &[Tag]) -> Vec<u8> {
    let mut out = Vec::new();
    if tags.is_empty() {
        out.push(0);
        return out;
    }
    write_zigzag(&mut out, tags.len() as i64);
    for tag in tags {
        write_zigzag(&mut out, tag.name.len() as i64);
        out.extend_from_slice(tag.name.as_bytes());
        write_zigzag(&mut out, tag.value.len() as i64);
        out.extend_from_slice(tag.value.as_bytes());
    }
    out.push(0); // end of array
    out
}

/// Decode an Avro-style tag array block.
pub fn decode_tags(bytes: &[u8]) -> ChainResult<Vec<Tag>> {
    let mut reader = Reader::new(bytes);
    let mut tags = Vec::new();

    loop {
        let count = read_zigzag(&mut reader)?;
        if count == 0 {
            break;
        }
        // A negative count is followed by a block byte size we don't use.
        let count = if count < 0 {
            read_zigzag(&mut reader)?;
            -count
        } else {
            count
        };
        for _ in 0..count {
            let name_len = read_zigzag(&mut reader)?;
            let name = reader.take(usize_len(name_len)?)?;
            let value_len = read_zigzag(&mut reader)?;
            let value = reader.take(usize_len(value_len)?)?;
            tags.push(Tag::new(
                String::from_utf8(name.to_vec())
                    .map_err(|e| ChainError::Serialization(e.to_string()))?,
                String::from_utf8(value.to_vec())
                    .map_err(|e| ChainError::Serialization(e.to_string()))?,
            ));
        }
    }

    Ok(tags)
}

fn usize_len(len: i64) -> ChainResult<usize> {
    usize::try_from(len).map_err(|_| ChainError::Serialization(format!("negative length {}", len)))
}

fn write_zigzag(out: &mut Vec<u8>, value: i64) {
    let mut encoded = ((value << 1) ^ (value >> 63)) as u64;
    loop {
        let byte = (encoded & 0x7f) as u8;
        encoded >>= 7;
        if encoded == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn read_zigzag(reader: &mut Reader<'_>) -> ChainResult<i64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = reader.take_array::<1>()?[0];
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return Err(ChainError::Serialization("varint overflow".to_string()));
        }
    }
    Ok(((value >> 1) as i64) ^ -((value & 1) as i64))
}

/// Bounds-checked byte reader
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> ChainResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| ChainError::Serialization("truncated item".to_string()))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> ChainResult<[u8; N]> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> Vec<Tag> {
        vec![
            Tag::new("Content-Type", "application/json"),
            Tag::new("App-Name", "permalog"),
            Tag::new("Seq", "42"),
        ]
    }

    #[test]
    fn test_tag_round_trip() {
        let encoded = encode_tags(&tags());
        assert_eq!(decode_tags(&encoded).unwrap(), tags());
        assert_eq!(decode_tags(&encode_tags(&[])).unwrap(), Vec::<Tag>::new());
    }

    #[test]
    fn test_zigzag_varint() {
        let mut out = Vec::new();
        write_zigzag(&mut out, 1);
        assert_eq!(out, vec![2]);

        for value in [0i64, 1, -1, 63, 64, 127, 128, 300, -300, i64::MAX / 2] {
            let mut buf = Vec::new();
            write_zigzag(&mut buf, value);
            let mut reader = Reader::new(&buf);
            assert_eq!(read_zigzag(&mut reader).unwrap(), value);
        }
    }

    #[test]
    fn test_item_round_trip() {
        let wallet = Wallet::from_secret_bytes(&[5u8; 32]);
        let item = sign_item(&wallet, &tags(), b"{\"seq\":42}");

        let parsed = parse_item(&item.bytes).unwrap();
        assert_eq!(parsed.owner, wallet.owner_bytes());
        assert_eq!(parsed.tags, tags());
        assert_eq!(parsed.data, b"{\"seq\":42}");
        assert_eq!(parsed.signature, item.signature);

        // The signature verifies over the parsed digest.
        wallet
            .verify(&parsed.signing_digest(), &parsed.signature)
            .unwrap();
    }

    #[test]
    fn test_id_derivation() {
        let wallet = Wallet::from_secret_bytes(&[5u8; 32]);
        let item = sign_item(&wallet, &tags(), b"data");

        let expected: [u8; 32] = Sha256::digest(item.signature).into();
        assert_eq!(item.raw_id, expected);
        assert_eq!(
            item.id,
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(expected)
        );
        // 32 bytes of base64url without padding.
        assert_eq!(item.id.len(), 43);
    }

    #[test]
    fn test_signing_is_reproducible() {
        let wallet = Wallet::from_secret_bytes(&[5u8; 32]);
        let a = sign_item(&wallet, &tags(), b"data");
        let b = sign_item(&wallet, &tags(), b"data");
        assert_eq!(a.id, b.id);
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_truncated_item_rejected() {
        let wallet = Wallet::from_secret_bytes(&[5u8; 32]);
        let item = sign_item(&wallet, &tags(), b"data");
        assert!(parse_item(&item.bytes[..40]).is_err());
    }
}
