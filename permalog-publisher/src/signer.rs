//! Sequential record signer
//!
//! Produces the cryptographically linked run of signed records for one
//! batch. Signing is strictly sequential: each record's id becomes the
//! next record's `prev_tx`, so there is no parallelism here. It is also
//! pure CPU work; no network calls happen until upload.

use std::sync::Arc;
use tracing::debug;

use permalog_core::{AttestationRecord, ChainHead, Manifest, QueueEntry};
use permalog_wallet::Wallet;

use crate::dataitem::{self, DataItem};
use crate::error::PublishResult;

/// A queue row signed into a chain-linked record
#[derive(Debug, Clone)]
pub struct SignedRecord {
    pub entry: QueueEntry,
    pub record: AttestationRecord,
    pub item: DataItem,
}

impl SignedRecord {
    /// Record id (derived before upload).
    pub fn id(&self) -> &str {
        &self.item.id
    }

    pub fn size(&self) -> usize {
        self.item.size()
    }
}

/// Sequential signer
pub struct RecordSigner {
    wallet: Arc<Wallet>,
}

impl RecordSigner {
    pub fn new(wallet: Arc<Wallet>) -> Self {
        Self { wallet }
    }

    /// Sign `rows` in order, linking each record to its predecessor and
    /// starting from `head`.
    ///
    /// Any failure aborts the whole batch: callers leave the rows locked
    /// and cleanup reclaims them, because a partially linked run is
    /// useless once one link is missing.
    pub fn sign_batch(
        &self,
        head: &ChainHead,
        rows: Vec<(QueueEntry, Manifest)>,
    ) -> PublishResult<Vec<SignedRecord>> {
        let mut prev_tx = head.tx.clone();
        let mut prev_cid = head.cid.clone();
        let mut seq = head.seq;

        let mut signed = Vec::with_capacity(rows.len());
        for (entry, manifest) in rows {
            seq += 1;
            let record = AttestationRecord {
                pi: entry.entity_id.clone(),
                ver: manifest.version(),
                cid: entry.cid.clone(),
                op: entry.op,
                vis: entry.vis,
                ts: entry.ts.timestamp_millis(),
                prev_tx: prev_tx.clone(),
                prev_cid: prev_cid.clone(),
                seq,
                manifest: manifest.into_value(),
            };

            let payload = record.to_json()?;
            let tags = record.envelope_tags();
            let item = dataitem::sign_item(&self.wallet, &tags, &payload);

            debug!(
                entry_id = entry.id,
                seq,
                tx = %item.id,
                "Record signed"
            );

            prev_tx = Some(item.id.clone());
            prev_cid = Some(entry.cid.clone());
            signed.push(SignedRecord {
                entry,
                record,
                item,
            });
        }

        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use permalog_core::{Operation, QueueStatus, Visibility};

    fn row(id: u64, entity: &str, cid: &str) -> (QueueEntry, Manifest) {
        let entry = QueueEntry {
            id,
            entity_id: entity.to_string(),
            cid: cid.to_string(),
            op: Operation::Update,
            vis: Visibility::Public,
            ts: Utc::now(),
            status: QueueStatus::Signing,
            retry_count: 0,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let manifest = Manifest::parse(cid, br#"{"ver": 1}"#).unwrap();
        (entry, manifest)
    }

    fn signer() -> RecordSigner {
        RecordSigner::new(Arc::new(Wallet::from_secret_bytes(&[4u8; 32])))
    }

    #[test]
    fn test_genesis_batch_links_from_null() {
        let signed = signer()
            .sign_batch(
                &ChainHead::genesis(),
                vec![row(1, "E1", "C1"), row(2, "E2", "C2"), row(3, "E3", "C3")],
            )
            .unwrap();

        assert_eq!(signed.len(), 3);
        assert_eq!(signed[0].record.seq, 1);
        assert_eq!(signed[0].record.prev_tx, None);
        assert_eq!(signed[0].record.prev_cid, None);

        // Each record references its predecessor's id and cid.
        for pair in signed.windows(2) {
            assert_eq!(pair[1].record.prev_tx.as_deref(), Some(pair[0].id()));
            assert_eq!(
                pair[1].record.prev_cid.as_deref(),
                Some(pair[0].record.cid.as_str())
            );
            assert_eq!(pair[1].record.seq, pair[0].record.seq + 1);
        }
    }

    #[test]
    fn test_batch_continues_existing_chain() {
        let head = ChainHead::genesis().advanced("TX10", "C10", 10);
        let signed = signer()
            .sign_batch(&head, vec![row(1, "E1", "C11")])
            .unwrap();

        assert_eq!(signed[0].record.seq, 11);
        assert_eq!(signed[0].record.prev_tx.as_deref(), Some("TX10"));
        assert_eq!(signed[0].record.prev_cid.as_deref(), Some("C10"));
    }

    #[test]
    fn test_signing_deterministic_for_same_input() {
        let (entry, _) = row(1, "E1", "C1");
        let make = |entry: QueueEntry| {
            signer()
                .sign_batch(
                    &ChainHead::genesis(),
                    vec![(entry, Manifest::parse("C1", br#"{"ver": 1}"#).unwrap())],
                )
                .unwrap()
                .remove(0)
        };
        let a = make(entry.clone());
        let b = make(entry);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.item.bytes, b.item.bytes);
    }

    #[test]
    fn test_version_comes_from_manifest() {
        let (entry, _) = row(1, "E1", "C1");
        let manifest = Manifest::parse("C1", br#"{"ver": 7, "extra": true}"#).unwrap();
        let signed = signer()
            .sign_batch(&ChainHead::genesis(), vec![(entry, manifest)])
            .unwrap();
        assert_eq!(signed[0].record.ver, 7);
        assert_eq!(signed[0].record.manifest["extra"], true);
    }
}
