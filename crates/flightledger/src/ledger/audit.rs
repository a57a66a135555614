//! Offline re-walk of the whole chain.

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::entry::{record_digest, LedgerEntry, GENESIS, NO_EVIDENCE};
use crate::error::{Error, Result};
use crate::hash::is_digest;

/// Outcome of a successful audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Number of records checked.
    pub entries: usize,
    /// Digest of the last record, or the genesis sentinel for an empty ledger.
    pub head: String,
}

/// Check that every record links to the digest of the one before it, and
/// that the first record links to [`GENESIS`].
///
/// # Errors
///
/// Returns [`Error::LedgerCorrupt`] for a record that does not parse or
/// whose evidence is neither a digest nor [`NO_EVIDENCE`], and
/// [`Error::ChainBroken`] for the first link that does not match.
#[instrument(skip(records), fields(records = records.len()))]
pub fn audit(records: &[String]) -> Result<AuditReport> {
    let mut expected = GENESIS.to_string();

    for (i, record) in records.iter().enumerate() {
        let line = i + 1;
        let entry = LedgerEntry::from_record(record)
            .map_err(|e| Error::ledger_corrupt(line, e.to_string()))?;

        if entry.chain_link != expected {
            warn!("Chain broken at line {line}");
            return Err(Error::ChainBroken {
                line,
                expected,
                found: entry.chain_link,
            });
        }
        if entry.evidence_hash != NO_EVIDENCE && !is_digest(&entry.evidence_hash) {
            return Err(Error::ledger_corrupt(line, "malformed evidence hash"));
        }
        expected = record_digest(record);
    }

    info!("Ledger chain intact across {} entries", records.len());
    Ok(AuditReport {
        entries: records.len(),
        head: expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::ledger::entry::{Action, SYSTEM_ACTOR};
    use chrono::Utc;

    fn chain(n: usize) -> Vec<String> {
        let mut records = Vec::new();
        let mut link = GENESIS.to_string();
        for i in 0..n {
            let entry = LedgerEntry {
                timestamp: Utc::now(),
                action: Action::FlightStarted,
                actor: SYSTEM_ACTOR.to_string(),
                target: format!("P{i}"),
                evidence_hash: NO_EVIDENCE.to_string(),
                details: None,
                chain_link: link,
            };
            let record = entry.to_record().unwrap();
            link = record_digest(&record);
            records.push(record);
        }
        records
    }

    #[test]
    fn test_empty_ledger_is_valid() {
        let report = audit(&[]).unwrap();
        assert_eq!(report.entries, 0);
        assert_eq!(report.head, GENESIS);
    }

    #[test]
    fn test_valid_chain() {
        let records = chain(5);
        let report = audit(&records).unwrap();
        assert_eq!(report.entries, 5);
        assert_eq!(report.head, record_digest(&records[4]));
    }

    #[test]
    fn test_edited_record_breaks_next_link() {
        let mut records = chain(4);
        records[1] = records[1].replace("\"P1\"", "\"P9\"");

        match audit(&records).unwrap_err() {
            Error::ChainBroken { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_removed_record_breaks_chain() {
        let mut records = chain(4);
        records.remove(2);
        assert!(matches!(
            audit(&records),
            Err(Error::ChainBroken { line: 3, .. })
        ));
    }

    #[test]
    fn test_reordered_records_break_chain() {
        let mut records = chain(3);
        records.swap(1, 2);
        assert!(matches!(
            audit(&records),
            Err(Error::ChainBroken { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_genesis() {
        let mut records = chain(3);
        records.remove(0);
        assert!(matches!(
            audit(&records),
            Err(Error::ChainBroken { line: 1, .. })
        ));
    }

    #[test]
    fn test_unparseable_record() {
        let mut records = chain(2);
        records.insert(1, "{oops".to_string());
        assert!(matches!(
            audit(&records),
            Err(Error::LedgerCorrupt { line: 2, .. })
        ));
    }

    #[test]
    fn test_malformed_evidence_on_last_record() {
        let mut records = chain(2);
        let entry = LedgerEntry {
            evidence_hash: hash_bytes(b"recording"),
            chain_link: record_digest(&records[1]),
            ..LedgerEntry::from_record(&records[1]).unwrap()
        };
        records.push(entry.to_record().unwrap());
        assert_eq!(audit(&records).unwrap().entries, 3);

        records[2] = records[2].replace(&entry.evidence_hash, "not-a-digest");
        assert!(matches!(
            audit(&records),
            Err(Error::LedgerCorrupt { line: 3, .. })
        ));
    }

    #[test]
    fn test_tampered_last_record_only_changes_head() {
        // The final record has no successor to betray it; the head moves.
        let records = chain(3);
        let head = audit(&records).unwrap().head;

        let mut tampered = records.clone();
        tampered[2] = tampered[2].replace("\"P2\"", "\"PX\"");
        let report = audit(&tampered).unwrap();
        assert_ne!(report.head, head);
    }
}
