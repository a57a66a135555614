//! The single writer of the ledger.

use std::sync::{Mutex, PoisonError};

use chrono::{SubsecRound, Utc};
use tracing::{debug, error, warn};

use super::audit::{audit, AuditReport};
use super::entry::{record_digest, Action, LedgerEntry, GENESIS};
use super::store::LedgerStore;
use crate::error::{Error, Result};

/// Position of the chain head. Only advanced after a durable write.
#[derive(Debug, Default)]
struct Cursor {
    /// Digest of the last stored record.
    link: Option<String>,
    /// The last stored entry.
    last: Option<LedgerEntry>,
}

impl Cursor {
    /// Position after the last record of `store`.
    fn load(store: &dyn LedgerStore) -> Result<Self> {
        let records = store.records()?;
        let cursor = match records.last() {
            Some(record) => {
                let last = LedgerEntry::from_record(record)
                    .map_err(|e| Error::ledger_corrupt(records.len(), e.to_string()))?;
                Self {
                    link: Some(record_digest(record)),
                    last: Some(last),
                }
            }
            None => Self::default(),
        };

        debug!(
            "Ledger at {} has {} entries",
            store.location().display(),
            records.len()
        );
        Ok(cursor)
    }
}

/// Holds the store's cross-process lock until dropped.
struct StoreLock<'a>(&'a dyn LedgerStore);

impl<'a> StoreLock<'a> {
    fn acquire(store: &'a dyn LedgerStore) -> Result<Self> {
        store
            .acquire()
            .map_err(|source| Error::ledger_lock(store.location(), source))?;
        Ok(Self(store))
    }
}

impl Drop for StoreLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.release() {
            warn!("Could not release ledger lock on {}: {e}", self.0.location().display());
        }
    }
}

/// Appends entries to a [`LedgerStore`], linking each to its predecessor.
///
/// All appends are serialized by one lock held from computing the link to
/// advancing the cursor, so the chain can never fork. The store's own lock
/// is held for the same span, and the cursor is reloaded when another
/// process has appended since. Reads go straight to the store and never
/// wait on the writer.
#[derive(Debug)]
pub struct ChainWriter {
    store: Box<dyn LedgerStore>,
    cursor: Mutex<Cursor>,
}

impl ChainWriter {
    /// Wrap a store, positioning the cursor after its last record.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the store cannot be read, or
    /// [`Error::LedgerCorrupt`] if its last record does not parse.
    pub fn open(store: Box<dyn LedgerStore>) -> Result<Self> {
        let cursor = Cursor::load(store.as_ref())?;
        Ok(Self {
            store,
            cursor: Mutex::new(cursor),
        })
    }

    /// Append an entry and return it as written.
    ///
    /// The entry is on stable storage when this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerWrite`] if the record could not be made
    /// durable, or [`Error::LedgerLocked`] if another writer kept the store
    /// locked. The chain head is unchanged in that case and the caller must
    /// treat its own operation as failed.
    pub fn append(
        &self,
        action: Action,
        target: &str,
        actor: &str,
        evidence_hash: &str,
        details: Option<&str>,
    ) -> Result<LedgerEntry> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let _store_lock = StoreLock::acquire(self.store.as_ref())?;
        self.catch_up(&mut cursor)?;

        let chain_link = cursor.link.clone().unwrap_or_else(|| GENESIS.to_string());

        // Never step behind the previous entry, even if the clock does.
        let mut timestamp = Utc::now().trunc_subsecs(6);
        if let Some(last) = &cursor.last {
            timestamp = timestamp.max(last.timestamp);
        }

        let entry = LedgerEntry {
            timestamp,
            action,
            actor: actor.to_string(),
            target: target.to_string(),
            evidence_hash: evidence_hash.to_string(),
            details: details.map(str::to_string),
            chain_link,
        };
        let record = entry.to_record()?;

        self.store.append(&record).map_err(|source| {
            error!(
                "Ledger write failed for {} on {}: {source}",
                entry.action, entry.target
            );
            Error::ledger_write(self.store.location(), source)
        })?;

        cursor.link = Some(record_digest(&record));
        cursor.last = Some(entry.clone());
        debug!("Appended {} for {}", entry.action, entry.target);
        Ok(entry)
    }

    /// Reload the cursor if the store's last record is not the one it
    /// points at. Must be called with the store lock held.
    fn catch_up(&self, cursor: &mut Cursor) -> Result<()> {
        let current = self
            .store
            .last_record()
            .map_err(|source| Error::ledger_write(self.store.location(), source))?
            .map(|record| record_digest(&record));

        if current != cursor.link {
            debug!("Ledger advanced by another writer, reloading head");
            *cursor = Cursor::load(self.store.as_ref())?;
        }
        Ok(())
    }

    /// The most recently written entry.
    #[must_use]
    pub fn last_entry(&self) -> Option<LedgerEntry> {
        self.cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .clone()
    }

    /// The link the next entry will carry.
    #[must_use]
    pub fn head(&self) -> String {
        self.cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .link
            .clone()
            .unwrap_or_else(|| GENESIS.to_string())
    }

    /// All entries, oldest first, paired with their 1-based line numbers.
    ///
    /// Records that do not parse are skipped with a warning; use
    /// [`ChainWriter::audit`] to surface them as errors.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the store cannot be read.
    pub fn entries(&self) -> Result<Vec<(usize, LedgerEntry)>> {
        let records = self.store.records()?;
        Ok(records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| match LedgerEntry::from_record(record) {
                Ok(entry) => Some((i + 1, entry)),
                Err(e) => {
                    warn!("Skipping unreadable ledger record at line {}: {e}", i + 1);
                    None
                }
            })
            .collect())
    }

    /// Re-walk the whole ledger and check every link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChainBroken`] or [`Error::LedgerCorrupt`] on the
    /// first bad record.
    pub fn audit(&self) -> Result<AuditReport> {
        audit(&self.store.records()?)
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }
}
