//! Integrity checks of archived files against the ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::archive::{validate_actor, ArchiveLayout, ArchiveRef};
use crate::error::{Error, Result};
use crate::hash::hash_file;
use crate::ledger::{Action, ChainWriter, LedgerEntry};

/// Outcome of verifying one archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Ledger target of the file, `<slug>/<filename>`.
    pub target: String,
    /// Whether the file still matches its archival hash.
    pub matches: bool,
    /// Digest of the file as it is now.
    pub current_hash: String,
    /// Digest recorded at archival time.
    pub recorded_hash: String,
    /// When the archival entry was written.
    pub recorded_at: DateTime<Utc>,
}

impl VerificationReport {
    /// `VALID` or `TAMPERED`.
    #[must_use]
    pub fn status(&self) -> &'static str {
        if self.matches {
            "VALID"
        } else {
            "TAMPERED"
        }
    }
}

/// Recomputes file hashes and compares them with the ledger.
///
/// Hashing and scanning take no lock. Only the `INTEGRITY_CHECK` entry each
/// verification leaves behind goes through the ledger writer.
#[derive(Debug, Clone)]
pub struct Verifier {
    layout: ArchiveLayout,
    ledger: Arc<ChainWriter>,
}

impl Verifier {
    /// Verify files under `layout` against `ledger`.
    #[must_use]
    pub fn new(layout: ArchiveLayout, ledger: Arc<ChainWriter>) -> Self {
        Self { layout, ledger }
    }

    /// Verify one archived file on behalf of `actor`.
    ///
    /// The check is recorded as `INTEGRITY_CHECK` whatever its outcome,
    /// including when no archival record exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file is absent,
    /// [`Error::NoRecord`] if the ledger never recorded its archival,
    /// [`Error::LedgerWrite`] if the check could not be recorded, or an I/O
    /// error reading the file or ledger.
    #[instrument(skip(self), fields(target = %reference))]
    pub fn verify(&self, reference: &ArchiveRef, actor: &str) -> Result<VerificationReport> {
        validate_actor(actor, true)?;

        let path = self.layout.resolve(reference);
        if !path.is_file() {
            return Err(Error::not_found(path));
        }

        let current_hash = hash_file(&path)?;
        let target = reference.target();
        let recorded = self.find_archival_record(&target)?;

        let outcome = match &recorded {
            None => "NO_RECORD",
            Some(entry) if entry.evidence_hash == current_hash => "VALID",
            Some(_) => "TAMPERED",
        };
        self.ledger.append(
            Action::IntegrityCheck,
            &target,
            actor,
            &current_hash,
            Some(outcome),
        )?;

        let Some(entry) = recorded else {
            warn!("No archival record for {target}");
            return Err(Error::NoRecord { target });
        };

        let report = VerificationReport {
            target,
            matches: entry.evidence_hash == current_hash,
            current_hash,
            recorded_hash: entry.evidence_hash,
            recorded_at: entry.timestamp,
        };
        if report.matches {
            info!("{} verified intact", report.target);
        } else {
            warn!("{} has been altered since archival", report.target);
        }
        Ok(report)
    }

    /// The latest archival entry for `target`, if any.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the ledger cannot be read.
    pub fn find_archival_record(&self, target: &str) -> Result<Option<LedgerEntry>> {
        Ok(self
            .ledger
            .entries()?
            .into_iter()
            .rev()
            .map(|(_, entry)| entry)
            .find(|entry| entry.action.is_archival() && entry.target == target))
    }
}
