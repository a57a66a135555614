//! Filing finished flights and operator access to the archive.
//!
//! Every change to the archive is mirrored by a ledger entry, and no change
//! is reported as done unless its entry was durably written. When the entry
//! cannot be written the file system change is rolled back.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::classify::{Category, FlightSession};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::{hash_file, hash_json};
use crate::ledger::{Action, ChainWriter, FileStore, LedgerEntry, NO_EVIDENCE, SYSTEM_ACTOR};
use crate::recording::LiveCache;
use crate::verify::Verifier;

/// Directory of in-progress recordings under the archive root.
pub const LIVE_DIR: &str = "live_cache";

/// Extension of recording files.
const RECORDING_EXT: &str = "jsonl";

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid filename pattern"))
}

/// Check that an operator-supplied filename names a plain file inside its
/// category directory.
///
/// # Errors
///
/// Returns [`Error::InvalidFilename`] for anything that could escape the
/// directory or address a hidden file.
pub fn validate_filename(filename: &str) -> Result<()> {
    if !filename_pattern().is_match(filename) || filename.contains("..") || filename.starts_with('.')
    {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Check that `actor` may act on the archive.
///
/// # Errors
///
/// Returns [`Error::InvalidActor`] for an empty identity, or for the system
/// identity when `allow_system` is false.
pub fn validate_actor(actor: &str, allow_system: bool) -> Result<()> {
    if actor.trim().is_empty() {
        return Err(Error::InvalidActor {
            actor: actor.to_string(),
            reason: "an identity is required",
        });
    }
    if !allow_system && actor == SYSTEM_ACTOR {
        return Err(Error::InvalidActor {
            actor: actor.to_string(),
            reason: "reserved for automated entries",
        });
    }
    Ok(())
}

/// On-disk layout of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    /// Lay the archive out under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The archive root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of live recordings.
    #[must_use]
    pub fn live_dir(&self) -> PathBuf {
        self.root.join(LIVE_DIR)
    }

    /// Directory holding one category's recordings.
    #[must_use]
    pub fn category_dir(&self, category: Category) -> PathBuf {
        category
            .dir()
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Create the live directory and every category directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryCreate`] for the first directory that could
    /// not be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = std::iter::once(self.live_dir())
            .chain(Category::ALL.into_iter().map(|c| self.category_dir(c)));
        for dir in dirs {
            std::fs::create_dir_all(&dir)
                .map_err(|source| Error::DirectoryCreate { path: dir, source })?;
        }
        Ok(())
    }

    /// Path of an archived file.
    #[must_use]
    pub fn resolve(&self, reference: &ArchiveRef) -> PathBuf {
        self.category_dir(reference.category)
            .join(&reference.filename)
    }
}

/// Logical reference to an archived file: category plus file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArchiveRef {
    /// Category the file is filed under.
    pub category: Category,
    /// File name within the category directory.
    pub filename: String,
}

impl ArchiveRef {
    /// Build a reference, validating the file name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilename`] if the name is unsafe.
    pub fn new(category: Category, filename: impl Into<String>) -> Result<Self> {
        let filename = filename.into();
        validate_filename(&filename)?;
        Ok(Self { category, filename })
    }

    /// The ledger target for this file: `<slug>/<filename>`.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}/{}", self.category.slug(), self.filename)
    }
}

impl fmt::Display for ArchiveRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category.slug(), self.filename)
    }
}

/// A recording that was filed, with the entries that recorded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedFile {
    /// Where it was filed.
    pub reference: ArchiveRef,
    /// Full path on disk.
    pub path: PathBuf,
    /// Digest of the file at archival time.
    pub evidence_hash: String,
    /// `FLIGHT_ARCHIVED`, followed by `STANDARD_OPS_REGISTERED` for
    /// standard flights.
    pub entries: Vec<LedgerEntry>,
}

/// Archived file names per category, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ArchiveListing {
    categories: BTreeMap<Category, Vec<String>>,
}

impl ArchiveListing {
    /// Files in one category.
    #[must_use]
    pub fn files(&self, category: Category) -> &[String] {
        self.categories.get(&category).map_or(&[], Vec::as_slice)
    }

    /// Iterate categories in ascending severity.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> {
        self.categories.iter().map(|(c, files)| (*c, files.as_slice()))
    }

    /// Total number of archived files.
    #[must_use]
    pub fn total(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }
}

/// Files finished flights and serves operator requests on the archive.
#[derive(Debug)]
pub struct Archiver {
    layout: ArchiveLayout,
    live: LiveCache,
    ledger: Arc<ChainWriter>,
}

impl Archiver {
    /// Create an archiver writing to `ledger`, creating the directory
    /// layout if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryCreate`] if the layout cannot be created.
    pub fn new(layout: ArchiveLayout, ledger: Arc<ChainWriter>) -> Result<Self> {
        layout.ensure_dirs()?;
        let live = LiveCache::new(layout.live_dir());
        Ok(Self {
            layout,
            live,
            ledger,
        })
    }

    /// Open the configured ledger and archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerLocked`] if another process holds the ledger
    /// past the configured lock timeout, or any error opening the ledger or
    /// creating directories.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = FileStore::open_with_timeout(config.ledger_path(), config.lock_timeout())?;
        let ledger = ChainWriter::open(Box::new(store))?;
        Self::new(ArchiveLayout::new(config.archive_root()), Arc::new(ledger))
    }

    /// The archive layout.
    #[must_use]
    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// The live recording cache.
    #[must_use]
    pub fn live(&self) -> &LiveCache {
        &self.live
    }

    /// The ledger this archiver writes to.
    #[must_use]
    pub fn ledger(&self) -> &Arc<ChainWriter> {
        &self.ledger
    }

    /// A verifier over the same archive and ledger.
    #[must_use]
    pub fn verifier(&self) -> Verifier {
        Verifier::new(self.layout.clone(), Arc::clone(&self.ledger))
    }

    /// Append one telemetry point to the plane's live recording and to the
    /// ledger.
    ///
    /// The first point of a recording also records `FLIGHT_STARTED`.
    /// Returns the `LOG_ENTRY` entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPlaneId`], an I/O error from the recording,
    /// or [`Error::LedgerWrite`].
    pub fn record_telemetry(&self, plane_id: &str, telemetry: &Value) -> Result<LedgerEntry> {
        let (stamped, is_new) = self.live.append(plane_id, telemetry)?;

        if is_new {
            let recording = hash_file(self.live.path_for(plane_id)?)?;
            self.ledger.append(
                Action::FlightStarted,
                plane_id,
                SYSTEM_ACTOR,
                &recording,
                Some(&format!("Plane {plane_id} connected")),
            )?;
            info!("Recording started for {plane_id}");
        }

        let evidence = hash_json(&stamped);
        self.ledger.append(
            Action::LogEntry { telemetry: stamped },
            plane_id,
            SYSTEM_ACTOR,
            &evidence,
            None,
        )
    }

    /// Finalize a session and file its recording under the resulting
    /// category.
    ///
    /// Returns `None` if the flight never produced a recording.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the recording cannot be hashed or moved, or
    /// [`Error::LedgerWrite`] if its archival could not be recorded. In the
    /// latter case the recording is moved back to the live cache.
    #[instrument(skip(self, session), fields(plane_id = session.plane_id()))]
    pub fn archive(&self, session: &mut FlightSession) -> Result<Option<ArchivedFile>> {
        let category = session.finalize();
        let plane_id = session.plane_id().to_string();

        let source = self.live.path_for(&plane_id)?;
        if !source.exists() {
            info!("No recording for {plane_id}, nothing to archive");
            return Ok(None);
        }

        let evidence_hash = hash_file(&source)?;
        let reference = self.unique_reference(category, &plane_id)?;
        let dest = self.layout.resolve(&reference);
        std::fs::rename(&source, &dest)?;

        match self.register(&reference, &plane_id, &evidence_hash) {
            Ok(entries) => {
                let worst = session
                    .worst_squawk()
                    .map_or_else(|| "none".to_string(), |code| code.to_string());
                info!("Archived {plane_id} -> {reference} (worst squawk {worst})");
                Ok(Some(ArchivedFile {
                    reference,
                    path: dest,
                    evidence_hash,
                    entries,
                }))
            }
            Err(err) => {
                if let Err(rollback) = std::fs::rename(&dest, &source) {
                    error!(
                        "Could not return {} to the live cache: {rollback}",
                        dest.display()
                    );
                }
                Err(err)
            }
        }
    }

    fn register(
        &self,
        reference: &ArchiveRef,
        plane_id: &str,
        evidence_hash: &str,
    ) -> Result<Vec<LedgerEntry>> {
        let target = reference.target();
        let mut entries = vec![self.ledger.append(
            Action::FlightArchived,
            &target,
            SYSTEM_ACTOR,
            evidence_hash,
            Some(&format!("Moved to {}", reference.category.slug())),
        )?];

        if reference.category == Category::Standard {
            entries.push(self.ledger.append(
                Action::StandardOpsRegistered,
                &target,
                SYSTEM_ACTOR,
                evidence_hash,
                Some(&format!("Normal flight {plane_id} registered in blockchain")),
            )?);
        }
        Ok(entries)
    }

    fn unique_reference(&self, category: Category, plane_id: &str) -> Result<ArchiveRef> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let mut reference =
            ArchiveRef::new(category, format!("{stamp}_{plane_id}.{RECORDING_EXT}"))?;
        let mut n = 1;
        while self.layout.resolve(&reference).exists() {
            reference =
                ArchiveRef::new(category, format!("{stamp}_{plane_id}_{n}.{RECORDING_EXT}"))?;
            n += 1;
        }
        Ok(reference)
    }

    /// List archived recordings per category, newest first. The listing is
    /// itself recorded as `LIST_VIEWED`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidActor`], [`Error::LedgerWrite`], or an I/O
    /// error reading a category directory.
    pub fn list_archives(&self, actor: &str) -> Result<ArchiveListing> {
        validate_actor(actor, true)?;
        self.ledger.append(
            Action::ListViewed,
            "ALL",
            actor,
            NO_EVIDENCE,
            Some("Archive listing viewed"),
        )?;

        let mut listing = ArchiveListing::default();
        for category in Category::ALL {
            let dir = self.layout.category_dir(category);
            let mut files = Vec::new();
            if dir.exists() {
                for entry in std::fs::read_dir(&dir)? {
                    let path = entry?.path();
                    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    let is_recording = path.extension().and_then(|e| e.to_str())
                        == Some(RECORDING_EXT);
                    if is_recording && !name.starts_with('.') && path.is_file() {
                        files.push(name.to_string());
                    }
                }
            }
            // Names start with the archival timestamp.
            files.sort_unstable_by(|a, b| b.cmp(a));
            listing.categories.insert(category, files);
        }
        Ok(listing)
    }

    /// Delete an archived file on behalf of `actor`.
    ///
    /// The file is first hidden under a tombstone name, then
    /// `EVIDENCE_DESTROYED` is recorded, then the tombstone is removed. If
    /// the entry cannot be written the file is restored and the deletion
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidActor`] for an empty or system actor,
    /// [`Error::NotFound`] if the file does not exist,
    /// [`Error::LedgerWrite`] if the deletion could not be recorded, or an
    /// I/O error.
    #[instrument(skip(self), fields(target = %reference))]
    pub fn delete(&self, reference: &ArchiveRef, actor: &str) -> Result<LedgerEntry> {
        validate_actor(actor, false)?;

        let path = self.layout.resolve(reference);
        if !path.is_file() {
            return Err(Error::not_found(path));
        }
        let evidence_hash = hash_file(&path)?;

        let tombstone = path.with_file_name(format!(".{}.deleting", reference.filename));
        std::fs::rename(&path, &tombstone)?;

        let entry = match self.ledger.append(
            Action::EvidenceDestroyed,
            &reference.target(),
            actor,
            &evidence_hash,
            Some("Archived file deleted"),
        ) {
            Ok(entry) => entry,
            Err(err) => {
                if let Err(restore) = std::fs::rename(&tombstone, &path) {
                    error!(
                        "Could not restore {} after failed deletion: {restore}",
                        path.display()
                    );
                }
                return Err(err);
            }
        };

        std::fs::remove_file(&tombstone).map_err(|e| {
            warn!(
                "Deletion of {reference} recorded but {} remains: {e}",
                tombstone.display()
            );
            e
        })?;

        info!("{actor} deleted {reference}");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Classifier, Squawk};
    use crate::ledger::{LedgerStore, MemoryStore};
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        archiver: Archiver,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let ledger = ChainWriter::open(Box::new(Arc::clone(&store))).unwrap();
        let archiver = Archiver::new(ArchiveLayout::new(dir.path()), Arc::new(ledger)).unwrap();
        Fixture {
            _dir: dir,
            archiver,
            store,
        }
    }

    fn fly(archiver: &Archiver, plane_id: &str, codes: &[&str]) -> FlightSession {
        let mut session = Classifier::default().session(plane_id);
        for code in codes {
            archiver
                .record_telemetry(plane_id, &json!({"squawk": code, "alt": 3000}))
                .unwrap();
            session.on_squawk(Squawk::parse(code).unwrap());
        }
        session
    }

    fn actions(store: &MemoryStore) -> Vec<String> {
        store
            .records()
            .unwrap()
            .iter()
            .map(|r| LedgerEntry::from_record(r).unwrap().action.name().to_string())
            .collect()
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("20240101_120000_N1.jsonl").is_ok());
        for bad in ["", "..", "../x.jsonl", "a/b.jsonl", ".hidden.jsonl", "a..b", "x y"] {
            assert!(validate_filename(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_actor() {
        assert!(validate_actor("ops", false).is_ok());
        assert!(validate_actor("SYSTEM", true).is_ok());
        assert!(validate_actor("SYSTEM", false).is_err());
        assert!(validate_actor("  ", true).is_err());
    }

    #[test]
    fn test_layout_creates_dirs() {
        let f = fixture();
        let layout = f.archiver.layout();
        assert!(layout.live_dir().is_dir());
        for category in Category::ALL {
            assert!(layout.category_dir(category).is_dir());
        }
        assert!(layout
            .category_dir(Category::Crash)
            .ends_with("investigation/crashes"));
    }

    #[test]
    fn test_record_telemetry_entries() {
        let f = fixture();
        fly(&f.archiver, "N1", &["1200", "1200"]);

        assert_eq!(
            actions(&f.store),
            vec!["FLIGHT_STARTED", "LOG_ENTRY", "LOG_ENTRY"]
        );

        let records = f.store.records().unwrap();
        let started = LedgerEntry::from_record(&records[0]).unwrap();
        assert_eq!(started.target, "N1");
        assert_eq!(started.details.as_deref(), Some("Plane N1 connected"));

        let log = LedgerEntry::from_record(&records[1]).unwrap();
        let telemetry = log.telemetry().unwrap();
        assert_eq!(log.evidence_hash, hash_json(telemetry));
        assert!(telemetry.get("server_ts").is_some());
    }

    #[test]
    fn test_standard_ops_parity() {
        let f = fixture();
        let mut session = fly(&f.archiver, "N1", &["1200"]);
        session.on_landed();

        let archived = f.archiver.archive(&mut session).unwrap().unwrap();
        assert_eq!(archived.reference.category, Category::Standard);
        assert!(archived.path.is_file());
        assert!(!f.archiver.live().path_for("N1").unwrap().exists());

        let [moved, registered] = archived.entries.as_slice() else {
            panic!("expected two entries, got {:?}", archived.entries);
        };
        assert_eq!(moved.action, Action::FlightArchived);
        assert_eq!(registered.action, Action::StandardOpsRegistered);
        assert_eq!(moved.evidence_hash, registered.evidence_hash);
        assert_eq!(moved.evidence_hash, hash_file(&archived.path).unwrap());
        assert_eq!(moved.target, archived.reference.target());
        assert_eq!(moved.details.as_deref(), Some("Moved to normal"));
        assert_eq!(
            registered.details.as_deref(),
            Some("Normal flight N1 registered in blockchain")
        );
    }

    #[test]
    fn test_emergency_archive_single_entry() {
        let f = fixture();
        let mut session = fly(&f.archiver, "N7", &["1200", "7700", "1200"]);
        session.on_landed();

        let archived = f.archiver.archive(&mut session).unwrap().unwrap();
        assert_eq!(archived.reference.category, Category::Emergency7700);
        assert_eq!(archived.entries.len(), 1);
        assert!(archived.reference.target().starts_with("emergency/"));
        assert!(archived.reference.filename.ends_with("_N7.jsonl"));
        assert!(archived
            .path
            .starts_with(f.archiver.layout().category_dir(Category::Emergency7700)));
    }

    #[test]
    fn test_archive_without_recording() {
        let f = fixture();
        let mut session = Classifier::default().session("GHOST");
        session.on_disconnect();
        assert!(f.archiver.archive(&mut session).unwrap().is_none());
        assert_eq!(session.final_category(), Some(Category::Standard));
        assert!(f.store.records().unwrap().is_empty());
    }

    #[test]
    fn test_archive_rolls_back_on_ledger_failure() {
        let f = fixture();
        let mut session = fly(&f.archiver, "N9", &["7600"]);
        session.on_landed();
        let before = f.store.records().unwrap().len();

        f.store.fail_writes(true);
        let err = f.archiver.archive(&mut session).unwrap_err();
        assert!(err.is_ledger_write());

        assert!(f.archiver.live().path_for("N9").unwrap().exists());
        let dir = f.archiver.layout().category_dir(Category::RadioFailure7600);
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
        assert_eq!(f.store.records().unwrap().len(), before);
    }

    #[test]
    fn test_standard_registration_failure_returns_recording() {
        let f = fixture();
        let mut session = fly(&f.archiver, "N5", &["1200"]);
        session.on_landed();

        f.store.fail_after(1);
        let err = f.archiver.archive(&mut session).unwrap_err();
        assert!(err.is_ledger_write());

        assert!(f.archiver.live().path_for("N5").unwrap().exists());
        let dir = f.archiver.layout().category_dir(Category::Standard);
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
        // The archival entry stays in the chain; only the registration is missing.
        assert_eq!(
            actions(&f.store),
            vec!["FLIGHT_STARTED", "LOG_ENTRY", "FLIGHT_ARCHIVED"]
        );
        assert!(f.archiver.ledger().audit().is_ok());
    }

    #[test]
    fn test_same_second_archives_do_not_collide() {
        let f = fixture();
        let mut first = fly(&f.archiver, "N5", &["1200"]);
        first.on_landed();
        let a = f.archiver.archive(&mut first).unwrap().unwrap();

        let mut second = fly(&f.archiver, "N5", &["1200"]);
        second.on_landed();
        let b = f.archiver.archive(&mut second).unwrap().unwrap();

        assert_ne!(a.path, b.path);
        assert!(a.path.is_file());
        assert!(b.path.is_file());
    }

    #[test]
    fn test_list_archives() {
        let f = fixture();
        for plane in ["A1", "A2"] {
            let mut session = fly(&f.archiver, plane, &["1200"]);
            session.on_landed();
            f.archiver.archive(&mut session).unwrap();
        }
        let mut crash = fly(&f.archiver, "C1", &["7700"]);
        crash.on_disconnect();
        f.archiver.archive(&mut crash).unwrap();

        let listing = f.archiver.list_archives("ops").unwrap();
        assert_eq!(listing.files(Category::Standard).len(), 2);
        assert_eq!(listing.files(Category::Crash).len(), 1);
        assert!(listing.files(Category::Hijack7500).is_empty());
        assert_eq!(listing.total(), 3);

        let last = LedgerEntry::from_record(&f.store.records().unwrap().pop().unwrap()).unwrap();
        assert_eq!(last.action, Action::ListViewed);
        assert_eq!(last.target, "ALL");
        assert_eq!(last.actor, "ops");
    }

    #[test]
    fn test_list_archives_sorted_newest_first() {
        let f = fixture();
        let dir = f.archiver.layout().category_dir(Category::Standard);
        for name in ["20240101_000000_A.jsonl", "20250101_000000_B.jsonl", "notes.txt"] {
            std::fs::write(dir.join(name), "{}\n").unwrap();
        }
        std::fs::write(dir.join(".x.jsonl.deleting"), "{}\n").unwrap();

        let listing = f.archiver.list_archives("ops").unwrap();
        assert_eq!(
            listing.files(Category::Standard),
            ["20250101_000000_B.jsonl", "20240101_000000_A.jsonl"]
        );
    }

    #[test]
    fn test_listing_serializes_by_category_name() {
        let f = fixture();
        let listing = f.archiver.list_archives("ops").unwrap();
        let json = serde_json::to_value(&listing).unwrap();
        assert!(json.get("EMERGENCY_7700").unwrap().is_array());
        assert_eq!(json.as_object().unwrap().len(), Category::ALL.len());
    }

    #[test]
    fn test_delete_records_and_removes() {
        let f = fixture();
        let mut session = fly(&f.archiver, "D1", &["1200"]);
        session.on_landed();
        let archived = f.archiver.archive(&mut session).unwrap().unwrap();

        let entry = f.archiver.delete(&archived.reference, "alice").unwrap();
        assert_eq!(entry.action, Action::EvidenceDestroyed);
        assert_eq!(entry.actor, "alice");
        assert_eq!(entry.evidence_hash, archived.evidence_hash);
        assert_eq!(entry.target, archived.reference.target());

        assert!(!archived.path.exists());
        let dir = f.archiver.layout().category_dir(Category::Standard);
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
    }

    #[test]
    fn test_delete_rejects_system_actor() {
        let f = fixture();
        let mut session = fly(&f.archiver, "D2", &["1200"]);
        session.on_landed();
        let archived = f.archiver.archive(&mut session).unwrap().unwrap();

        for actor in [SYSTEM_ACTOR, ""] {
            let err = f.archiver.delete(&archived.reference, actor).unwrap_err();
            assert!(matches!(err, Error::InvalidActor { .. }));
        }
        assert!(archived.path.is_file());
    }

    #[test]
    fn test_delete_missing_file() {
        let f = fixture();
        let reference = ArchiveRef::new(Category::Crash, "nope.jsonl").unwrap();
        let err = f.archiver.delete(&reference, "alice").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_delete_aborts_on_ledger_failure() {
        let f = fixture();
        let mut session = fly(&f.archiver, "D3", &["7500"]);
        session.on_landed();
        let archived = f.archiver.archive(&mut session).unwrap().unwrap();
        let before = f.store.records().unwrap().len();

        f.store.fail_writes(true);
        let err = f.archiver.delete(&archived.reference, "alice").unwrap_err();
        assert!(err.is_ledger_write());

        assert!(archived.path.is_file());
        assert_eq!(hash_file(&archived.path).unwrap(), archived.evidence_hash);
        let tombstone = archived
            .path
            .with_file_name(format!(".{}.deleting", archived.reference.filename));
        assert!(!tombstone.exists());
        assert_eq!(f.store.records().unwrap().len(), before);
    }

    #[test]
    fn test_archive_ref_display_matches_target() {
        let reference = ArchiveRef::new(Category::Hijack7500, "x.jsonl").unwrap();
        assert_eq!(reference.to_string(), "security/x.jsonl");
        assert_eq!(reference.target(), reference.to_string());
    }
}
