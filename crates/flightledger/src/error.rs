//! Error types for flightledger.
//!
//! Ledger failures are kept distinct from recording-side I/O so callers can
//! tell "the evidence could not be read" apart from "the audit trail could not
//! be written". The latter is always fatal to the operation that triggered it.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for flightledger operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Ledger Errors ===
    /// A ledger record could not be durably written.
    #[error("failed to write ledger record to {path}: {source}")]
    LedgerWrite {
        /// Path (or name) of the ledger store.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Another writer held the ledger lock for longer than the lock timeout.
    #[error("ledger at {path} is locked by another writer")]
    LedgerLocked {
        /// Path to the ledger file.
        path: PathBuf,
    },

    /// A ledger record could not be parsed.
    #[error("corrupt ledger record at line {line}: {reason}")]
    LedgerCorrupt {
        /// 1-based line number of the record.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A record's chain link does not match the digest of its predecessor.
    #[error("ledger chain broken at line {line}: expected link {expected}, found {found}")]
    ChainBroken {
        /// 1-based line number of the offending record.
        line: usize,
        /// The link the record should have carried.
        expected: String,
        /// The link it actually carries.
        found: String,
    },

    // === Evidence Errors ===
    /// The file to verify or delete is not on disk.
    #[error("archived file not found: {path}")]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// No archival entry exists in the ledger for the target.
    #[error("no archival record in ledger for {target}")]
    NoRecord {
        /// Logical archive reference (`<category>/<filename>`).
        target: String,
    },

    // === Input Errors ===
    /// A squawk code is not four octal digits.
    #[error("invalid squawk code: {0:?}")]
    InvalidSquawk(String),

    /// A plane identifier is unusable as a recording name.
    #[error("invalid plane id: {0:?}")]
    InvalidPlaneId(String),

    /// Unknown archive category.
    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    /// An ingest event is malformed.
    #[error("invalid flight event: {0}")]
    InvalidEvent(String),

    /// A filename would escape its category directory.
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    /// The actor is not allowed to perform the operation.
    #[error("invalid actor {actor:?}: {reason}")]
    InvalidActor {
        /// The rejected actor identity.
        actor: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for flightledger operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a ledger write error.
    #[must_use]
    pub fn ledger_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LedgerWrite {
            path: path.into(),
            source,
        }
    }

    /// Map a failed ledger lock acquisition: a timeout becomes
    /// [`Error::LedgerLocked`], anything else a write failure.
    #[must_use]
    pub fn ledger_lock(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::WouldBlock {
            Self::LedgerLocked { path: path.into() }
        } else {
            Self::ledger_write(path, source)
        }
    }

    /// Create a corrupt record error.
    #[must_use]
    pub fn ledger_corrupt(line: usize, reason: impl Into<String>) -> Self {
        Self::LedgerCorrupt {
            line,
            reason: reason.into(),
        }
    }

    /// Create a not-found error for an archived file.
    #[must_use]
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Check if this error means the audit trail failed to persist.
    #[must_use]
    pub fn is_ledger_write(&self) -> bool {
        matches!(self, Self::LedgerWrite { .. } | Self::LedgerLocked { .. })
    }

    /// Check if this error is a tamper signal: a broken chain or a file the
    /// ledger has never seen archived.
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::ChainBroken { .. } | Self::NoRecord { .. })
    }
}
