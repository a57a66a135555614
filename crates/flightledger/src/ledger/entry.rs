//! Ledger record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::hash_bytes;

/// Chain link carried by the first record of every ledger.
///
/// Contains characters outside the hex alphabet, so it can never be mistaken
/// for a real digest.
pub const GENESIS: &str = "GENESIS_BLOCK_000000000000000000000000";

/// Actor recorded for entries the system makes on its own behalf.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Evidence hash recorded when an action has no evidence attached.
pub const NO_EVIDENCE: &str = "N/A";

/// What happened. Action-specific data travels inside the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// The ingest service came up.
    SystemStartup,
    /// First telemetry for a flight was recorded.
    FlightStarted,
    /// A single telemetry point, embedded verbatim.
    LogEntry {
        /// The telemetry snapshot whose canonical hash is the evidence hash.
        telemetry: Value,
    },
    /// A recording was moved into its category.
    FlightArchived,
    /// A standard flight was registered with its full-content hash.
    StandardOpsRegistered,
    /// Someone listed the archive.
    ListViewed,
    /// Someone verified an archived file.
    IntegrityCheck,
    /// Someone deleted an archived file.
    EvidenceDestroyed,
}

impl Action {
    /// The record name of this action.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SystemStartup => "SYSTEM_STARTUP",
            Self::FlightStarted => "FLIGHT_STARTED",
            Self::LogEntry { .. } => "LOG_ENTRY",
            Self::FlightArchived => "FLIGHT_ARCHIVED",
            Self::StandardOpsRegistered => "STANDARD_OPS_REGISTERED",
            Self::ListViewed => "LIST_VIEWED",
            Self::IntegrityCheck => "INTEGRITY_CHECK",
            Self::EvidenceDestroyed => "EVIDENCE_DESTROYED",
        }
    }

    /// Whether this action records a file's hash at archival time.
    #[must_use]
    pub fn is_archival(&self) -> bool {
        matches!(self, Self::FlightArchived | Self::StandardOpsRegistered)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// A single ledger record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// When the entry was appended (UTC, microsecond precision).
    #[serde(with = "micros")]
    pub timestamp: DateTime<Utc>,

    /// The action and any data specific to it.
    #[serde(flatten)]
    pub action: Action,

    /// `SYSTEM` or the identity of the caller.
    pub actor: String,

    /// Plane id, archive reference, or `ALL`/`N/A`.
    pub target: String,

    /// Digest of the evidence at the moment of recording.
    pub evidence_hash: String,

    /// Free-text context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Digest of the previous record, or [`GENESIS`].
    pub chain_link: String,
}

impl LedgerEntry {
    /// Serialize to a single-line record (no terminator).
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded telemetry cannot be serialized.
    pub fn to_record(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a single-line record.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a well-formed record.
    pub fn from_record(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// The embedded telemetry, for `LOG_ENTRY` records.
    #[must_use]
    pub fn telemetry(&self) -> Option<&Value> {
        match &self.action {
            Action::LogEntry { telemetry } => Some(telemetry),
            _ => None,
        }
    }
}

/// Digest of a stored record, as the next record's chain link.
#[must_use]
pub fn record_digest(record: &str) -> String {
    hash_bytes(record.as_bytes())
}

mod micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
