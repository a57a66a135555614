//! `flightledger` - Tamper-evident archive for aircraft telemetry
//!
//! This library classifies each flight from its squawk history, files the
//! flight's recording under that classification, and keeps an append-only,
//! hash-chained ledger of everything done to the recordings so that later
//! alteration of either the files or their history can be detected.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod archive;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod ingest;
pub mod ledger;
pub mod logging;
pub mod recording;
pub mod verify;

pub use archive::{ArchiveLayout, ArchiveListing, ArchiveRef, ArchivedFile, Archiver};
pub use classify::{Category, Classifier, ConnectivityState, FlightSession, Squawk};
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{
    ChannelSource, FlightEvent, IngestSummary, Ingestor, JsonLinesSource, TelemetrySource,
};
pub use ledger::{
    audit, Action, AuditReport, ChainWriter, FileStore, LedgerEntry, LedgerStore, MemoryStore,
};
pub use logging::init_logging;
pub use verify::{VerificationReport, Verifier};
