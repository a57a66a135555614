//! Command-line interface for flightledger.
//!
//! This module provides the CLI structure for the `fledger` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AuditCommand, ConfigCommand, DeleteCommand, FileArgs, IngestCommand, ListCommand, TailCommand,
    VerifyCommand,
};

use crate::logging::Verbosity;

/// Fallback identity when neither `--actor` nor `$USER` is available.
const DEFAULT_ACTOR: &str = "operator";

/// fledger - Tamper-evident flight recording archive
///
/// Records aircraft telemetry, files each flight by its worst squawk, and
/// keeps a hash-chained ledger of everything done to the recordings.
#[derive(Debug, Parser)]
#[command(name = "fledger")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Identity recorded in the ledger for operator actions (defaults to $USER)
    #[arg(long, global = true, value_name = "NAME")]
    pub actor: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record and archive flights from a JSON-lines event stream
    Ingest(IngestCommand),

    /// List archived recordings
    List(ListCommand),

    /// Check an archived recording against its ledger record
    Verify(VerifyCommand),

    /// Delete an archived recording
    Delete(DeleteCommand),

    /// Re-walk the ledger and check every chain link
    Audit(AuditCommand),

    /// Show the latest ledger entries
    Tail(TailCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }

    /// The identity to record for operator actions.
    #[must_use]
    pub fn actor(&self) -> String {
        self.actor
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|actor| !actor.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ACTOR.to_string())
    }
}
