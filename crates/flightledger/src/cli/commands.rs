//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::archive::ArchiveRef;
use crate::classify::Category;
use crate::error::Result;

/// Ingest command arguments.
#[derive(Debug, Args)]
pub struct IngestCommand {
    /// JSON-lines event file to replay (reads stdin when omitted)
    pub file: Option<PathBuf>,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// An archived file, as named on the command line.
#[derive(Debug, Clone, Args)]
pub struct FileArgs {
    /// Category slug (normal, radio_fail, emergency, security, crash)
    pub category: Category,

    /// File name within the category
    pub filename: String,
}

impl FileArgs {
    /// Validate into an archive reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the file name is unsafe.
    pub fn reference(&self) -> Result<ArchiveRef> {
        ArchiveRef::new(self.category, self.filename.clone())
    }
}

/// Verify command arguments.
#[derive(Debug, Args)]
pub struct VerifyCommand {
    /// The file to verify
    #[command(flatten)]
    pub file: FileArgs,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Delete command arguments.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// The file to delete
    #[command(flatten)]
    pub file: FileArgs,

    /// Confirm the deletion
    #[arg(short, long)]
    pub yes: bool,
}

/// Audit command arguments.
#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Tail command arguments.
#[derive(Debug, Args)]
pub struct TailCommand {
    /// Number of entries to show
    #[arg(short = 'n', long, default_value = "20")]
    pub lines: usize,

    /// Output raw ledger records
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_args_reference() {
        let args = FileArgs {
            category: Category::Emergency7700,
            filename: "20240101_000000_N1.jsonl".to_string(),
        };
        assert_eq!(
            args.reference().unwrap().target(),
            "emergency/20240101_000000_N1.jsonl"
        );
    }

    #[test]
    fn test_file_args_rejects_traversal() {
        let args = FileArgs {
            category: Category::Standard,
            filename: "../../secure_ledger.jsonl".to_string(),
        };
        assert!(args.reference().is_err());
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        assert!(format!("{cmd:?}").contains("Show"));
    }
}
