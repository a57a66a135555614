//! `fledger` - CLI for flightledger
//!
//! This binary ingests flight telemetry into the archive and gives operators
//! audited access to the archived recordings.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::BufReader;

use flightledger::cli::{
    AuditCommand, Cli, Command, ConfigCommand, DeleteCommand, IngestCommand, ListCommand,
    TailCommand, VerifyCommand,
};
use flightledger::ingest::JsonLinesSource;
use flightledger::{audit, init_logging, Archiver, Config, FileStore, Ingestor, LedgerEntry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;
    let actor = cli.actor();

    // Execute the command
    match cli.command {
        Command::Ingest(cmd) => handle_ingest(&config, cmd).await,
        Command::List(cmd) => handle_list(&config, &cmd, &actor),
        Command::Verify(cmd) => handle_verify(&config, &cmd, &actor),
        Command::Delete(cmd) => handle_delete(&config, &cmd, &actor),
        Command::Audit(cmd) => handle_audit(&config, &cmd),
        Command::Tail(cmd) => handle_tail(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_ingest(config: &Config, cmd: IngestCommand) -> anyhow::Result<()> {
    let archiver = Arc::new(Archiver::from_config(config)?);
    let mut ingestor = Ingestor::new(archiver, config.classifier()?);

    let summary = match cmd.file {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            let mut source = JsonLinesSource::new(BufReader::new(file));
            ingestor.run(&mut source).await?
        }
        None => {
            let mut source = JsonLinesSource::new(BufReader::new(tokio::io::stdin()));
            ingestor.run(&mut source).await?
        }
    };

    println!(
        "{} events, {} rejected, {} flights archived",
        summary.events,
        summary.rejected,
        summary.archived.len()
    );
    for file in &summary.archived {
        println!("  {:<20} {}", file.reference.category, file.reference);
    }
    Ok(())
}

fn handle_list(config: &Config, cmd: &ListCommand, actor: &str) -> anyhow::Result<()> {
    let archiver = Archiver::from_config(config)?;
    let listing = archiver.list_archives(actor)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for (category, files) in listing.iter() {
        println!("{category} ({})", files.len());
        for name in files {
            println!("  {name}");
        }
    }
    Ok(())
}

fn handle_verify(config: &Config, cmd: &VerifyCommand, actor: &str) -> anyhow::Result<()> {
    let reference = cmd.file.reference()?;
    let archiver = Archiver::from_config(config)?;
    let report = archiver.verifier().verify(&reference, actor)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {}", report.target, report.status());
        println!("  Recorded:  {} ({})", report.recorded_hash, report.recorded_at);
        println!("  Current:   {}", report.current_hash);
    }

    if !report.matches {
        bail!("{} has been altered since it was archived", report.target);
    }
    Ok(())
}

fn handle_delete(config: &Config, cmd: &DeleteCommand, actor: &str) -> anyhow::Result<()> {
    let reference = cmd.file.reference()?;
    if !cmd.yes {
        println!("This will permanently delete {reference}.");
        println!("Use --yes to confirm.");
        return Ok(());
    }

    let archiver = Archiver::from_config(config)?;
    let entry = archiver.delete(&reference, actor)?;
    println!("Deleted {reference} (recorded at {})", entry.timestamp);
    Ok(())
}

fn handle_audit(config: &Config, cmd: &AuditCommand) -> anyhow::Result<()> {
    let path = config.ledger_path();
    let records =
        FileStore::read_records(&path).with_context(|| format!("reading {}", path.display()))?;
    let report = audit(&records)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Ledger intact: {} entries", report.entries);
        println!("Head:          {}", report.head);
    }
    Ok(())
}

fn handle_tail(config: &Config, cmd: &TailCommand) -> anyhow::Result<()> {
    let path = config.ledger_path();
    let records =
        FileStore::read_records(&path).with_context(|| format!("reading {}", path.display()))?;
    let start = records.len().saturating_sub(cmd.lines);

    for record in &records[start..] {
        if cmd.json {
            println!("{record}");
            continue;
        }
        match LedgerEntry::from_record(record) {
            Ok(entry) => println!(
                "{}  {:<24} {:<12} {}{}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
                entry.action,
                entry.actor,
                entry.target,
                entry
                    .details
                    .as_deref()
                    .map(|d| format!("  ({d})"))
                    .unwrap_or_default()
            ),
            Err(e) => println!("<unreadable record: {e}>"),
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Ledger]");
                println!("  Path:            {}", config.ledger_path().display());
                println!("  Lock timeout:    {} ms", config.ledger.lock_timeout_ms);
                println!();
                println!("[Archive]");
                println!("  Root:            {}", config.archive_root().display());
                println!();
                println!("[Classifier]");
                println!(
                    "  Nominal squawks: {}",
                    config.classifier.nominal_squawks.join(", ")
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
