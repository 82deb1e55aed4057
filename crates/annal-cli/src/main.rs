//! Annal CLI - inspect and verify tamper-evident audit logs.
//!
//! Reads the layered configuration, opens the persistent store and runs one
//! command against it. Verification commands exit with status 1 when the
//! chain is broken.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::sync::Arc;

use annal_audit::{AuditStore, AuditWriter, KvAuditStore, StaticSettings};
use annal_config::Config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

mod commands;
pub mod config_bridge;
mod theme;

use commands::audit::{ExportFormat, ManualEntry};
use commands::{audit, config};

/// Annal - tamper-evident audit log
#[derive(Parser)]
#[command(name = "annal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file merged above the user config
    #[arg(short, long, global = true, env = "ANNAL_CONFIG")]
    config: Option<PathBuf>,

    /// Store directory (overrides `audit.store_path`)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and verify the audit store
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Verify an exported JSON Lines file
    VerifyFile {
        /// Path to the export
        path: PathBuf,
        /// Hash of the record preceding the first one in the file
        #[arg(long, conflicts_with = "window")]
        after: Option<String>,
        /// Treat the file as a window with unknown predecessor
        #[arg(long)]
        window: bool,
        /// Records were written by a store without optional columns
        #[arg(long)]
        minimal: bool,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// List records
    List {
        /// First record id
        #[arg(long, default_value_t = 1)]
        from: u64,
        /// Maximum number of records
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one record
    Show {
        /// Record id
        id: u64,
        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify the whole chain
    Verify,
    /// Show audit statistics
    Stats,
    /// Export every record
    Export {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Jsonl)]
        format: ExportFormat,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Append a manual entry through the write path
    Record {
        /// Action name, e.g. `password_reset`
        action: String,
        /// Kind of subject, e.g. `user`
        subject_type: String,
        /// Subject identifier
        #[arg(long)]
        subject_id: Option<String>,
        /// Acting user
        #[arg(long)]
        actor: Option<String>,
        /// Subject label (derived from the values when omitted)
        #[arg(long)]
        label: Option<String>,
        /// `key=value` recorded as a new value; repeatable
        #[arg(long = "set")]
        values: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show resolved configuration with source annotations
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
        /// Show only a specific section (audit or logging)
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Validate the current configuration
    Validate,
    /// Show config file paths being checked
    Paths,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands report load errors themselves.
    let command = match cli.command {
        Commands::Config { command } => return handle_config(command, cli.config.as_deref()),
        other => other,
    };

    let cfg = Config::load(cli.config.as_deref())?.config;

    let mut log_config = config_bridge::to_log_config(&cfg);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = annal_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let valid = match command {
        Commands::Audit { command } => handle_audit(command, &cfg, cli.store)?,
        Commands::VerifyFile {
            path,
            after,
            window,
            minimal,
        } => audit::verify_file(
            &path,
            after.as_deref(),
            window,
            minimal,
            config_bridge::verification_key(&cfg)?,
        )?,
        Commands::Config { .. } => true,
    };

    if !valid {
        std::process::exit(1);
    }
    Ok(())
}

/// Run an audit subcommand. Returns `false` when a verification failed.
fn handle_audit(command: AuditCommands, cfg: &Config, store: Option<PathBuf>) -> Result<bool> {
    let path = config_bridge::store_path(cfg, store)?;
    debug!(path = %path.display(), "opening audit store");
    let store = Arc::new(KvAuditStore::open(&path)?);

    let result = match command {
        AuditCommands::List { from, limit } => audit::list_records(store.as_ref(), from, limit),
        AuditCommands::Show { id, json } => audit::show_record(store.as_ref(), id, json),
        AuditCommands::Verify => {
            let key = config_bridge::verification_key(cfg)?;
            return audit::verify_chain(store.as_ref(), key);
        },
        AuditCommands::Stats => {
            audit::show_stats(store.as_ref(), config_bridge::verification_key(cfg)?)
        },
        AuditCommands::Export { format, output } => {
            audit::export_records(store.as_ref(), format, output.as_deref())
        },
        AuditCommands::Record {
            action,
            subject_type,
            subject_id,
            actor,
            label,
            values,
        } => {
            let settings = Arc::new(StaticSettings::new(config_bridge::to_audit_settings(cfg)));
            let writer = AuditWriter::new(store.clone(), settings);
            let entry = ManualEntry {
                action,
                subject_type,
                subject_id,
                actor,
                label,
                values,
            };
            let result = audit::record_entry(&writer, entry);
            store.flush()?;
            result
        },
    };
    result.map(|()| true)
}

fn handle_config(command: ConfigCommands, explicit: Option<&std::path::Path>) -> Result<()> {
    match command {
        ConfigCommands::Show { format, section } => {
            config::show_config(explicit, &format, section.as_deref())
        },
        ConfigCommands::Validate => {
            if !config::validate_config(explicit) {
                std::process::exit(1);
            }
            Ok(())
        },
        ConfigCommands::Paths => config::show_paths(explicit),
    }
}
