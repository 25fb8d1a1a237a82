//! `petrify` CLI: export a site to a static archive and publish it.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use petrify_logging::LogDestination;

mod commands;
mod config;
mod persistence;

use config::{AppConfig, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "petrify")]
#[command(about = "Export a dynamic site to a static archive and publish it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the RON configuration file [default: petrify.ron]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    /// Keep diagnostics off the terminal; they still go to the diagnostics file if configured
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full export, then deploy when enabled in the configuration
    Export {
        /// Skip the upload even if deploy is enabled
        #[arg(long)]
        no_deploy: bool,
    },

    /// Notify that a post was saved; exports unless it is new or a revision
    ContentUpdated {
        #[arg(long)]
        post_id: u64,

        /// The save created the post
        #[arg(long)]
        new: bool,

        /// The save is an autosave or revision
        #[arg(long)]
        revision: bool,
    },

    /// Upload an existing archive to object storage
    Deploy {
        archive: PathBuf,
    },

    /// Print the activity log
    Log {
        /// Discard every entry instead
        #[arg(long)]
        clear: bool,
    },

    /// Manage DNS records through the edge worker
    Dns {
        #[command(subcommand)]
        command: DnsCommand,
    },
}

#[derive(Subcommand)]
enum DnsCommand {
    /// List records
    List,

    /// Create a record
    Add {
        #[arg(long = "type")]
        record_type: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        content: String,

        #[arg(long, default_value_t = petrify_core::DEFAULT_TTL)]
        ttl: u32,

        #[arg(long)]
        proxied: bool,
    },

    /// Delete a record by id
    Delete {
        id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let mut config = AppConfig::load(&path, required)?;
    config.apply_env(|name| std::env::var(name).ok());

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Some(destination) = log_destination(config.log.diagnostics.clone(), cli.quiet) {
        petrify_logging::initialize(destination, level);
    }

    let ctx = commands::Context::new(config);
    match cli.command {
        Commands::Export { no_deploy } => commands::export(&ctx, !no_deploy),
        Commands::ContentUpdated {
            post_id,
            new,
            revision,
        } => commands::content_updated(&ctx, post_id, !new, revision),
        Commands::Deploy { archive } => {
            let runtime = runtime()?;
            commands::deploy(&ctx, &runtime, &archive)
        }
        Commands::Log { clear } => {
            commands::show_log(&ctx, clear);
            Ok(())
        }
        Commands::Dns { command } => {
            let runtime = runtime()?;
            match command {
                DnsCommand::List => commands::dns_list(&ctx, &runtime),
                DnsCommand::Add {
                    record_type,
                    name,
                    content,
                    ttl,
                    proxied,
                } => {
                    let mut record = petrify_core::DnsRecord::new(record_type, name, content);
                    record.ttl = ttl;
                    record.proxied = proxied;
                    commands::dns_add(&ctx, &runtime, &record)
                }
                DnsCommand::Delete { id } => commands::dns_delete(&ctx, &runtime, &id),
            }
        }
    }
}

/// Where diagnostics go; `None` installs no logger at all.
fn log_destination(diagnostics: Option<PathBuf>, quiet: bool) -> Option<LogDestination> {
    match (diagnostics, quiet) {
        (Some(file), true) => Some(LogDestination::File(file)),
        (Some(file), false) => Some(LogDestination::Both(file)),
        (None, true) => None,
        (None, false) => Some(LogDestination::Terminal),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
