//! dirsync - one-way directory synchronisation
//!
//! Reads users, groups and mailing lists from a source directory and creates
//! or updates their counterparts in a destination directory.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use dirsync_connector::operation::Filter;
use dirsync_connector_ldap::LdapDirectory;
use dirsync_sync::{SyncConfig, SyncStatus, SyncTarget, Synchronizer};

mod logging;
mod store;

use store::FileStore;

/// Synchronise directory entries from a source into a destination directory
#[derive(Debug, Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "DIRSYNC_CONFIG", default_value = "dirsync.yaml")]
    config: PathBuf,

    /// Reset the stored watermark before running
    #[arg(long, conflicts_with = "dry_run")]
    full_resync: bool,

    /// Raw LDAP filter replacing the built filter for these runs
    #[arg(long)]
    filter: Option<String>,

    /// Reconcile and log without writing to the destination
    #[arg(long)]
    dry_run: bool,

    /// Print run summaries as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level used when neither RUST_LOG nor the config sets one
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Entry types to synchronise
    #[arg(value_enum, required = true)]
    targets: Vec<TargetArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetArg {
    User,
    Group,
    List,
    All,
}

impl TargetArg {
    fn expand(self) -> &'static [SyncTarget] {
        match self {
            TargetArg::User => &[SyncTarget::User],
            TargetArg::Group => &[SyncTarget::Group],
            TargetArg::List => &[SyncTarget::List],
            TargetArg::All => &SyncTarget::ALL,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!(error = %format!("{e:#}"), "dirsync aborted");
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SyncConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init_logging(&config.logging, &cli.log_level)?;

    let (targets, implicit) = resolve_targets(&cli.targets);
    let state = FileStore::open(&config.state_file)
        .with_context(|| format!("opening state file {}", config.state_file.display()))?;
    info!(state = %state.path().display(), config = %cli.config.display(), "Configuration loaded");

    let source = LdapDirectory::new("source", config.source.clone())?;
    let destination = LdapDirectory::new("destination", config.destination.clone())?;
    let mut sync = Synchronizer::new(
        config,
        Arc::new(source),
        Arc::new(destination),
        Arc::new(state),
    )?
    .with_dry_run(cli.dry_run);

    if cli.full_resync {
        let previous = sync.begin_full_resync().await?;
        info!(previous, "Watermark reset for full resync");
    }

    let filter = cli.filter.as_deref().map(Filter::raw);
    for target in targets {
        if sync.profile(target).is_none() {
            if implicit {
                info!(target = %target, "No section configured; skipped");
                continue;
            }
            bail!("no {target} section configured");
        }

        if let Some(filter) = &filter {
            sync.set_filter_override(filter.clone());
        }
        let status = sync
            .run(target)
            .await
            .with_context(|| format!("{target} synchronisation failed"))?;
        print_summary(&status, cli.json)?;
    }

    Ok(())
}

/// Targets in run order without repeats, and whether they came from `all`.
fn resolve_targets(args: &[TargetArg]) -> (Vec<SyncTarget>, bool) {
    let mut targets = Vec::new();
    for target in args.iter().flat_map(|arg| arg.expand()) {
        if !targets.contains(target) {
            targets.push(*target);
        }
    }
    (targets, args.contains(&TargetArg::All))
}

fn print_summary(status: &SyncStatus, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(status)?);
    } else {
        match status.duration_ms() {
            Some(ms) => println!("{status} ({ms} ms)"),
            None => println!("{status}"),
        }
    }
    Ok(())
}
