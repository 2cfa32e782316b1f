//! sfs: personal file synchronisation client.
//!
//! Scans a local directory into a metadata cache, tracks what changed since
//! the last sync against a saved baseline, and pushes the changes in
//! size-bounded batches to the sync server or another directory. Pulls bring
//! down what the server has pending, batched the same way.

mod catalog;
mod error;
mod logging;

use crate::catalog::Catalog;
use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::{OptionExt, ResultExt};
use sfs_cache::{Database, Repository};
use sfs_config::Config;
use sfs_storage::BackendHandle;
use sfs_storage::backend::{LocalBackend, ReadOnlyBackend};
use sfs_sync::{Directory, QueueBuilder, RemoteFile, SyncFile, SyncIndex};
use sfs_transfer::{
    DryRunTransfer, HttpDownload, HttpTransfer, PullOutcome, PushOutcome, StorageTransfer, SyncServer, Transfer,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Parser)]
#[command(name = "sfs", version, about = "Personal file synchronisation client")]
struct Cli {
    /// Config file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the sync root into the metadata cache
    Scan {
        /// Report what would change without writing to the cache
        #[arg(long)]
        dry_run: bool,
    },
    /// Save a fresh sync baseline, taking every cached file as synced
    Index,
    /// Show how many files are pending sync
    Status,
    /// Show the batches the next push would transfer
    Plan,
    /// Transfer pending files and save the new baseline
    Push {
        /// Copy into this directory instead of uploading to the server
        #[arg(long)]
        to: Option<PathBuf>,

        /// Go through the motions without transferring or recording anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Download files the sync server has pending for this client
    Pull {
        /// Go through the motions without downloading or recording anything
        #[arg(long)]
        dry_run: bool,
    },
}
impl Commands {
    /// Whether the command must leave the metadata cache untouched.
    fn is_dry_run(&self) -> bool {
        match self {
            Self::Scan { dry_run } | Self::Push { dry_run, .. } | Self::Pull { dry_run } => *dry_run,
            Self::Index | Self::Status | Self::Plan => false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let dry_run = cli.command.is_dry_run();
    let db = Database::connect(&config.database).await.or_raise(|| ErrorKind::Cache)?;
    let source = Arc::new(LocalBackend::new("local", &config.root).or_raise(|| ErrorKind::Storage)?);
    let catalog = Catalog::new(&config.owner, source, Repository::new(db.pool().clone(), dry_run));
    let builder = QueueBuilder::new(config.batch.max_capacity);

    let result = match cli.command {
        Commands::Scan { .. } => scan(&catalog).await,
        Commands::Index => index(&config, &catalog).await,
        Commands::Status => status(&config, &catalog).await,
        Commands::Plan => plan(&config, &catalog, &builder).await,
        Commands::Push { to, dry_run } => push(&config, &catalog, &builder, to, dry_run).await,
        Commands::Pull { dry_run } => pull(&config, &catalog, &builder, dry_run).await,
    };
    db.close().await;
    result
}

async fn scan(catalog: &Catalog) -> Result<()> {
    let summary = catalog.scan().await?;
    println!(
        "{} new, {} renamed, {} changed, {} unchanged, {} removed",
        summary.discovered, summary.renamed, summary.changed, summary.unchanged, summary.removed
    );
    Ok(())
}

async fn index(config: &Config, catalog: &Catalog) -> Result<()> {
    catalog.scan().await?;
    let tree = catalog.tree().await?;
    let path = SyncIndex::baseline(&tree).save(&config.index_dir).or_raise(|| ErrorKind::Sync)?;
    let ids: Vec<_> = tree.walk().into_iter().map(|f| f.id.clone()).collect();
    catalog.mark_synced(&ids, OffsetDateTime::now_utc()).await?;
    println!("{} files indexed, baseline saved to {}", tree.len(), path.display());
    Ok(())
}

fn latest_index(config: &Config) -> Result<SyncIndex> {
    SyncIndex::<SyncFile>::load_latest(&config.index_dir, &config.owner)
        .or_raise(|| ErrorKind::Sync)?
        .ok_or_raise(|| ErrorKind::NoIndex { owner: config.owner.clone(), dir: config.index_dir.clone() })
}

/// Files the cache has never seen synced (new, or moved since) drop out of
/// the baseline, so staging picks them up as untracked.
async fn forget_unsynced(index: &mut SyncIndex, catalog: &Catalog) -> Result<()> {
    for id in catalog.unsynced().await? {
        if index.forget(&id).is_some() {
            tracing::debug!(file = %id, "Not synced since it was last indexed");
        }
    }
    Ok(())
}

/// Scan, then stage everything that needs pushing.
async fn stage(index: &mut SyncIndex, catalog: &Catalog) -> Result<Directory> {
    catalog.scan().await?;
    let tree = catalog.tree().await?;
    forget_unsynced(index, catalog).await?;
    index.stage(&tree);
    Ok(tree)
}

async fn status(config: &Config, catalog: &Catalog) -> Result<()> {
    let mut index = latest_index(config)?;
    let tree = stage(&mut index, catalog).await?;
    let untracked = tree.walk().into_iter().filter(|f| !index.has_file(&f.id)).count();
    match index.to_update.len() {
        0 => println!("sync queue empty"),
        pending => println!("{pending} files pending sync, {untracked} of them not synced before"),
    }
    Ok(())
}

async fn plan(config: &Config, catalog: &Catalog, builder: &QueueBuilder) -> Result<()> {
    let mut index = latest_index(config)?;
    stage(&mut index, catalog).await?;
    let Some(queue) = builder.build(&index).or_raise(|| ErrorKind::Sync)? else {
        println!("sync queue empty");
        return Ok(());
    };
    for batch in queue.iter() {
        let bytes = batch.total_size().or_raise(|| ErrorKind::Sync)?;
        let marker = if batch.is_oversized() { "  (oversized)" } else { "" };
        println!("{}  {:>6} files  {:>14} bytes{marker}", batch.id(), batch.len(), bytes);
    }
    Ok(())
}

async fn push(
    config: &Config,
    catalog: &Catalog,
    builder: &QueueBuilder,
    to: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let mut index = latest_index(config)?;
    catalog.scan().await?;
    let tree = catalog.tree().await?;
    forget_unsynced(&mut index, catalog).await?;
    let transfer = transfer_for(config, catalog.source(), to, dry_run)?;

    let report = match sfs_transfer::push(&mut index, &tree, builder, transfer.as_ref())
        .await
        .or_raise(|| ErrorKind::Transfer)?
    {
        PushOutcome::NothingToSync => {
            println!("sync queue empty");
            return Ok(());
        },
        PushOutcome::Pushed(report) => report,
    };
    println!(
        "{} files sent in {} batches, {} failed",
        report.sent.len(),
        report.batches,
        report.failed.len()
    );
    if dry_run {
        return Ok(());
    }
    catalog.mark_synced(&report.sent, OffsetDateTime::now_utc()).await?;
    index.save(&config.index_dir).or_raise(|| ErrorKind::Sync)?;
    Ok(())
}

async fn pull(config: &Config, catalog: &Catalog, builder: &QueueBuilder, dry_run: bool) -> Result<()> {
    let mut index = latest_index(config)?;
    let server = sync_server(config)?;
    let mut remote = server.fetch_index(&config.owner).await.or_raise(|| ErrorKind::Transfer)?;

    // Local changes not pushed yet win over the server's copy.
    let mut local = index.clone();
    stage(&mut local, catalog).await?;
    let unpushed: HashSet<PathBuf> = local.changed_files().into_iter().map(|f| f.path).collect();
    let mut wanted = Vec::new();
    for file in remote.to_update.values() {
        if unpushed.contains(&file.path) {
            tracing::warn!(path = %file.path.display(), "Local changes not pushed yet, skipping download");
        } else if !catalog.has_current(file).await? {
            wanted.push(file.id.clone());
        }
    }
    remote.to_update.retain(|id, _| wanted.contains(id));
    let pending = remote.to_update.clone();

    let transfer: Box<dyn Transfer<RemoteFile>> = match dry_run {
        true => Box::new(DryRunTransfer::new(server.endpoint())),
        false => Box::new(HttpDownload::new(server, catalog.source())),
    };
    let report = match sfs_transfer::pull(&mut remote, builder, transfer.as_ref())
        .await
        .or_raise(|| ErrorKind::Transfer)?
    {
        PullOutcome::NothingToSync => {
            println!("nothing to download");
            return Ok(());
        },
        PullOutcome::Pulled(report) => report,
    };
    println!(
        "{} files downloaded in {} batches, {} failed",
        report.sent.len(),
        report.batches,
        report.failed.len()
    );
    if dry_run {
        return Ok(());
    }
    let now = OffsetDateTime::now_utc();
    for file in report.sent.iter().filter_map(|id| pending.get(id)) {
        // Already in step with the server: no need to push it back.
        let record = catalog.adopt(file, now).await?;
        index.last_sync.insert(record.id, record.modified);
    }
    index.save(&config.index_dir).or_raise(|| ErrorKind::Sync)?;
    Ok(())
}

fn sync_server(config: &Config) -> Result<SyncServer> {
    SyncServer::new(&config.server.endpoint, config.server.timeout()).or_raise(|| ErrorKind::Transfer)
}

fn transfer_for(config: &Config, source: BackendHandle, to: Option<PathBuf>, dry_run: bool) -> Result<Box<dyn Transfer>> {
    let Some(to) = to else {
        if dry_run {
            return Ok(Box::new(DryRunTransfer::new(&config.server.endpoint)));
        }
        return Ok(Box::new(HttpTransfer::new(sync_server(config)?, source)));
    };
    let to = std::path::absolute(&to).or_raise(|| ErrorKind::Storage)?;
    let destination: BackendHandle = Arc::new(LocalBackend::new("destination", to).or_raise(|| ErrorKind::Storage)?);
    Ok(match dry_run {
        true => Box::new(StorageTransfer::new(source, Arc::new(ReadOnlyBackend::new(destination))).without_verify()),
        false => Box::new(StorageTransfer::new(source, destination)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["sfs", "scan", "--dry-run"], true)]
    #[case(&["sfs", "push", "--dry-run"], true)]
    #[case(&["sfs", "push", "--to", "/mnt/backup", "--dry-run"], true)]
    #[case(&["sfs", "pull", "--dry-run"], true)]
    #[case(&["sfs", "scan"], false)]
    #[case(&["sfs", "push"], false)]
    #[case(&["sfs", "pull"], false)]
    #[case(&["sfs", "index"], false)]
    #[case(&["sfs", "-v", "status"], false)]
    fn test_dry_run_leaves_cache_alone(#[case] args: &[&str], #[case] dry_run: bool) {
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.command.is_dry_run(), dry_run);
    }
}
