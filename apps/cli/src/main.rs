//! Camarim POS operator console.
//!
//! Thin consumer of the library crates: every command initializes the
//! tiered store (or the backup service) and formats the result. Nothing
//! here touches storage or the cloud directly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use tracing::debug;

use camarim_backup::{BackupConfig, BackupService, HttpBackupClient};
use camarim_store::{
    Backend, FallbackStore, FileKv, MigrationOutcome, StoreConfig, TieredStore,
};

// =============================================================================
// Command Line Interface
// =============================================================================

#[derive(Parser)]
#[command(author, version, about = "Camarim POS storage and backup console")]
struct Cli {
    /// Increases logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (defaults to the platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Backup config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show which backend is active and what it holds
    Status,
    /// Run the opportunistic fallback-to-structured migration
    Migrate,
    /// Archive the fallback blob and clear it (after migration)
    Cleanup,
    /// Cloud backup operations
    Backup {
        #[command(subcommand)]
        action: BackupCommand,
    },
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Upload the current data set as a new backup
    Now,
    /// List remote backups, newest first
    List,
    /// Restore a backup (the newest one unless --name is given)
    Restore {
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a remote backup by name
    Delete {
        name: String,
    },
}

// =============================================================================
// Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("{level},sqlx=warn")),
        )
        .init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    debug!(data_dir = %data_dir.display(), "Using data directory");

    match cli.command {
        Command::Status => status(&data_dir).await,
        Command::Migrate => migrate(&data_dir).await,
        Command::Cleanup => cleanup(&data_dir).await,
        Command::Backup { action } => backup(&data_dir, cli.config, action).await,
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn status(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir).await?;
    let data = store.load().await;

    let backend = store
        .backend()
        .map(|b| b.to_string())
        .unwrap_or_else(|| "uninitialized".to_string());

    println!("backend:   {backend}");
    println!("products:  {}", data.products.len());
    println!("sales:     {}", data.sales.len());
    println!("settings:  {} entries", data.settings.len());
    println!(
        "counters:  lastProductId={} lastSaleId={}",
        data.settings.last_product_id(),
        data.settings.last_sale_id()
    );

    if store.backend() == Some(Backend::Structured) {
        if let Some(structured) = store.structured() {
            let healthy = structured.health_check().await;
            println!("sqlite:    {}", if healthy { "healthy" } else { "unreachable" });
            if let Ok((total, applied)) = structured.migration_status().await {
                println!("schema:    {applied}/{total} migrations applied");
            }
        }
    }

    Ok(())
}

async fn migrate(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir).await?;

    match store.migrate().await? {
        MigrationOutcome::Migrated { products, sales } => {
            println!("migrated {products} products and {sales} sales into the structured store");
        }
        MigrationOutcome::SkippedStructuredNotEmpty => {
            println!("structured store already holds data; nothing migrated");
        }
        MigrationOutcome::SkippedEmptyFallback => {
            println!("fallback store holds no products; nothing to migrate");
        }
        MigrationOutcome::StructuredUnavailable => {
            println!("structured store unavailable; running fallback-only");
        }
    }

    Ok(())
}

async fn cleanup(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir).await?;
    store
        .archive_and_clear()
        .await
        .context("cleanup refused")?;
    println!("fallback blob archived and cleared");
    Ok(())
}

async fn backup(data_dir: &Path, config_path: Option<PathBuf>, action: BackupCommand) -> Result<()> {
    let config_path = match config_path {
        Some(path) => path,
        None => BackupConfig::default_path().context("cannot determine config directory")?,
    };
    let config = BackupConfig::load_or_default(&config_path);

    let client = HttpBackupClient::new(&config).context("backup client unavailable")?;
    let service = BackupService::new(client, &config);

    match action {
        BackupCommand::Now => {
            let store = open_store(data_dir).await?;
            let uploaded = service.backup_now(&store).await?;
            println!("uploaded {} ({} bytes)", uploaded.name, uploaded.size);
        }
        BackupCommand::List => {
            let backups = service.list().await?;
            if backups.is_empty() {
                println!("no backups found");
            }
            for file in backups {
                println!(
                    "{}  {:>10} bytes  {}",
                    file.created_at.format("%Y-%m-%d %H:%M:%S"),
                    file.size,
                    file.name
                );
            }
        }
        BackupCommand::Restore { name } => {
            let store = open_store(data_dir).await?;
            let report = match name {
                Some(name) => service.restore(&store, &name).await?,
                None => service.restore_latest(&store).await?,
            };
            println!(
                "restored {} ({} products, {} sales)",
                report.name, report.products, report.sales
            );
        }
        BackupCommand::Delete { name } => {
            service.delete(&name).await?;
            println!("deleted {name}");
        }
    }

    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

async fn open_store(data_dir: &Path) -> Result<TieredStore> {
    let kv = FileKv::new(data_dir.join("kv")).context("cannot open key-value directory")?;
    let fallback = FallbackStore::new(Box::new(kv));

    let mut store = TieredStore::new(fallback);
    let backend = store
        .init(StoreConfig::new(data_dir.join("camarim.db")))
        .await;
    debug!(%backend, "Store initialized");

    Ok(store)
}

fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "camarim", "camarim-pos")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .context("cannot determine platform data directory")
}
