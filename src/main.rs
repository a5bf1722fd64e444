use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ramsync::config::{self, AppConfig, ConfigStore, TomlConfigStore};
use ramsync::context::AppContext;
use ramsync::core::transfer_engine::{TransferEngineType, TransferStatus, create_engine};
use ramsync::core::{
    Disk, DiskOutcome, ProgressTracker, SkipReason, StatusReport, SyncOrchestrator, SyncReport,
    is_usable_directory, resolve_backup_path, slug,
};
use ramsync::adapters;
use ramsync::logging::{self, LogFormat};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// How often running transfers are logged during `restore` and `backup`.
const PROGRESS_EVERY: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "ramsync")]
#[command(about = "Keep RAM disks backed up to a sync folder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ~/.config/ramsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Format of the log lines written to stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print status and reports on stdout as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the folder name used for a disk name
    Slug { name: String },
    /// Print the backup folder for a disk name
    Path { name: String },
    /// Print the sync root
    Root,
    /// Set the sync root (an existing directory, or "" to unset it)
    SetRoot { path: String },
    /// Show or change whether disks are recreated on launch
    AutoCreate { state: Option<Toggle> },
    /// List the remembered disks and where they back up to
    Status,
    /// Mirror every backup folder onto its disk
    Restore(SyncArgs),
    /// Mirror every disk onto its backup folder
    Backup(SyncArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Args, Serialize)]
struct SyncArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    transfer_engine: Option<TransferEngineType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    rsync_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    volumes_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    create_backup_folders: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(logging::LogConfig {
        format: cli.log_format,
        verbose: cli.verbose,
        quiet: cli.quiet,
    })?;

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = match &cli.command {
        Commands::Restore(args) | Commands::Backup(args) => {
            AppConfig::load(&config_path, Some(args))?
        }
        _ => AppConfig::load(&config_path, None::<&SyncArgs>)?,
    };
    let store = Arc::new(TomlConfigStore::new(&config_path, config.clone()));

    match &cli.command {
        Commands::Slug { name } => println!("{}", slug(name)),
        Commands::Path { name } => {
            let disk = Disk::new(name.as_str(), None, 0);
            match resolve_backup_path(&store.sync_root(), &disk) {
                Some(path) => println!("{}", path.display()),
                None => println!("not configured"),
            }
        }
        Commands::Root => match store.sync_root().as_str() {
            "" => println!("not configured"),
            root => println!("{root}"),
        },
        Commands::SetRoot { path } => set_root(&*store, path)?,
        Commands::AutoCreate { state } => {
            if let Some(state) = state {
                store.set_auto_create_disks(matches!(state, Toggle::On))?;
            }
            let enabled = store.auto_create_disks();
            println!("auto-create disks: {}", if enabled { "on" } else { "off" });
        }
        Commands::Status => print_status(&orchestrator(&config, store).status(), cli.json)?,
        Commands::Restore(_) => {
            let orchestrator = orchestrator(&config, store);
            let ticker = spawn_progress_log(orchestrator.context().progress.clone());
            let report = orchestrator.restore_all_and_wait().await;
            ticker.abort();
            print_report(&report, cli.json)?;
            check_report(&report)?;
        }
        Commands::Backup(_) => {
            let orchestrator = orchestrator(&config, store);
            let ticker = spawn_progress_log(orchestrator.context().progress.clone());
            let report = orchestrator.backup_all().await;
            ticker.abort();
            print_report(&report, cli.json)?;
            check_report(&report)?;
        }
    }

    Ok(())
}

fn orchestrator(config: &AppConfig, store: Arc<TomlConfigStore>) -> SyncOrchestrator {
    let engine = create_engine(config.transfer_engine, &config.rsync_path);
    let disks = adapters::get_provider(&config.disks);
    let ctx = AppContext::new(store, disks, engine).with_settings(config);
    SyncOrchestrator::new(ctx)
}

fn set_root(store: &dyn ConfigStore, path: &str) -> Result<()> {
    if !path.is_empty() && !is_usable_directory(std::path::Path::new(path)) {
        bail!("{path} is not a directory");
    }

    store
        .set_sync_root(path)
        .context("Failed to save sync folder")?;

    if path.is_empty() {
        println!("Sync folder cleared");
    } else {
        println!("Saved sync folder: {path}");
    }
    Ok(())
}

/// Log every running transfer until the returned task is aborted.
fn spawn_progress_log(tracker: ProgressTracker) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(PROGRESS_EVERY);
        // the first tick fires immediately
        ticks.tick().await;
        loop {
            ticks.tick().await;
            for transfer in tracker.snapshot().await {
                if let TransferStatus::InProgress {
                    percentage,
                    current_file,
                    ..
                } = &transfer.status
                {
                    info!(
                        disk = %transfer.disk,
                        direction = %transfer.direction,
                        percentage,
                        file = %current_file,
                        "Transfer progress"
                    );
                }
            }
        }
    })
}

fn print_status(status: &StatusReport, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(status).context("Failed to serialize status")?;
        println!("{out}");
        return Ok(());
    }

    println!(
        "sync root: {}",
        status.sync_root.as_deref().unwrap_or("not configured")
    );

    if status.disks.is_empty() {
        println!("no disks");
        return Ok(());
    }

    for disk in &status.disks {
        let mount = match &disk.mount {
            Some(path) if disk.mounted => path.display().to_string(),
            Some(path) => format!("{} (missing)", path.display()),
            None => "not mounted".to_string(),
        };
        let backup = match &disk.backup {
            Some(path) if disk.backup_present => path.display().to_string(),
            Some(path) => format!("{} (missing)", path.display()),
            None => "not configured".to_string(),
        };
        println!(
            "{} - {}\n  mount:  {}\n  backup: {}",
            disk.name,
            format_bytes(disk.capacity),
            mount,
            backup
        );
    }

    Ok(())
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        println!("{out}");
        return Ok(());
    }

    if report.disks.is_empty() {
        println!("no disks");
    }

    for entry in &report.disks {
        match &entry.outcome {
            DiskOutcome::Skipped {
                reason: SkipReason::NotConfigured,
            } => println!("{}: skipped, no sync folder configured", entry.disk),
            DiskOutcome::Skipped {
                reason: SkipReason::NoBackupFolder,
            } => println!("{}: skipped, no backup folder", entry.disk),
            DiskOutcome::Failed { error } => println!("{}: {}", entry.disk, error),
            DiskOutcome::Finished { response } if response.is_success() => {
                println!("{}: {} complete", entry.disk, report.direction)
            }
            DiskOutcome::Finished { response } => println!(
                "{}: {} exited with status {}\n{}",
                entry.disk,
                report.direction,
                response.termination_status,
                response.error.trim_end()
            ),
        }
    }

    Ok(())
}

fn check_report(report: &SyncReport) -> Result<()> {
    let failures = report.failures();
    if !failures.is_empty() {
        bail!("{} of {} disk(s) failed", failures.len(), report.disks.len());
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
