//! DriveMirror Daemon - one-shot sync passes and a polling service
//!
//! ```text
//! drivemirrord [--config PATH] full         # enumerate everything, then transfer
//! drivemirrord [--config PATH] incremental  # one delta page from the stored token
//! drivemirrord [--config PATH] scan         # mark local changes for upload
//! drivemirrord [--config PATH] run          # poll until SIGINT/SIGTERM
//! ```
//!
//! # Architecture
//!
//! The daemon wires the adapters (SQLite repository, Graph client, local
//! filesystem) into a `SyncEngine` and drives it according to the selected
//! mode. A single `CancellationToken`, cancelled on SIGTERM or SIGINT, is
//! passed to every engine call so an in-flight pass stops cleanly.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drivemirror_cache::{pool::DatabasePool, SqliteStateRepository};
use drivemirror_core::{
    config::{Config, LoggingConfig},
    ports::IStateRepository,
};
use drivemirror_graph::{GraphClient, GraphError, GraphRemoteClient};
use drivemirror_sync::{
    LocalFileAccessAdapter, SyncEngine, SyncError, SyncSummary, TransferSettings,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "drivemirrord", version, about = "Mirror a remote drive into a local folder")]
struct Cli {
    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Mode {
    /// Enumerate the whole remote drive, store the token, then transfer
    Full,
    /// Apply one delta page from the stored token, then transfer
    Incremental,
    /// Mark new and modified local files for upload
    Scan,
    /// Poll until stopped: full sync first, then scan + incremental cycles
    Run,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Full => "full",
            Mode::Incremental => "incremental",
            Mode::Scan => "scan",
            Mode::Run => "run",
        })
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Loads and validates the configuration
///
/// An explicit `--config` path must exist; the default path falls back to
/// built-in defaults when missing.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path()),
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let list = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::bail!("Invalid configuration: {list}");
    }

    config.sync.root = expand_home(&config.sync.root);
    config.database.path = expand_home(&config.database.path);
    Ok(config)
}

/// Replaces a leading `~` component with the home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the adapters and the engine for the lifetime of the process
struct DaemonService {
    config: Config,
    pool: DatabasePool,
    repository: Arc<SqliteStateRepository>,
    engine: SyncEngine,
    shutdown: CancellationToken,
}

impl DaemonService {
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let token_var = &config.remote.access_token_env;
        let access_token = std::env::var(token_var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("Access token not found in ${token_var}"))?;

        tokio::fs::create_dir_all(&config.sync.root)
            .await
            .with_context(|| format!("Failed to create sync root {}", config.sync.root.display()))?;

        let pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open database")?;
        let repository = Arc::new(SqliteStateRepository::new(pool.pool().clone()));

        let remote = Arc::new(GraphRemoteClient::new(GraphClient::with_base_url(
            access_token,
            config.remote.base_url.clone(),
        )));
        let local = Arc::new(LocalFileAccessAdapter::new(
            config.sync.root.clone(),
            config.sync.hash_on_scan,
        ));

        let engine = SyncEngine::new(
            remote,
            local,
            Arc::clone(&repository) as Arc<dyn IStateRepository>,
            TransferSettings::from_config(&config.transfer),
        );

        info!(
            root = %config.sync.root.display(),
            database = %config.database.path.display(),
            remote = %config.remote.base_url,
            "Daemon initialized"
        );

        Ok(Self {
            config,
            pool,
            repository,
            engine,
            shutdown,
        })
    }

    async fn run(&self, mode: Mode) -> Result<()> {
        let progress = self.spawn_progress_logger();

        let result = match mode {
            Mode::Full => self.finish(mode, self.engine.initial_full_sync(&self.shutdown).await),
            Mode::Incremental => {
                self.finish(mode, self.engine.incremental_sync(&self.shutdown).await)
            }
            Mode::Scan => self.finish(mode, self.engine.scan_local_files(&self.shutdown).await),
            Mode::Run => self.sync_loop().await,
        };

        if let Some(handle) = progress {
            handle.abort();
        }
        result
    }

    /// Logs a one-shot result; cancellation is a clean exit
    fn finish(&self, mode: Mode, result: Result<SyncSummary, SyncError>) -> Result<()> {
        match result {
            Ok(summary) => {
                log_summary(mode, &summary);
                Ok(())
            }
            Err(SyncError::Cancelled) => {
                info!(%mode, "Pass cancelled by shutdown signal");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("{mode} pass failed")),
        }
    }

    // ========================================================================
    // Periodic polling
    // ========================================================================

    /// Runs sync cycles every `sync.poll_interval` seconds until shutdown
    async fn sync_loop(&self) -> Result<()> {
        let poll_secs = self.config.sync.poll_interval;
        info!(poll_interval_secs = poll_secs, "Starting sync loop");

        loop {
            match self.cycle().await {
                Ok(summary) => log_summary(Mode::Run, &summary),
                Err(SyncError::Cancelled) => break,
                Err(e) => error!(error = %format!("{e:#}"), "Sync cycle failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(poll_secs)) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!("Sync loop terminated");
        Ok(())
    }

    /// One polling cycle
    ///
    /// Without a stored token this is a full sync. Otherwise local changes
    /// are marked first so the incremental pass uploads them. An expired
    /// token falls back to a full sync.
    async fn cycle(&self) -> Result<SyncSummary, SyncError> {
        let has_token = self
            .repository
            .get_resumption_token()
            .await
            .context("Failed to read resumption token")?
            .is_some();
        if !has_token {
            info!("No resumption token stored, running initial full sync");
            return self.engine.initial_full_sync(&self.shutdown).await;
        }

        let scanned = self.engine.scan_local_files(&self.shutdown).await?.scan;

        let mut summary = match self.engine.incremental_sync(&self.shutdown).await {
            Err(e) if requires_resync(&e) => {
                warn!(error = %format!("{e:#}"), "Resumption token rejected, running full sync");
                self.engine.initial_full_sync(&self.shutdown).await?
            }
            other => other?,
        };
        summary.scan = scanned;
        Ok(summary)
    }

    /// Logs progress events at debug level while a pass runs
    ///
    /// Only subscribes when debug output is enabled; per-item events
    /// query pending counts whenever someone is listening.
    fn spawn_progress_logger(&self) -> Option<JoinHandle<()>> {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return None;
        }

        let mut events = self.engine.subscribe_progress();
        let shutdown = self.shutdown.clone();
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => debug!(
                            phase = %event.phase,
                            operation = %event.operation,
                            processed = event.processed,
                            total = event.total,
                            pending_downloads = event.pending_downloads,
                            pending_uploads = event.pending_uploads,
                            "Sync progress"
                        ),
                        Err(RecvError::Lagged(skipped)) => debug!(skipped, "Progress log lagged"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Returns true when the stored token can no longer be used
fn requires_resync(err: &SyncError) -> bool {
    match err {
        SyncError::NoResumptionToken => true,
        SyncError::Other(e) => matches!(
            e.downcast_ref::<GraphError>(),
            Some(GraphError::ResyncRequired(_))
        ),
        _ => false,
    }
}

fn log_summary(mode: Mode, summary: &SyncSummary) {
    let (scanned, marked) = summary
        .scan
        .as_ref()
        .map_or((0, 0), |s| (s.processed, s.new_files + s.modified));

    info!(
        %mode,
        phase = %summary.phase,
        delta_pages = summary.delta_pages,
        delta_items = summary.delta_items,
        token_saved = summary.token_saved,
        has_more = summary.has_more,
        downloaded = summary.downloads.succeeded,
        download_failures = summary.downloads.failed,
        uploaded = summary.uploads.succeeded,
        upload_failures = summary.uploads.failed,
        scanned,
        marked,
        "Pass finished"
    );
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and cancels `token`
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    info!(mode = %cli.mode, "DriveMirror daemon starting");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let service = DaemonService::new(config, shutdown).await?;
    let result = service.run(cli.mode).await;
    service.close().await;

    match &result {
        Ok(()) => info!("DriveMirror daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "DriveMirror daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
