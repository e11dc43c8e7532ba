use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use whatsnew_server::background_jobs::jobs::{ExpirySweepJob, FeedRebuildJob};
use whatsnew_server::background_jobs::{create_scheduler, HookEvent, JobContext};
use whatsnew_server::config;
use whatsnew_server::library::{Authenticator, InMemoryLibrary, LibraryFixture, LibraryHost};
use whatsnew_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use whatsnew_server::whatsnew::{
    Classifier, NotificationStore, RebuildTrigger, ReadStateTracker, RefreshCoordinator,
    SnapshotFile, StoreSettings, WhatsNewService,
};

/// Bounded wait on the feed lock for every store operation.
const STORE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
/// Longer than the scheduler's own grace period for running jobs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(35);

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the feed and last-seen snapshots.
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub data_dir: Option<PathBuf>,

    /// JSON fixture describing the host library (folders, items, users).
    #[clap(long, value_parser = parse_path)]
    pub library_fixture: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            data_dir: args.data_dir.clone(),
            library_fixture: args.library_fixture.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;
    let settings = app_config.whatsnew.clone();

    info!("Configuration loaded:");
    info!("  data_dir: {:?}", app_config.data_dir);
    info!("  library_fixture: {:?}", app_config.library_fixture);
    info!("  port: {}", app_config.port);
    info!("  limit_per_category: {}", settings.limit_per_category);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let library = Arc::new(match &app_config.library_fixture {
        Some(path) => InMemoryLibrary::from_file(path)?,
        None => {
            warn!("No library fixture given, starting with an empty library");
            InMemoryLibrary::new(LibraryFixture::default())
        }
    });
    let host: Arc<dyn LibraryHost> = library.clone();
    let authenticator: Arc<dyn Authenticator> = library.clone();

    let store = Arc::new(NotificationStore::open(
        SnapshotFile::new(app_config.notifications_path()),
        Classifier::new(host.clone(), &settings.classifier_settings()),
        host.clone(),
        StoreSettings {
            limit_per_category: settings.limit_per_category,
            lock_timeout: STORE_LOCK_TIMEOUT,
        },
    ));
    let read_state = ReadStateTracker::new(SnapshotFile::new(app_config.last_seen_path()));
    let whatsnew = Arc::new(WhatsNewService::new(store.clone(), read_state, host));

    let shutdown_token = CancellationToken::new();
    let event_worker = whatsnew.spawn_event_worker(shutdown_token.child_token());

    // Set up background job scheduler
    let (hook_sender, hook_receiver) = tokio::sync::mpsc::channel(100);
    let job_context = JobContext::new(
        shutdown_token.child_token(),
        whatsnew.clone(),
        Arc::new(settings.clone()),
    );
    let (mut scheduler, scheduler_handle) =
        create_scheduler(hook_receiver, shutdown_token.clone(), job_context);

    scheduler
        .register_job(Arc::new(ExpirySweepJob::from_settings(&settings)))
        .await;
    scheduler.register_job(Arc::new(FeedRebuildJob::new())).await;

    if store.is_empty().await? {
        info!("Feed is empty, scheduling a rebuild from the library");
        hook_sender.send(HookEvent::OnFeedEmpty).await?;
    }

    let trigger: Arc<dyn RebuildTrigger> = Arc::new(scheduler_handle.clone());
    let refresh = Arc::new(RefreshCoordinator::new(
        trigger,
        settings.refresh_cooldown(),
    ));

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        metrics_port: app_config.metrics_port,
    };

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    // Run HTTP server until it fails or Ctrl+C arrives
    let result = tokio::select! {
        result = run_server(
            server_config,
            whatsnew,
            refresh,
            authenticator,
            Some(scheduler_handle),
        ) => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            Ok(())
        }
    };

    shutdown_token.cancel();
    drop(hook_sender);
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler_task)
        .await
        .is_err()
    {
        warn!("Scheduler did not stop within {:?}", SHUTDOWN_GRACE);
    }
    if tokio::time::timeout(Duration::from_secs(1), event_worker)
        .await
        .is_err()
    {
        warn!("Library event worker did not stop in time");
    }
    result
}
