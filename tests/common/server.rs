//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own library and data
//! directory. The feed is rebuilt from the library before the server
//! starts accepting requests.

use super::constants::*;
use super::fixtures::create_test_library;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use whatsnew_server::background_jobs::jobs::FeedRebuildJob;
use whatsnew_server::background_jobs::{create_scheduler, JobContext};
use whatsnew_server::config::WhatsNewSettings;
use whatsnew_server::library::{InMemoryLibrary, LibraryHost};
use whatsnew_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use whatsnew_server::whatsnew::{
    Classifier, NotificationStore, RebuildTrigger, ReadStateTracker, RefreshCoordinator,
    SnapshotFile, StoreSettings, WhatsNewService,
};

/// Test server instance with an isolated library and data directory
///
/// When dropped, the server, its scheduler and its event worker shut down
/// and the data directory is removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Host library, for publishing changes from tests
    pub library: Arc<InMemoryLibrary>,

    /// Feed service, for direct inspection
    pub whatsnew: Arc<WhatsNewService>,

    pub data_dir: TempDir,

    shutdown_token: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if port binding fails, the initial rebuild fails or the server
    /// doesn't become ready within timeout.
    pub async fn spawn() -> Self {
        let data_dir = TempDir::new().expect("Failed to create data dir");
        let settings = WhatsNewSettings::default();

        let library = Arc::new(InMemoryLibrary::new(create_test_library()));
        let host: Arc<dyn LibraryHost> = library.clone();

        let store = Arc::new(NotificationStore::open(
            SnapshotFile::new(data_dir.path().join("notifications.json")),
            Classifier::new(host.clone(), &settings.classifier_settings()),
            host.clone(),
            StoreSettings {
                limit_per_category: settings.limit_per_category,
                lock_timeout: Duration::from_secs(2),
            },
        ));
        let read_state =
            ReadStateTracker::new(SnapshotFile::new(data_dir.path().join("last_seen.json")));
        let whatsnew = Arc::new(WhatsNewService::new(store.clone(), read_state, host));

        let shutdown_token = CancellationToken::new();
        store
            .rebuild_from_library(&shutdown_token)
            .await
            .expect("Initial rebuild failed");
        whatsnew.spawn_event_worker(shutdown_token.child_token());

        let (_hook_sender, hook_receiver) = tokio::sync::mpsc::channel(10);
        let job_context = JobContext::new(
            shutdown_token.child_token(),
            whatsnew.clone(),
            Arc::new(settings.clone()),
        );
        let (mut scheduler, scheduler_handle) =
            create_scheduler(hook_receiver, shutdown_token.clone(), job_context);
        scheduler.register_job(Arc::new(FeedRebuildJob::new())).await;
        tokio::spawn(async move { scheduler.run().await });

        let trigger: Arc<dyn RebuildTrigger> = Arc::new(scheduler_handle.clone());
        let refresh = Arc::new(RefreshCoordinator::new(
            trigger,
            settings.refresh_cooldown(),
        ));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            metrics_port: 0,
        };
        let app = make_app(
            config,
            whatsnew.clone(),
            refresh,
            library.clone(),
            Some(scheduler_handle),
        );

        let server_shutdown = shutdown_token.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            library,
            whatsnew,
            data_dir,
            shutdown_token,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the / endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
