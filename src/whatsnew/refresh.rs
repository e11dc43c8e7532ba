//! Rate limiting for manual full rebuilds.

use crate::server::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);
pub const DEFAULT_REFRESH_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Starts a full feed rebuild somewhere else.
#[async_trait]
pub trait RebuildTrigger: Send + Sync {
    async fn trigger_rebuild(&self) -> anyhow::Result<()>;

    /// Whether a rebuild started by any path is still running.
    async fn is_rebuild_running(&self) -> bool;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("A refresh is being started, try again shortly")]
    Busy,

    #[error("A refresh was started recently, retry in {}s", retry_after.as_secs())]
    TooSoon { retry_after: Duration },
}

pub struct RefreshCoordinator {
    last_started: Mutex<Option<Instant>>,
    cooldown: Duration,
    lock_timeout: Duration,
    trigger: Arc<dyn RebuildTrigger>,
}

impl RefreshCoordinator {
    pub fn new(trigger: Arc<dyn RebuildTrigger>, cooldown: Duration) -> Self {
        Self {
            last_started: Mutex::new(None),
            cooldown,
            lock_timeout: DEFAULT_REFRESH_LOCK_TIMEOUT,
            trigger,
        }
    }

    /// Accept a refresh if none started within the cool-down and no
    /// rebuild is running.
    ///
    /// Never waits longer than the lock timeout. The rebuild itself runs in
    /// a spawned task.
    pub async fn try_start_refresh(&self) -> Result<(), RefreshError> {
        let mut last_started =
            match tokio::time::timeout(self.lock_timeout, self.last_started.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    metrics::record_refresh_request("busy");
                    return Err(RefreshError::Busy);
                }
            };

        let now = Instant::now();
        if let Some(previous) = *last_started {
            let elapsed = now.duration_since(previous);
            if elapsed < self.cooldown {
                metrics::record_refresh_request("too_soon");
                return Err(RefreshError::TooSoon {
                    retry_after: self.cooldown - elapsed,
                });
            }
        }
        // Not recorded as a start: the scheduler would reject the trigger.
        if self.trigger.is_rebuild_running().await {
            metrics::record_refresh_request("busy");
            return Err(RefreshError::Busy);
        }
        *last_started = Some(now);
        drop(last_started);

        metrics::record_refresh_request("accepted");
        info!("Manual feed refresh accepted");

        let trigger = self.trigger.clone();
        tokio::spawn(async move {
            if let Err(e) = trigger.trigger_rebuild().await {
                warn!("Failed to start feed rebuild: {:#}", e);
            }
        });
        Ok(())
    }
}
