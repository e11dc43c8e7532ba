//! What's-new expiry sweep.
//!
//! Drops feed entries older than the retention window. The first run is
//! delayed after startup; later runs follow the configured interval.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::config::WhatsNewSettings;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::info;

pub const EXPIRY_SWEEP_JOB_ID: &str = "whatsnew_expiry";

pub struct ExpirySweepJob {
    retention: chrono::Duration,
    interval: Duration,
    first_run_delay: Duration,
}

impl ExpirySweepJob {
    pub fn from_settings(settings: &WhatsNewSettings) -> Self {
        Self {
            retention: settings.retention(),
            interval: settings.expiry_interval(),
            first_run_delay: settings.expiry_first_run_delay(),
        }
    }
}

#[async_trait]
impl BackgroundJob for ExpirySweepJob {
    fn id(&self) -> &'static str {
        EXPIRY_SWEEP_JOB_ID
    }

    fn name(&self) -> &'static str {
        "What's New Expiry"
    }

    fn description(&self) -> &'static str {
        "Remove what's-new entries older than the retention window"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    fn initial_delay(&self) -> Duration {
        self.first_run_delay
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // The sweep is a single atomic store operation; the next run catches up.
        ShutdownBehavior::Cancellable
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let cutoff = Utc::now() - self.retention;
        let removed = ctx
            .whatsnew
            .store()
            .expire_older_than(cutoff)
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        if removed > 0 {
            info!("Expired {} what's-new entries", removed);
        } else {
            info!("No what's-new entries to expire");
        }
        Ok(())
    }
}
