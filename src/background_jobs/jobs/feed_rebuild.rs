//! Full what's-new rebuild from the library.
//!
//! Runs when the feed starts empty and on manual refresh requests.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule},
};
use crate::whatsnew::StoreError;
use async_trait::async_trait;
use tracing::info;

pub const FEED_REBUILD_JOB_ID: &str = "whatsnew_rebuild";

#[derive(Default)]
pub struct FeedRebuildJob;

impl FeedRebuildJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackgroundJob for FeedRebuildJob {
    fn id(&self) -> &'static str {
        FEED_REBUILD_JOB_ID
    }

    fn name(&self) -> &'static str {
        "What's New Rebuild"
    }

    fn description(&self) -> &'static str {
        "Rebuild the what's-new feed from the newest library items"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Hook(HookEvent::OnFeedEmpty)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        match ctx
            .whatsnew
            .store()
            .rebuild_from_library(&ctx.cancellation_token)
            .await
        {
            Ok(retained) => {
                info!("What's-new rebuild retained {} entries", retained);
                Ok(())
            }
            Err(StoreError::Cancelled) => Err(JobError::Cancelled),
            Err(e) => Err(JobError::ExecutionFailed(e.to_string())),
        }
    }
}
