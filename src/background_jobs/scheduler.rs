use super::context::JobContext;
use super::handle::{JobRunInfo, SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, HookEvent, JobError, ShutdownBehavior};
use crate::server::metrics;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on how long the loop sleeps without re-checking schedules.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Currently running jobs with their task handles (not shared, managed by scheduler loop)
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Next due instant of every interval job.
    next_runs: HashMap<String, Instant>,

    /// Receiver for hook events.
    hook_receiver: mpsc::Receiver<HookEvent>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(
        hook_receiver: mpsc::Receiver<HookEvent>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            next_runs: HashMap::new(),
            hook_receiver,
            command_receiver,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());

        let mut state = self.shared_state.write().await;
        if job.schedule().interval().is_some() {
            let delay = job.initial_delay();
            self.next_runs.insert(job_id.clone(), Instant::now() + delay);
            state.next_runs.insert(job_id.clone(), wall_clock_after(delay));
        }
        state.jobs.insert(job_id, job);
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        loop {
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(event) = self.hook_receiver.recv() => {
                    debug!("Received hook event: {}", event);
                    self.trigger_jobs_for_hook(event).await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let state = self.shared_state.read().await;
        if !state.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }

        if state.running_jobs.contains(job_id) {
            return Err(JobError::AlreadyRunning);
        }
        drop(state);

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    async fn time_until_next_scheduled_job(&self) -> Duration {
        let state = self.shared_state.read().await;
        let now = Instant::now();
        self.next_runs
            .iter()
            .filter(|(job_id, _)| !state.running_jobs.contains(*job_id))
            .map(|(_, next_run)| next_run.saturating_duration_since(now))
            .min()
            .map_or(IDLE_CHECK_INTERVAL, |d| d.min(IDLE_CHECK_INTERVAL))
    }

    /// Run all jobs that are due for scheduled execution.
    async fn run_due_jobs(&mut self) {
        let now = Instant::now();
        let due: Vec<String> = {
            let state = self.shared_state.read().await;
            self.next_runs
                .iter()
                .filter(|(job_id, next_run)| {
                    **next_run <= now && !state.running_jobs.contains(*job_id)
                })
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in due {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    /// Trigger all jobs that listen for a specific hook event.
    async fn trigger_jobs_for_hook(&mut self, event: HookEvent) {
        let to_trigger: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .jobs
                .iter()
                .filter(|(job_id, job)| {
                    if !job.schedule().listens_to(event) {
                        return false;
                    }
                    if state.running_jobs.contains(*job_id) {
                        debug!("Skipping hook trigger for already running job: {}", job_id);
                        return false;
                    }
                    true
                })
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in to_trigger {
            let trigger = format!("hook:{}", event);
            self.spawn_job(&job_id, &trigger).await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let job = {
            let mut state = self.shared_state.write().await;
            let job = match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            };
            state.running_jobs.insert(job_id.to_string());
            state.last_runs.insert(
                job_id.to_string(),
                JobRunInfo::started(Utc::now(), triggered_by),
            );
            // Push the next interval run out now so a long run cannot
            // cause a tight loop.
            if let Some(interval) = job.schedule().interval() {
                self.next_runs
                    .insert(job_id.to_string(), Instant::now() + interval);
                state
                    .next_runs
                    .insert(job_id.to_string(), wall_clock_after(interval));
            }
            job
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());
        let ctx = self.job_context.with_token(cancel_token);

        let job_id_owned = job_id.to_string();
        let shared_state = Arc::clone(&self.shared_state);

        let handle = tokio::spawn(async move {
            let start_time = std::time::Instant::now();
            let result = tokio::spawn(async move { job.execute(&ctx).await }).await;
            let elapsed = start_time.elapsed();

            let (status_label, error_msg) = match result {
                Ok(Ok(())) => {
                    info!("Job {} completed successfully in {:?}", job_id_owned, elapsed);
                    ("success", None)
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    ("cancelled", Some("Cancelled".to_string()))
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    ("failed", Some(e.to_string()))
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    ("panic", Some(format!("Task panic: {}", e)))
                }
            };

            metrics::record_background_job_execution(&job_id_owned, status_label, elapsed);

            let mut state = shared_state.write().await;
            state.running_jobs.remove(&job_id_owned);
            if let Some(run) = state.last_runs.get_mut(&job_id_owned) {
                run.finish(status_label, error_msg);
            }
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Clean up handles for completed jobs.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(&job_id);
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        let mut wait_jobs = Vec::new();
        {
            let state = self.shared_state.read().await;
            for (job_id, handle) in self.running_handles.drain() {
                let behavior = state
                    .jobs
                    .get(&job_id)
                    .map(|j| j.shutdown_behavior())
                    .unwrap_or_default();
                if behavior == ShutdownBehavior::Cancellable {
                    if let Some(token) = self.job_cancel_tokens.get(&job_id) {
                        debug!("Cancelling job: {}", job_id);
                        token.cancel();
                    }
                } else {
                    info!("Waiting for job {} to complete...", job_id);
                }
                wait_jobs.push((job_id, handle));
            }
        }

        for (job_id, handle) in wait_jobs {
            if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, handle)
                .await
                .is_err()
            {
                warn!("Job {} did not stop within the grace period", job_id);
            }
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

fn wall_clock_after(delay: Duration) -> chrono::DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default()
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    hook_receiver: mpsc::Receiver<HookEvent>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let scheduler = JobScheduler::new(
        hook_receiver,
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
    );
    let handle = SchedulerHandle::new(command_tx, shared_state);

    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::context::test_support::job_context;
    use crate::background_jobs::job::JobSchedule;
    use crate::library::LibraryFixture;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct TestJob {
        id: &'static str,
        schedule: JobSchedule,
        initial_delay: Duration,
        runs: mpsc::UnboundedSender<&'static str>,
        execution_count: Arc<AtomicUsize>,
        /// Keeps the job running until the token fires.
        block_until_cancelled: bool,
    }

    impl TestJob {
        fn new(
            id: &'static str,
            schedule: JobSchedule,
            runs: mpsc::UnboundedSender<&'static str>,
        ) -> Self {
            Self {
                id,
                schedule,
                initial_delay: Duration::ZERO,
                runs,
                execution_count: Arc::new(AtomicUsize::new(0)),
                block_until_cancelled: false,
            }
        }
    }

    #[async_trait]
    impl BackgroundJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A test job for unit tests"
        }

        fn schedule(&self) -> JobSchedule {
            self.schedule.clone()
        }

        fn initial_delay(&self) -> Duration {
            self.initial_delay
        }

        async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
            self.execution_count.fetch_add(1, Ordering::SeqCst);
            let _ = self.runs.send(self.id);
            if self.block_until_cancelled {
                ctx.cancellation_token.cancelled().await;
                return Err(JobError::Cancelled);
            }
            Ok(())
        }
    }

    struct Harness {
        scheduler: JobScheduler,
        handle: SchedulerHandle,
        hooks: mpsc::Sender<HookEvent>,
        shutdown: CancellationToken,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let (ctx, _lib) = job_context(&dir, LibraryFixture::default());
        let (hooks, hook_receiver) = mpsc::channel(10);
        let shutdown = CancellationToken::new();
        let (scheduler, handle) = create_scheduler(
            hook_receiver,
            shutdown.clone(),
            ctx.with_token(shutdown.child_token()),
        );
        Harness {
            scheduler,
            handle,
            hooks,
            shutdown,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_register_and_list_jobs() {
        let mut h = harness();
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(h.handle.list_jobs().await.is_empty());
        h.scheduler
            .register_job(Arc::new(TestJob::new(
                "job_b",
                JobSchedule::Hook(HookEvent::OnFeedEmpty),
                tx.clone(),
            )))
            .await;
        h.scheduler
            .register_job(Arc::new(TestJob::new(
                "job_a",
                JobSchedule::Interval(Duration::from_secs(60)),
                tx,
            )))
            .await;

        let jobs = h.handle.list_jobs().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "job_a");
        assert!(jobs[0].next_run_at.is_some());
        assert_eq!(jobs[1].id, "job_b");
        assert!(jobs[1].next_run_at.is_none());
        assert!(!jobs[1].is_running);
        assert!(jobs[1].last_run.is_none());

        assert!(h.handle.get_job("job_a").await.is_some());
        assert!(h.handle.get_job("nonexistent").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_job_waits_for_initial_delay() {
        let mut h = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut job = TestJob::new(
            "expiry",
            JobSchedule::Interval(Duration::from_secs(3600)),
            tx,
        );
        job.initial_delay = Duration::from_secs(300);
        let count = job.execution_count.clone();
        h.scheduler.register_job(Arc::new(job)).await;

        let shutdown = h.shutdown.clone();
        let started = Instant::now();
        let runner = tokio::spawn(async move {
            h.scheduler.run().await;
        });

        assert_eq!(rx.recv().await, Some("expiry"));
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert!(started.elapsed() < Duration::from_secs(3600));

        assert_eq!(rx.recv().await, Some("expiry"));
        assert!(started.elapsed() >= Duration::from_secs(3900));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        shutdown.cancel();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_hook_event_triggers_listening_jobs() {
        let mut h = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        h.scheduler
            .register_job(Arc::new(TestJob::new(
                "rebuild",
                JobSchedule::Hook(HookEvent::OnFeedEmpty),
                tx.clone(),
            )))
            .await;
        let mut sweep = TestJob::new("sweep", JobSchedule::Interval(Duration::from_secs(3600)), tx);
        sweep.initial_delay = Duration::from_secs(3600);
        h.scheduler.register_job(Arc::new(sweep)).await;

        let hooks = h.hooks.clone();
        let shutdown = h.shutdown.clone();
        let runner = tokio::spawn(async move {
            h.scheduler.run().await;
        });

        hooks.send(HookEvent::OnFeedEmpty).await.unwrap();
        assert_eq!(rx.recv().await, Some("rebuild"));
        assert!(rx.try_recv().is_err());

        shutdown.cancel();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_manual_trigger_and_already_running() {
        let mut h = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut job = TestJob::new("rebuild", JobSchedule::Hook(HookEvent::OnFeedEmpty), tx);
        job.block_until_cancelled = true;
        h.scheduler.register_job(Arc::new(job)).await;

        let handle = h.handle.clone();
        let shutdown = h.shutdown.clone();
        let runner = tokio::spawn(async move {
            h.scheduler.run().await;
        });

        assert_eq!(handle.trigger_job("missing").await, Err(JobError::NotFound));
        assert_eq!(handle.trigger_job("rebuild").await, Ok(()));
        assert_eq!(rx.recv().await, Some("rebuild"));
        assert!(handle.is_job_running("rebuild").await);
        assert_eq!(
            handle.trigger_job("rebuild").await,
            Err(JobError::AlreadyRunning)
        );

        // Shutdown cancels the blocked job.
        shutdown.cancel();
        runner.await.unwrap();
        let info = handle.get_job("rebuild").await.unwrap();
        assert!(!info.is_running);
        let last_run = info.last_run.unwrap();
        assert_eq!(last_run.status, "cancelled");
        assert_eq!(last_run.triggered_by, "manual");
    }
}
