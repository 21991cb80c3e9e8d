//! Refresh job orchestrator.
//!
//! Runs screening cycles as cancellable background tasks, one status record
//! per job kind (manual / auto). The worker owns its status record; the only
//! externally writable piece of state is the atomic cancellation flag, which
//! the worker re-checks at fixed checkpoints (cycle start, before each
//! market, before each symbol inside the pipeline, before final
//! aggregation). A cancelled cycle publishes no partial results.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::screener::{ScreenOutcome, ScreeningPipeline, ScreeningResult};

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag shared between a worker and its canceller.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the worker's next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consumed by the worker when it honors the request.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Job Status
// ============================================================================

/// Job kinds, each with its own status record and at most one running
/// worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Manual,
    Auto,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Stopped,
    Error,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Pollable status record for one job kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshJobStatus {
    pub state: JobState,
    /// 0-100, monotonically non-decreasing within one run
    pub progress: u8,
    /// Human-readable phase description, overwritten at each transition
    pub message: String,
    /// Replaced wholesale on completion; empty otherwise
    pub results: Vec<ScreeningResult>,
    /// Terminal cause when `state` is `error`
    pub error: Option<String>,
}

impl Default for RefreshJobStatus {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            progress: 0,
            message: String::new(),
            results: Vec::new(),
            error: None,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// One job kind's shared state: the status record, the cancel flag and the
/// single-worker guard.
#[derive(Clone)]
struct Job {
    status: Arc<RwLock<RefreshJobStatus>>,
    cancel: CancelToken,
    running: Arc<AtomicBool>,
}

impl Job {
    fn new() -> Self {
        Self {
            status: Arc::new(RwLock::new(RefreshJobStatus::default())),
            cancel: CancelToken::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Drives manual and automatic screening cycles.
pub struct RefreshOrchestrator {
    pipeline: Arc<ScreeningPipeline>,
    manual: Job,
    auto: Job,
    auto_enabled: Arc<AtomicBool>,
    auto_loop_active: Arc<AtomicBool>,
    auto_interval_secs: Arc<AtomicU64>,
}

impl RefreshOrchestrator {
    pub fn new(pipeline: Arc<ScreeningPipeline>, auto_interval_secs: u64) -> Self {
        Self {
            pipeline,
            manual: Job::new(),
            auto: Job::new(),
            auto_enabled: Arc::new(AtomicBool::new(false)),
            auto_loop_active: Arc::new(AtomicBool::new(false)),
            auto_interval_secs: Arc::new(AtomicU64::new(auto_interval_secs.max(1))),
        }
    }

    /// Start a manual screening cycle in the background.
    ///
    /// Fails when a manual cycle is already running.
    pub fn start_manual_refresh(&self) -> Result<()> {
        if self
            .manual
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            anyhow::bail!("a manual refresh is already running");
        }

        info!("starting manual refresh cycle");
        let pipeline = Arc::clone(&self.pipeline);
        let job = self.manual.clone();
        tokio::spawn(async move {
            Self::run_cycle(pipeline, &job).await;
            job.running.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    /// Request cancellation of the manual job. Cooperative: the worker
    /// honors it at its next checkpoint, so the stop latency is bounded by
    /// the current symbol's fetch-and-evaluate step.
    pub fn stop_manual_refresh(&self) {
        info!("manual refresh stop requested");
        self.manual.cancel.cancel();
    }

    /// Request cancellation of the in-flight auto cycle (the loop itself is
    /// gated by `set_auto_refresh`).
    pub fn stop_auto_cycle(&self) {
        info!("auto cycle stop requested");
        self.auto.cancel.cancel();
    }

    /// Enable or disable the auto-refresh loop, optionally changing the
    /// inter-cycle sleep. Disabling prevents the next iteration from
    /// starting but never interrupts one in progress.
    pub fn set_auto_refresh(self: &Arc<Self>, enabled: bool, interval_secs: Option<u64>) {
        if let Some(secs) = interval_secs {
            self.auto_interval_secs.store(secs.max(1), Ordering::SeqCst);
        }
        self.auto_enabled.store(enabled, Ordering::SeqCst);

        if enabled
            && self
                .auto_loop_active
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    this.auto_loop().await;
                    this.auto_loop_active.store(false, Ordering::SeqCst);
                    // A re-enable issued while the loop was exiting loses the
                    // spawn race (the active flag was still set), so the
                    // exiting task itself reclaims the flag and keeps going.
                    // Exit only once the two flags agree.
                    if this.auto_enabled.load(Ordering::SeqCst)
                        && this
                            .auto_loop_active
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                    {
                        continue;
                    }
                    break;
                }
            });
        }

        info!(
            enabled,
            interval_secs = self.auto_interval_secs.load(Ordering::SeqCst),
            "auto refresh configured"
        );
    }

    pub fn auto_refresh_enabled(&self) -> bool {
        self.auto_enabled.load(Ordering::SeqCst)
    }

    pub fn auto_interval_secs(&self) -> u64 {
        self.auto_interval_secs.load(Ordering::SeqCst)
    }

    /// Snapshot of a job's status record.
    pub async fn get_job_status(&self, kind: JobKind) -> RefreshJobStatus {
        let job = match kind {
            JobKind::Manual => &self.manual,
            JobKind::Auto => &self.auto,
        };
        job.status.read().await.clone()
    }

    async fn auto_loop(&self) {
        info!("auto refresh loop started");
        while self.auto_enabled.load(Ordering::SeqCst) {
            if self
                .auto
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                Self::run_cycle(Arc::clone(&self.pipeline), &self.auto).await;
                self.auto.running.store(false, Ordering::SeqCst);
            }

            let interval = self.auto_interval_secs.load(Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(interval)).await;
            // enabled flag re-checked promptly after the sleep resumes
        }
        info!("auto refresh loop stopped");
    }

    /// One idle -> running -> terminal cycle over one job's state.
    async fn run_cycle(pipeline: Arc<ScreeningPipeline>, job: &Job) {
        {
            let mut status = job.status.write().await;
            status.state = JobState::Running;
            status.progress = 0;
            status.message = "starting refresh cycle".to_string();
            status.results.clear();
            status.error = None;
        }

        // checkpoint: a stop issued before the cycle started is honored
        // before any symbol is touched
        if job.cancel.is_cancelled() {
            Self::finish_stopped(job).await;
            return;
        }

        Self::set_phase(job, 10, "fetching market data".to_string()).await;

        let markets = pipeline.markets().to_vec();
        let total = markets.len().max(1);
        let mut all: Vec<ScreeningResult> = Vec::new();

        for (index, market) in markets.iter().enumerate() {
            // checkpoint before each market
            if job.cancel.is_cancelled() {
                Self::finish_stopped(job).await;
                return;
            }

            let progress = 10 + (85 * index / total) as u8;
            Self::set_phase(
                job,
                progress,
                format!("screening {}", market.display_name()),
            )
            .await;

            match pipeline.screen_market(*market, &job.cancel).await {
                Ok(ScreenOutcome::Completed(results)) => all.extend(results),
                Ok(ScreenOutcome::Cancelled) => {
                    Self::finish_stopped(job).await;
                    return;
                }
                Err(e) => {
                    Self::finish_error(job, e).await;
                    return;
                }
            }
        }

        // checkpoint before final aggregation
        if job.cancel.is_cancelled() {
            Self::finish_stopped(job).await;
            return;
        }

        let matches = all.len();
        {
            let mut status = job.status.write().await;
            status.state = JobState::Completed;
            status.progress = 100;
            status.message = if matches == 0 {
                "screening complete: no symbols matched".to_string()
            } else {
                format!("screening complete: {} symbols matched", matches)
            };
            status.results = all;
        }
        info!(matches, "refresh cycle completed");
    }

    async fn set_phase(job: &Job, progress: u8, message: String) {
        let mut status = job.status.write().await;
        // progress is monotone within a run
        status.progress = status.progress.max(progress);
        status.message = message;
    }

    async fn finish_stopped(job: &Job) {
        job.cancel.clear();
        let mut status = job.status.write().await;
        status.state = JobState::Stopped;
        status.message = "refresh stopped".to_string();
        status.results.clear();
        info!("refresh cycle stopped");
    }

    async fn finish_error(job: &Job, err: anyhow::Error) {
        error!(error = %err, "refresh cycle failed");
        let mut status = job.status.write().await;
        status.state = JobState::Error;
        status.message = "refresh failed".to_string();
        status.error = Some(err.to_string());
        status.results.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MarketDataGateway;
    use crate::screener::{PipelineConfig, SyntheticFundamentals};

    fn empty_pipeline() -> Arc<ScreeningPipeline> {
        // no providers: every market snapshot comes back empty, so a cycle
        // completes quickly without touching the network
        Arc::new(ScreeningPipeline::new(
            Arc::new(MarketDataGateway::new(Vec::new())),
            Arc::new(SyntheticFundamentals::new()),
            PipelineConfig::default(),
        ))
    }

    async fn wait_terminal(orchestrator: &RefreshOrchestrator, kind: JobKind) -> RefreshJobStatus {
        for _ in 0..200 {
            let status = orchestrator.get_job_status(kind).await;
            if status.state != JobState::Running && status.state != JobState::Idle {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        orchestrator.get_job_status(kind).await
    }

    #[tokio::test]
    async fn test_initial_status_is_idle() {
        let orchestrator = RefreshOrchestrator::new(empty_pipeline(), 60);
        let status = orchestrator.get_job_status(JobKind::Manual).await;
        assert_eq!(status.state, JobState::Idle);
        assert_eq!(status.progress, 0);
        assert!(status.results.is_empty());
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_manual_cycle_completes() {
        let orchestrator = RefreshOrchestrator::new(empty_pipeline(), 60);
        orchestrator.start_manual_refresh().unwrap();

        let status = wait_terminal(&orchestrator, JobKind::Manual).await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.progress, 100);
        assert!(status.results.is_empty());
        assert!(status.message.contains("no symbols matched"));
    }

    #[tokio::test]
    async fn test_stop_before_start_yields_stopped() {
        let orchestrator = RefreshOrchestrator::new(empty_pipeline(), 60);
        orchestrator.stop_manual_refresh();
        orchestrator.start_manual_refresh().unwrap();

        let status = wait_terminal(&orchestrator, JobKind::Manual).await;
        assert_eq!(status.state, JobState::Stopped);
        assert!(status.results.is_empty());
    }

    #[tokio::test]
    async fn test_stopped_flag_cleared_for_next_run() {
        let orchestrator = RefreshOrchestrator::new(empty_pipeline(), 60);
        orchestrator.stop_manual_refresh();
        orchestrator.start_manual_refresh().unwrap();
        let status = wait_terminal(&orchestrator, JobKind::Manual).await;
        assert_eq!(status.state, JobState::Stopped);

        // the honored flag does not poison the next cycle
        orchestrator.start_manual_refresh().unwrap();
        let status = wait_terminal(&orchestrator, JobKind::Manual).await;
        assert_eq!(status.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_job_kinds_have_independent_status() {
        let orchestrator = RefreshOrchestrator::new(empty_pipeline(), 60);
        orchestrator.start_manual_refresh().unwrap();
        wait_terminal(&orchestrator, JobKind::Manual).await;

        let auto = orchestrator.get_job_status(JobKind::Auto).await;
        assert_eq!(auto.state, JobState::Idle);
    }

    #[test]
    fn test_job_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobState::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(serde_json::to_string(&JobKind::Manual).unwrap(), "\"manual\"");
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.clear();
        assert!(!token.is_cancelled());
    }
}
