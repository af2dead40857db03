//! Benchmark harness.
//!
//! The [`Harness`] drives one benchmark run as an explicit state machine:
//!
//! ```text
//! Idle -> OpeningInitial -> ConfirmingCursor -> ClosedAfterConfirm
//!      -> GeneratingWorkload -> ReopeningAtCursor -> Draining -> ReportingDone
//! ```
//!
//! Any state can fall into `Failed`. The stream source and the workload
//! generator are injected, so tests run the whole protocol against fakes.
//!
//! Every opened handle is closed before the harness leaves the state that
//! opened it, on success, failure, and abort alike. Close errors are logged
//! as warnings and never change the outcome.

use std::sync::Arc;

use thiserror::Error;

use crate::config::HarnessConfig;
use crate::drain::{BatchDrain, DrainEnd};
use crate::error::StreamError;
use crate::position::Position;
use crate::shutdown::ShutdownHandle;
use crate::throughput::{ThroughputReporter, ThroughputSample, ThroughputSummary};
use crate::traits::{StreamHandle, StreamSource, WorkloadGenerator, WorkloadReport};

/// Lifecycle state of a [`Harness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessState {
    Idle,
    OpeningInitial,
    ConfirmingCursor,
    ClosedAfterConfirm,
    GeneratingWorkload,
    ReopeningAtCursor,
    Draining,
    ReportingDone,
    Failed,
}

impl HarnessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HarnessState::ReportingDone | HarnessState::Failed)
    }
}

impl std::fmt::Display for HarnessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HarnessState::Idle => "idle",
            HarnessState::OpeningInitial => "opening initial stream",
            HarnessState::ConfirmingCursor => "confirming cursor",
            HarnessState::ClosedAfterConfirm => "closed after confirm",
            HarnessState::GeneratingWorkload => "generating workload",
            HarnessState::ReopeningAtCursor => "reopening at cursor",
            HarnessState::Draining => "draining",
            HarnessState::ReportingDone => "reporting done",
            HarnessState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A failed run: where it died, why, and how far the drain got.
#[derive(Debug, Error)]
#[error("run failed while {stage}")]
pub struct RunError {
    /// State the harness was in when the error occurred.
    pub stage: HarnessState,
    #[source]
    pub error: StreamError,
    /// Progress made before a mid-drain failure.
    pub partial: Option<ThroughputSummary>,
}

/// Result of the bootstrap read.
#[derive(Debug, Clone)]
pub struct CursorConfirmation {
    /// Position of the first record delivered; the resume point.
    pub position: Position,
    /// Report of the warm-up insert, if one ran.
    pub warmup: Option<WorkloadReport>,
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct BenchReport {
    pub confirmed_position: Position,
    pub warmup: Option<WorkloadReport>,
    pub workload: WorkloadReport,
    pub summary: ThroughputSummary,
    /// Most recent progress sample; the full stream goes to the progress callback.
    pub last_progress: Option<ThroughputSample>,
    pub drain_end: DrainEnd,
}

/// Called with every progress sample during the drain.
pub type ProgressCallback = Box<dyn FnMut(&ThroughputSample) + Send>;

struct DrainOutcome {
    summary: ThroughputSummary,
    last_progress: Option<ThroughputSample>,
    end: DrainEnd,
}

/// Orchestrates one benchmark run.
pub struct Harness {
    source: Arc<dyn StreamSource>,
    generator: Arc<dyn WorkloadGenerator>,
    config: HarnessConfig,
    state: HarnessState,
    history: Vec<HarnessState>,
    shutdown: ShutdownHandle,
    on_progress: Option<ProgressCallback>,
}

impl Harness {
    pub fn new(
        source: Arc<dyn StreamSource>,
        generator: Arc<dyn WorkloadGenerator>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            source,
            generator,
            config,
            state: HarnessState::Idle,
            history: vec![HarnessState::Idle],
            shutdown: ShutdownHandle::new(),
            on_progress: None,
        }
    }

    /// Abort the run when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Receive every progress sample as it is produced.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ThroughputSample) + Send + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[HarnessState] {
        &self.history
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run the whole protocol.
    pub async fn run(&mut self) -> Result<BenchReport, RunError> {
        let confirmation = self.confirm_cursor().await?;

        if let Err(e) = self.enter(HarnessState::GeneratingWorkload) {
            return Err(self.fail(e, None));
        }
        let workload = match self.generate(self.config.record_count).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(e, None)),
        };

        if let Err(e) = self.enter(HarnessState::ReopeningAtCursor) {
            return Err(self.fail(e, None));
        }
        let mut handle = match self.source.open(Some(&confirmation.position)).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(e, None)),
        };
        tracing::info!(
            source = %self.source.name(),
            position = %confirmation.position,
            "reopened at confirmed cursor"
        );

        if let Err(e) = self.enter(HarnessState::Draining) {
            self.close_quietly(handle).await;
            return Err(self.fail(e, None));
        }
        let outcome = self.drain(&mut *handle).await;
        self.close_quietly(handle).await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err((e, partial)) => return Err(self.fail(e, Some(partial))),
        };

        self.transition(HarnessState::ReportingDone);
        tracing::info!(
            total = outcome.summary.total,
            batches = outcome.summary.batches,
            elapsed_ms = outcome.summary.elapsed.as_millis() as u64,
            rate = ?outcome.summary.rate(),
            end = %outcome.end,
            "drain finished"
        );

        Ok(BenchReport {
            confirmed_position: confirmation.position,
            warmup: confirmation.warmup,
            workload,
            summary: outcome.summary,
            last_progress: outcome.last_progress,
            drain_end: outcome.end,
        })
    }

    /// Open the source from the start, read one record, and close again.
    ///
    /// The position of that record is where the benchmark drain resumes, so
    /// records that existed before the run are never counted. Leaves the
    /// harness in `ClosedAfterConfirm`.
    pub async fn confirm_cursor(&mut self) -> Result<CursorConfirmation, RunError> {
        if self.state != HarnessState::Idle {
            return Err(RunError {
                stage: self.state,
                error: StreamError::Configuration("harness has already started".to_string()),
                partial: None,
            });
        }
        if let Err(e) = self.config.validate() {
            return Err(self.fail(e, None));
        }

        if let Err(e) = self.enter(HarnessState::OpeningInitial) {
            return Err(self.fail(e, None));
        }
        let mut handle = match self.source.open(None).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(e, None)),
        };

        let confirmed = self.read_first_record(&mut *handle).await;
        self.close_quietly(handle).await;
        let confirmation = match confirmed {
            Ok(confirmation) => confirmation,
            Err(e) => return Err(self.fail(e, None)),
        };

        if let Err(e) = self.enter(HarnessState::ClosedAfterConfirm) {
            return Err(self.fail(e, None));
        }
        tracing::info!(
            source = %self.source.name(),
            position = %confirmation.position,
            "cursor confirmed"
        );
        Ok(confirmation)
    }

    async fn read_first_record(
        &mut self,
        handle: &mut dyn StreamHandle,
    ) -> Result<CursorConfirmation, StreamError> {
        self.enter(HarnessState::ConfirmingCursor)?;

        let warmup = match self.config.warmup_records {
            0 => None,
            n => Some(self.generate(n).await?),
        };

        let mut drain_config = self.config.drain.clone();
        drain_config.max_batch_size = 1;
        let mut drain =
            BatchDrain::new(handle, 1, drain_config).with_shutdown(self.shutdown.clone());
        let end = drain.drain_all(|_, _| {}).await?;

        match drain.last_position() {
            Some(position) => Ok(CursorConfirmation {
                position: position.clone(),
                warmup,
            }),
            None => Err(StreamError::NoConfirmedCursor(format!(
                "bootstrap read ended ({}) without delivering a record",
                end
            ))),
        }
    }

    /// Ask the generator for `count` records; a reported failure is an error.
    async fn generate(&self, count: u64) -> Result<WorkloadReport, StreamError> {
        tracing::info!(generator = %self.generator.name(), count, "generating workload");

        let report: Result<WorkloadReport, StreamError> = tokio::select! {
            biased;
            signal = self.shutdown.wait() => Err(StreamError::Aborted(format!(
                "received {} during workload generation",
                signal
            ))),
            report = self.generator.generate(count) => report,
        };
        let report = report?;

        if !report.success {
            let reason = match report.exit_code {
                Some(code) => format!("{} exited with status {}", self.generator.name(), code),
                None => format!("{} reported failure", self.generator.name()),
            };
            return Err(StreamError::WorkloadGenerationFailed {
                reason,
                output: report.output,
            });
        }

        tracing::info!(
            generator = %self.generator.name(),
            count,
            elapsed_ms = report.elapsed.as_millis() as u64,
            rate = ?report.rate(),
            "workload generated"
        );
        Ok(report)
    }

    async fn drain(
        &mut self,
        handle: &mut dyn StreamHandle,
    ) -> Result<DrainOutcome, (StreamError, ThroughputSummary)> {
        let source = self.source.name().to_string();
        let on_progress = &mut self.on_progress;
        let mut reporter = ThroughputReporter::new(self.config.report_interval());

        let mut drain = BatchDrain::new(handle, self.config.record_count, self.config.drain.clone())
            .with_shutdown(self.shutdown.clone());

        let result = drain
            .drain_all(|_, consumed| {
                if let Some(sample) = reporter.observe(consumed) {
                    tracing::info!(
                        source = %source,
                        count = sample.count,
                        elapsed_ms = sample.elapsed.as_millis() as u64,
                        rate = ?sample.rate(),
                        "drain progress"
                    );
                    if let Some(callback) = on_progress.as_mut() {
                        callback(&sample);
                    }
                }
            })
            .await;

        match result {
            Ok(end) => Ok(DrainOutcome {
                summary: reporter.summary(drain.consumed(), drain.batches(), true),
                last_progress: reporter.last_sample(),
                end,
            }),
            Err(e) => Err((e, reporter.summary(drain.consumed(), drain.batches(), false))),
        }
    }

    async fn close_quietly(&self, mut handle: Box<dyn StreamHandle>) {
        match handle.close().await {
            Ok(()) => tracing::debug!(source = %self.source.name(), "stream handle closed"),
            Err(e) => tracing::warn!(
                source = %self.source.name(),
                error = %e,
                "error closing stream handle"
            ),
        }
    }

    /// Move to `next` unless a shutdown has been requested.
    fn enter(&mut self, next: HarnessState) -> Result<(), StreamError> {
        if let Some(signal) = self.shutdown.signal() {
            return Err(StreamError::Aborted(format!(
                "received {} before {}",
                signal, next
            )));
        }
        self.transition(next);
        Ok(())
    }

    fn transition(&mut self, next: HarnessState) {
        tracing::info!(from = %self.state, to = %next, "harness state changed");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, error: StreamError, partial: Option<ThroughputSummary>) -> RunError {
        let stage = self.state;
        tracing::error!(stage = %stage, error = %error, "run failed");
        self.transition(HarnessState::Failed);
        RunError {
            stage,
            error,
            partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DrainConfig, IdlePolicy};
    use crate::sources::{MemoryLog, MemoryStreamSource};
    use crate::workloads::SyntheticWorkload;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    fn config(record_count: u64, batch: usize) -> HarnessConfig {
        HarnessConfig {
            record_count,
            warmup_records: 1,
            report_interval: None,
            drain: DrainConfig {
                max_batch_size: batch,
                idle_timeout_ms: Some(50),
                idle_policy: IdlePolicy::KeepWaiting,
            },
        }
    }

    fn memory_harness(log: &MemoryLog, config: HarnessConfig) -> Harness {
        let source = MemoryStreamSource::new("memory", log.clone())
            .with_idle_timeout(Duration::from_millis(20));
        let generator = SyntheticWorkload::new("synthetic", log.clone());
        Harness::new(Arc::new(source), Arc::new(generator), config)
    }

    /// Generator that reports a failed run.
    struct FailingGenerator;

    #[async_trait]
    impl WorkloadGenerator for FailingGenerator {
        async fn generate(&self, count: u64) -> crate::error::Result<WorkloadReport> {
            Ok(WorkloadReport {
                requested: count,
                elapsed: Duration::from_millis(3),
                output: "psql: could not connect to server".to_string(),
                exit_code: Some(2),
                success: false,
            })
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_run_walks_every_state() {
        let log = MemoryLog::new();
        let mut harness = memory_harness(&log, config(50, 10));

        let report = harness.run().await.unwrap();
        assert_eq!(report.summary.total, 50);
        assert_eq!(report.summary.batches, 5);
        assert!(report.summary.complete);
        assert_eq!(report.drain_end, DrainEnd::TargetReached);
        assert_eq!(report.confirmed_position, Position::from_u64(1));
        assert!(report.warmup.is_some());

        assert_eq!(
            harness.history(),
            &[
                HarnessState::Idle,
                HarnessState::OpeningInitial,
                HarnessState::ConfirmingCursor,
                HarnessState::ClosedAfterConfirm,
                HarnessState::GeneratingWorkload,
                HarnessState::ReopeningAtCursor,
                HarnessState::Draining,
                HarnessState::ReportingDone,
            ]
        );
        assert!(harness.state().is_terminal());
    }

    #[tokio::test]
    async fn test_confirm_cursor_is_standalone() {
        let log = MemoryLog::new();
        let mut harness = memory_harness(&log, config(10, 10));

        let confirmation = harness.confirm_cursor().await.unwrap();
        assert_eq!(confirmation.position, Position::from_u64(1));
        assert_eq!(confirmation.warmup.unwrap().requested, 1);
        assert_eq!(harness.state(), HarnessState::ClosedAfterConfirm);

        // A second bootstrap is refused.
        let err = harness.confirm_cursor().await.unwrap_err();
        assert!(matches!(err.error, StreamError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_confirm_without_warmup_and_empty_source() {
        let log = MemoryLog::new();
        let mut cfg = config(10, 10);
        cfg.warmup_records = 0;
        cfg.drain.idle_policy = IdlePolicy::CompleteAfter(2);
        let mut harness = memory_harness(&log, cfg);

        let err = harness.confirm_cursor().await.unwrap_err();
        assert_eq!(err.stage, HarnessState::ConfirmingCursor);
        assert!(matches!(err.error, StreamError::NoConfirmedCursor(_)));
        assert_eq!(harness.state(), HarnessState::Failed);
    }

    #[tokio::test]
    async fn test_generator_failure_stops_before_drain() {
        let log = MemoryLog::new();
        log.append(None, bytes::Bytes::from("existing"));
        let mut cfg = config(10, 10);
        cfg.warmup_records = 0;

        let source = MemoryStreamSource::new("memory", log.clone());
        let mut harness = Harness::new(Arc::new(source), Arc::new(FailingGenerator), cfg);

        let err = harness.run().await.unwrap_err();
        assert_eq!(err.stage, HarnessState::GeneratingWorkload);
        assert!(err.partial.is_none());
        assert!(err.error.to_string().contains("could not connect"));
        assert!(!harness.history().contains(&HarnessState::Draining));
        assert!(!harness.history().contains(&HarnessState::ReopeningAtCursor));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_at_idle() {
        let log = MemoryLog::new();
        let mut harness = memory_harness(&log, config(10, 0));

        let err = harness.run().await.unwrap_err();
        assert_eq!(err.stage, HarnessState::Idle);
        assert!(matches!(err.error, StreamError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_shutdown_before_run_aborts() {
        let log = MemoryLog::new();
        let shutdown = ShutdownHandle::new();
        shutdown.shutdown();
        let mut harness = memory_harness(&log, config(10, 10)).with_shutdown(shutdown);

        let err = harness.run().await.unwrap_err();
        assert_eq!(err.stage, HarnessState::Idle);
        assert!(matches!(err.error, StreamError::Aborted(_)));
    }

    #[tokio::test]
    async fn test_progress_callback_receives_samples() {
        let log = MemoryLog::new();
        let mut cfg = config(100, 10);
        cfg.report_interval = Some(25);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut harness = memory_harness(&log, cfg).on_progress(move |sample| {
            sink.lock().unwrap().push(sample.count);
        });

        let report = harness.run().await.unwrap();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![30, 50, 80, 100]);
        assert_eq!(report.last_progress.map(|s| s.count), Some(100));
    }

    #[test]
    fn test_run_error_display_names_stage() {
        let err = RunError {
            stage: HarnessState::Draining,
            error: StreamError::Read("upstream disconnect".to_string()),
            partial: None,
        };
        assert_eq!(err.to_string(), "run failed while draining");
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("upstream disconnect"));
    }
}
