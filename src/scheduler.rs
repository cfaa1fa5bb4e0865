//! Training Scheduler
//!
//! Periodically runs the pipeline and appends the new part of each forecast
//! to the results store.

use crate::pipeline::{IncrementalWriter, Pipeline, PipelineError, PipelineStage, TrainOutcome};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scheduled run errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The run itself failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The blocking worker panicked or was cancelled
    #[error("training task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of the last scheduled run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunStatus {
    Success {
        history_len: usize,
        written: usize,
    },
    Failed {
        stage: PipelineStage,
        code: String,
        retriable: bool,
        error: String,
    },
}

/// Snapshot of the scheduler for health reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleStatus {
    pub running: bool,
    pub interval_minutes: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: Option<RunStatus>,
    pub next_run: Option<DateTime<Utc>>,
    pub runs: u64,
    pub rows_written: u64,
    /// Consecutive failures, reset by a success
    pub error_count: u32,
}

/// Runs pipeline + writer on a fixed interval
pub struct TrainingScheduler {
    pipeline: Arc<Pipeline>,
    writer: Arc<IncrementalWriter>,
    interval_minutes: u64,
    status: Arc<RwLock<ScheduleStatus>>,
    running: Arc<RwLock<bool>>,
}

impl TrainingScheduler {
    /// Create a new scheduler
    pub fn new(pipeline: Arc<Pipeline>, writer: Arc<IncrementalWriter>, interval_minutes: u64) -> Self {
        let interval_minutes = interval_minutes.max(1);
        Self {
            pipeline,
            writer,
            interval_minutes,
            status: Arc::new(RwLock::new(ScheduleStatus {
                running: false,
                interval_minutes,
                last_run: None,
                last_status: None,
                next_run: None,
                runs: 0,
                rows_written: 0,
                error_count: 0,
            })),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn status(&self) -> ScheduleStatus {
        let mut status = self.status.read().await.clone();
        status.running = *self.running.read().await;
        status
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run pipeline + writer once on a blocking worker and record the result
    pub async fn run_once(&self) -> Result<TrainOutcome, SchedulerError> {
        let pipeline = Arc::clone(&self.pipeline);
        let writer = Arc::clone(&self.writer);
        let now = Utc::now();

        let joined = tokio::task::spawn_blocking(move || pipeline.train(now, &writer)).await;
        let mut status = self.status.write().await;
        status.last_run = Some(now);
        status.runs += 1;
        status.next_run = Some(now + Duration::minutes(self.interval_minutes as i64));

        match joined {
            Ok(Ok(outcome)) => {
                status.rows_written += outcome.written as u64;
                status.error_count = 0;
                status.last_status = Some(RunStatus::Success {
                    history_len: outcome.history_len,
                    written: outcome.written,
                });
                Ok(outcome)
            }
            Ok(Err(e)) => {
                status.error_count += 1;
                status.last_status = Some(RunStatus::Failed {
                    stage: e.stage(),
                    code: e.code().to_string(),
                    retriable: e.is_retriable(),
                    error: e.to_string(),
                });
                Err(SchedulerError::Pipeline(e))
            }
            Err(e) => {
                status.error_count += 1;
                status.last_status = Some(RunStatus::Failed {
                    stage: PipelineStage::Failed,
                    code: "TASK_ABORTED".to_string(),
                    retriable: true,
                    error: e.to_string(),
                });
                Err(SchedulerError::Join(e))
            }
        }
    }

    /// Start the scheduler background task; the first run happens at once
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            *scheduler.running.write().await = true;
            tracing::info!(
                interval_minutes = scheduler.interval_minutes,
                "Training scheduler started"
            );

            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(scheduler.interval_minutes * 60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                if !*scheduler.running.read().await {
                    break;
                }

                match scheduler.run_once().await {
                    Ok(outcome) => {
                        tracing::info!(
                            history = outcome.history_len,
                            written = outcome.written,
                            "Scheduled training complete"
                        );
                    }
                    Err(SchedulerError::Pipeline(e)) if e.is_retriable() => {
                        tracing::warn!(stage = %e.stage(), "Scheduled training failed, will retry: {}", e);
                    }
                    Err(SchedulerError::Pipeline(e)) => {
                        tracing::error!(stage = %e.stage(), "Scheduled training failed (not retriable): {}", e);
                    }
                    Err(e) => {
                        tracing::error!("Scheduled training failed: {}", e);
                    }
                }
            }

            tracing::info!("Training scheduler stopped");
        })
    }

    /// Stop the scheduler
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}
