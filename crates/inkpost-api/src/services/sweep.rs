//! Background sweep for scheduled and stale work.
//!
//! Runs periodically to:
//! - Release due `scheduled` generations back to their queue lane and hand
//!   the workers an order
//! - Fail `processing` jobs whose worker stopped heartbeating, and fail
//!   the generation they track
//!
//! Every transition goes through the same status compare-and-set as any
//! other writer, so concurrent API replicas race safely: one wins, the
//! rest observe a conflict and move on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use inkpost_models::{GenerationId, JobState, TrackableKind};
use inkpost_queue::{ProgressChannel, QueueError, RenderOrder, WorkQueue};
use inkpost_store::{GenerationRepository, JobRepository, StoreError};

use crate::metrics;

/// How long a processing job may go without a heartbeat.
pub const STALE_THRESHOLD_SECS: i64 = 120;

/// Grace period for jobs that started but never heartbeated.
pub const STALE_GRACE_PERIOD_SECS: i64 = 300;

/// Message recorded on jobs failed by the stale sweep.
const STALE_MESSAGE: &str =
    "Processing timed out. The worker may have crashed. Please try again.";

/// Max records handled per cycle.
const SWEEP_BATCH: usize = 100;

/// Scheduled/stale sweep service.
pub struct Sweeper {
    generations: GenerationRepository,
    jobs: JobRepository,
    queue: Arc<WorkQueue>,
    progress: Arc<ProgressChannel>,
    sweep_interval: Duration,
    enabled: bool,
}

impl Sweeper {
    /// Create a new sweeper.
    pub fn new(
        generations: GenerationRepository,
        jobs: JobRepository,
        queue: Arc<WorkQueue>,
        progress: Arc<ProgressChannel>,
        sweep_interval: Duration,
    ) -> Self {
        let enabled = std::env::var("ENABLE_SWEEP")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Self {
            generations,
            jobs,
            queue,
            progress,
            sweep_interval,
            enabled,
        }
    }

    /// Start the background sweep loop.
    ///
    /// Runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Sweep is disabled");
            return;
        }

        info!("Starting sweep (interval: {:?})", self.sweep_interval);

        let mut ticker = interval(self.sweep_interval);

        loop {
            ticker.tick().await;

            if let Err(e) = self.check_once().await {
                error!("Sweep error: {}", e);
            }
        }
    }

    /// Run a single sweep cycle. Returns (released, stale_failed).
    pub async fn check_once(&self) -> anyhow::Result<(u32, u32)> {
        let released = self.release_due_generations().await?;
        let stale_failed = self.fail_stale_jobs().await?;

        if released > 0 || stale_failed > 0 {
            info!(released, stale_failed, "Sweep cycle complete");
        }
        Ok((released, stale_failed))
    }

    /// Move due scheduled generations back to their lane.
    async fn release_due_generations(&self) -> anyhow::Result<u32> {
        let now = Utc::now();
        let due = self.generations.due_scheduled(now, SWEEP_BATCH).await?;
        let mut released = 0u32;

        for generation in due {
            let id = generation.id.clone();
            match self.generations.transition(&id, |g| g.make_due()).await {
                Ok(updated) => {
                    let order = RenderOrder::for_generation(&updated, updated.render_job_id());
                    match self.queue.enqueue(&order).await {
                        Ok(_) => {
                            released += 1;
                            info!(generation_id = %id, "Released scheduled generation");
                        }
                        Err(QueueError::EnqueueFailed(reason)) if reason.contains("Duplicate") => {
                            // An order for this hand-off already exists.
                            released += 1;
                        }
                        Err(e) => {
                            error!(generation_id = %id, "Failed to enqueue released order: {}", e);
                        }
                    }
                }
                // Another replica released (or the user cancelled) first.
                Err(StoreError::Conflict { .. }) | Err(StoreError::Transition(_)) => {}
                Err(e) => {
                    error!(generation_id = %id, "Failed to release scheduled generation: {}", e);
                }
            }
        }

        if released > 0 {
            metrics::record_sweep_released(released as u64);
        }
        Ok(released)
    }

    /// Fail processing jobs whose worker went quiet.
    async fn fail_stale_jobs(&self) -> anyhow::Result<u32> {
        let processing = self.jobs.list_in_state(JobState::Processing, SWEEP_BATCH).await?;
        let mut failed = 0u32;

        for job in processing {
            if !job.is_stale(STALE_THRESHOLD_SECS, STALE_GRACE_PERIOD_SECS) {
                continue;
            }

            warn!(
                job_id = %job.job_id,
                last_heartbeat = ?job.last_heartbeat,
                started_at = ?job.started_at,
                "Detected stale job (no heartbeat)"
            );

            match self
                .jobs
                .transition(&job.job_id, |j| j.mark_failed(STALE_MESSAGE))
                .await
            {
                Ok(updated) => {
                    failed += 1;
                    metrics::record_job_failed(updated.job_type.as_str());
                    self.progress.failed(&updated.job_id, STALE_MESSAGE).await.ok();

                    // Fail the generation the job tracks; it may have moved
                    // on already, which is fine.
                    if let Some(trackable) = &updated.trackable {
                        if trackable.kind == TrackableKind::Video {
                            let gen_id = GenerationId::from_string(&trackable.id);
                            if let Err(e) = self
                                .generations
                                .transition(&gen_id, |g| g.fail(STALE_MESSAGE))
                                .await
                            {
                                warn!(generation_id = %gen_id, "Generation not failed by sweep: {}", e);
                            }
                        }
                    }
                }
                Err(StoreError::Conflict { .. }) | Err(StoreError::Transition(_)) => {
                    // The worker finished (or another sweep won) in the meantime.
                }
                Err(e) => {
                    error!(job_id = %job.job_id, "Failed to fail stale job: {}", e);
                }
            }
        }

        if failed > 0 {
            metrics::record_sweep_stale_failed(failed as u64);
        }
        Ok(failed)
    }
}
