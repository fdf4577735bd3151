//! Render order executor.
//!
//! Consumes orders lane by lane (urgent first), drives the generation and
//! job records through their transitions, and keeps a heartbeat going so
//! the stale sweep can tell a slow render from a dead worker. Every record
//! write is status-guarded, so a cancel or a racing sweep is observed as a
//! refused transition rather than being overwritten.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use inkpost_models::JobId;
use inkpost_queue::{DeliveredOrder, ProgressChannel, QueueError, RenderOrder, WorkQueue};
use inkpost_store::{GenerationRepository, JobRepository, StoreError};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::notifier::Notifier;
use crate::renderer::{RenderRequest, RendererClient};
use crate::retry::FailureTracker;

/// Shared collaborators for order processing.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub jobs: JobRepository,
    pub generations: GenerationRepository,
    pub progress: ProgressChannel,
    pub renderer: RendererClient,
    pub notifier: Notifier,
}

impl WorkerContext {
    /// Build the context from the environment.
    pub fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let store = inkpost_store::RedisStore::from_env()?;
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        Ok(Self {
            config,
            jobs: JobRepository::new(store.clone()),
            generations: GenerationRepository::new(store),
            progress: ProgressChannel::new(&redis_url)?,
            renderer: RendererClient::from_env()?,
            notifier: Notifier::from_env(),
        })
    }
}

/// Order executor that processes render orders from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<WorkQueue>,
    ctx: Arc<WorkerContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new executor.
    pub fn new(config: WorkerConfig, queue: WorkQueue, ctx: WorkerContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Signal the executor to stop after in-flight orders finish.
    pub fn shutdown_handle(&self) -> tokio::sync::watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting executor '{}' with {} max concurrent orders",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically claim orders abandoned by crashed workers
        let queue_clone = Arc::clone(&self.queue);
        let ctx_clone = Arc::clone(&self.ctx);
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let claim_min_idle = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone.claim_pending(&consumer_name, claim_min_idle, 5).await {
                            Ok(orders) if !orders.is_empty() => {
                                info!("Claimed {} pending orders", orders.len());
                                for delivered in orders {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let Ok(permit) =
                                        semaphore_clone.clone().acquire_owned().await
                                    else {
                                        break;
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_order(ctx, queue, delivered).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending orders: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_orders() => {
                    if let Err(e) = result {
                        error!("Error consuming orders: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight orders to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_orders()).await;

        info!("Executor stopped");
        Ok(())
    }

    /// Consume and process orders from the queue.
    async fn consume_orders(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let orders = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        for delivered in orders {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let Ok(permit) = self.job_semaphore.clone().acquire_owned().await else {
                break;
            };

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_order(ctx, queue, delivered).await;
            });
        }

        Ok(())
    }

    async fn wait_for_orders(&self) {
        let _ = self
            .job_semaphore
            .acquire_many(self.config.max_concurrent_jobs as u32)
            .await;
    }

    /// Process one delivered order end to end.
    async fn execute_order(
        ctx: Arc<WorkerContext>,
        queue: Arc<WorkQueue>,
        delivered: DeliveredOrder,
    ) {
        let order = delivered.order.clone();
        let gen_id = order.generation_id.clone();
        let job_id = order.job_id.clone();

        // Take the generation. A refused transition means the order is
        // stale (scheduled, cancelled, or another worker won); drop it.
        match ctx.generations.transition(&gen_id, |g| g.start()).await {
            Ok(_) => {}
            Err(StoreError::Transition(_)) | Err(StoreError::Conflict { .. }) => {
                info!(generation_id = %gen_id, "Skipping stale order");
                queue.ack(delivered.lane, &delivered.message_id).await.ok();
                return;
            }
            Err(e) => {
                // Leave the message pending so the claim loop retries it.
                error!(generation_id = %gen_id, "Failed to start generation: {}", e);
                return;
            }
        }

        if let Err(e) = ctx.jobs.transition(&job_id, |j| j.mark_started()).await {
            warn!(job_id = %job_id, "Tracker not started: {}", e);
        }
        ctx.progress.started(&job_id).await.ok();

        info!(
            generation_id = %gen_id,
            job_id = %job_id,
            lane = %delivered.lane,
            attempt = order.attempt,
            "Processing render order"
        );

        let heartbeat = Self::spawn_heartbeat(
            Arc::clone(&ctx),
            job_id.clone(),
            ctx.config.heartbeat_interval,
        );

        ctx.jobs
            .transition(&job_id, |j| {
                j.record_progress(10, Some("Dispatched to renderer".into()))
            })
            .await
            .ok();
        ctx.progress
            .progress(&job_id, 10, Some("Dispatched to renderer".into()))
            .await
            .ok();

        let request = RenderRequest {
            generation_id: gen_id.clone(),
            post_id: order.post_id.clone(),
            video_kind: order.video_kind,
        };

        let render_result =
            tokio::time::timeout(ctx.config.job_timeout, ctx.renderer.render(&request)).await;

        heartbeat.abort();

        match render_result {
            Ok(Ok(output)) => {
                Self::finish_success(&ctx, &queue, &delivered, output).await;
            }
            Ok(Err(e)) => {
                Self::finish_failure(&ctx, &queue, &delivered, e.to_string()).await;
            }
            Err(_) => {
                let e = WorkerError::RenderTimeout(ctx.config.job_timeout.as_secs());
                Self::finish_failure(&ctx, &queue, &delivered, e.to_string()).await;
            }
        }
    }

    fn spawn_heartbeat(
        ctx: Arc<WorkerContext>,
        job_id: JobId,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut failures = FailureTracker::new(3);
            // The first tick fires immediately; skip it.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match ctx.jobs.transition(&job_id, |j| j.record_heartbeat()).await {
                    Ok(_) => failures.record_success(),
                    Err(e) => {
                        if failures.record_failure() {
                            warn!(job_id = %job_id, "Heartbeat failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    async fn finish_success(
        ctx: &WorkerContext,
        queue: &WorkQueue,
        delivered: &DeliveredOrder,
        output: crate::renderer::RenderOutput,
    ) {
        let order = &delivered.order;
        let gen_id = &order.generation_id;

        match ctx
            .generations
            .transition(gen_id, |g| {
                g.complete(&output.video_url, output.duration_seconds)
            })
            .await
        {
            Ok(_) => {
                if let Err(e) = ctx
                    .jobs
                    .transition(&order.job_id, |j| j.mark_completed())
                    .await
                {
                    warn!(job_id = %order.job_id, "Tracker not completed: {}", e);
                }

                ctx.progress
                    .completed(&order.job_id, Some(output.video_url.clone()))
                    .await
                    .ok();
                ctx.notifier.completed(order, &output.video_url).await;
                metrics::counter!("inkpost_worker_orders_total", "outcome" => "completed")
                    .increment(1);

                info!(
                    generation_id = %gen_id,
                    video_url = %output.video_url,
                    duration_seconds = output.duration_seconds,
                    "Render completed"
                );
            }
            // Cancelled (or failed by the sweep) while we were rendering;
            // the completion is refused and the terminal state stands.
            Err(StoreError::Transition(_)) | Err(StoreError::Conflict { .. }) => {
                warn!(generation_id = %gen_id, "Completion refused, record is already terminal");
            }
            Err(e) => {
                error!(generation_id = %gen_id, "Failed to persist completion: {}", e);
                // Leave the message pending for a re-delivery.
                return;
            }
        }

        queue.ack(delivered.lane, &delivered.message_id).await.ok();
    }

    async fn finish_failure(
        ctx: &WorkerContext,
        queue: &WorkQueue,
        delivered: &DeliveredOrder,
        message: String,
    ) {
        let order = &delivered.order;
        let gen_id = &order.generation_id;

        warn!(generation_id = %gen_id, "Render failed: {}", message);

        let failed = match ctx.generations.transition(gen_id, |g| g.fail(&message)).await {
            Ok(g) => Some(g),
            // Already terminal (cancelled mid-render); nothing to retry.
            Err(StoreError::Transition(_)) | Err(StoreError::Conflict { .. }) => None,
            Err(e) => {
                error!(generation_id = %gen_id, "Failed to persist failure: {}", e);
                None
            }
        };

        if let Err(e) = ctx
            .jobs
            .transition(&order.job_id, |j| j.mark_failed(&message))
            .await
        {
            warn!(job_id = %order.job_id, "Tracker not failed: {}", e);
        }
        ctx.progress.failed(&order.job_id, &message).await.ok();
        ctx.notifier.failed(order, &message).await;
        metrics::counter!("inkpost_worker_orders_total", "outcome" => "failed").increment(1);

        if failed.is_none() {
            queue.ack(delivered.lane, &delivered.message_id).await.ok();
            return;
        }

        // Two retry axes: each requeue is a fresh message carrying a bumped
        // `attempt`, while a crash-claimed redelivery reuses the message and
        // is counted in Redis. Cap on whichever is further along.
        let redeliveries = queue.get_retry_count(delivered).await.unwrap_or(0);
        let attempt = delivered.order.attempt.max(redeliveries);
        if attempt < queue.max_retries() {
            queue.increment_retry(delivered).await.ok();
            Self::requeue(ctx, queue, delivered).await;
        } else if let Err(e) = queue.dlq(delivered, &message).await {
            error!(generation_id = %gen_id, "Failed to dead-letter order: {}", e);
        }
    }

    /// Reset the records and put a fresh order on the lane.
    async fn requeue(ctx: &WorkerContext, queue: &WorkQueue, delivered: &DeliveredOrder) {
        let order = &delivered.order;
        let gen_id = &order.generation_id;

        let requeued = match ctx.generations.transition(gen_id, |g| g.retry()).await {
            Ok(g) => g,
            Err(e) => {
                warn!(generation_id = %gen_id, "Generation not requeued: {}", e);
                queue.ack(delivered.lane, &delivered.message_id).await.ok();
                return;
            }
        };

        if let Err(e) = ctx.jobs.transition(&order.job_id, |j| j.retry()).await {
            warn!(job_id = %order.job_id, "Tracker not reset for retry: {}", e);
        }

        let fresh = RenderOrder::for_generation(&requeued, requeued.render_job_id());
        match queue.enqueue(&fresh).await {
            Ok(_) => {
                info!(
                    generation_id = %gen_id,
                    retry_count = requeued.retry_count,
                    "Order requeued after failure"
                );
            }
            Err(QueueError::EnqueueFailed(reason)) if reason.contains("Duplicate") => {
                debug!(generation_id = %gen_id, "Retry order already on the lane");
            }
            Err(e) => {
                error!(generation_id = %gen_id, "Failed to requeue order: {}", e);
            }
        }

        queue.ack(delivered.lane, &delivered.message_id).await.ok();
    }
}
