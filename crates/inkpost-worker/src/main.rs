//! Render worker binary.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use inkpost_queue::WorkQueue;
use inkpost_worker::{JobExecutor, WorkerConfig, WorkerContext};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("inkpost=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting inkpost-worker");

    // Load configuration
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    // Create queue client
    let queue = match WorkQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create work queue: {}", e);
            std::process::exit(1);
        }
    };

    // Create worker context
    let ctx = match WorkerContext::from_env(config.clone()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create worker context: {}", e);
            std::process::exit(1);
        }
    };

    // Create executor
    let executor = JobExecutor::new(config, queue, ctx);

    // Propagate ctrl-c into a graceful shutdown
    let shutdown = executor.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown.send(true).ok();
    });

    // Run executor
    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
