use std::sync::Arc;
use std::time::Duration;

use archdiffer_db::queue::PgTaskQueue;
use archdiffer_db::repositories::ComparisonTypeRepo;
use archdiffer_db::store::PgJobStore;
use archdiffer_pipeline::dispatcher::{RedispatchSweeper, TaskDispatcher};
use archdiffer_pipeline::plugin::PluginRegistry;
use archdiffer_pipeline::rpmdiff::{self, RpmdiffSettings};
use archdiffer_worker::config::WorkerConfig;
use archdiffer_worker::executor::{ExecutorSettings, JobExecutor};
use archdiffer_worker::pool::WorkerPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "archdiffer_worker=debug,archdiffer_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        concurrency = config.concurrency,
        work_dir = %config.work_dir.display(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = archdiffer_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    archdiffer_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    archdiffer_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Plugins ---
    let mut registry = PluginRegistry::new();
    registry.register(rpmdiff::plugin(&RpmdiffSettings {
        dnf_program: config.dnf_program.clone(),
        rpmdiff_program: config.rpmdiff_program.clone(),
    }));

    for kind in registry.kinds() {
        ComparisonTypeRepo::ensure(&pool, &kind)
            .await
            .expect("Failed to register comparison type");
    }
    let types = Arc::new(
        ComparisonTypeRepo::load_table(&pool)
            .await
            .expect("Failed to load comparison types"),
    );
    tracing::info!(kinds = ?registry.kinds(), "Comparator plugins registered");

    // --- Pipeline ---
    let store = Arc::new(PgJobStore::new(pool.clone(), types));
    let queue = Arc::new(PgTaskQueue::new(pool));

    let sweeper = RedispatchSweeper::new(store.clone(), TaskDispatcher::new(queue.clone()))
        .with_interval(config.redispatch_interval)
        .with_min_age(config.redispatch_min_age);

    let executor = Arc::new(JobExecutor::new(
        store,
        Arc::new(registry),
        ExecutorSettings::from_config(&config),
    ));
    let workers = WorkerPool::new(queue, executor, config.concurrency)
        .with_poll_interval(config.poll_interval)
        .with_lease(config.queue_lease);

    let cancel = CancellationToken::new();

    let sweeper_cancel = cancel.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_cancel).await;
    });

    let pool_cancel = cancel.clone();
    let pool_handle = tokio::spawn(async move {
        workers.run(pool_cancel).await;
    });

    shutdown_signal().await;
    cancel.cancel();

    // In-flight comparisons are bounded by the fetch and compare timeouts.
    let drain = config.fetch_timeout * 2 + config.compare_timeout + Duration::from_secs(5);
    if tokio::time::timeout(drain, pool_handle).await.is_err() {
        tracing::warn!("Worker pool did not drain in time; leases will expire");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
