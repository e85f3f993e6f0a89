//! # Seckill Worker
//!
//! Process wiring around [`OrderWorker`].
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tracing (RUST_LOG, default info)                                       │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  SeckillConfig::load(arg 1 or default path)                             │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Database::new ──► migrations                                           │
//! │  RedisStore::connect                                                    │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  OrderWorker::spawn ──► group bootstrap, pending replay / claim, intake  │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Ctrl+C / SIGTERM ──► worker shutdown ──► pool close                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use seckill_cache::{CacheStore, DistributedLock, IntentQueue, RedisStore};
use seckill_db::Database;
use seckill_order::{OrderMaterializer, OrderWorker, SeckillConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting seckill order worker...");

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = SeckillConfig::load(config_path)?;

    info!(
        consumer = %config.queue.consumer,
        stream = %config.queue.stream,
        group = %config.queue.group,
        database = %config.database.path.display(),
        "Configuration loaded"
    );

    let db = Database::new(config.db_config()).await?;
    let store: Arc<dyn CacheStore> = Arc::new(RedisStore::connect(&config.redis.url).await?);

    let queue = IntentQueue::new(
        store.clone(),
        config.queue.stream.clone(),
        config.queue.group.clone(),
        config.queue.consumer.clone(),
    );
    let lock = DistributedLock::new(store, config.lock.lease());
    let materializer = OrderMaterializer::new(db.clone(), lock);

    let worker = OrderWorker::spawn(queue, materializer, &config.queue).await?;
    info!("Order worker running");

    shutdown_signal().await;

    worker.shutdown().await?;
    db.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
