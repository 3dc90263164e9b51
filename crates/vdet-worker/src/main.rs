//! Video detection worker binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vdet_engine::HttpEngine;
use vdet_media::FfmpegCodec;
use vdet_queue::{Broker, BrokerConfig, MemoryBroker, RedisBroker};
use vdet_registry::{JobRegistry, MemoryRegistry, RegistryConfig};
use vdet_storage::{fs::FsAssetStore, AssetStore};
use vdet_worker::{JobExecutor, ProcessingContext, StaleSweeper, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    init_tracing();

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        warn!("Prometheus exporter not started: {}", e);
    }

    info!("Starting vdet-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store: Arc<dyn AssetStore> = {
        let root = std::env::var("ASSET_STORE_DIR").unwrap_or_else(|_| "/var/lib/vdet".to_string());
        match FsAssetStore::new(&root).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to open asset store at {}: {}", root, e);
                std::process::exit(1);
            }
        }
    };

    let registry: Arc<dyn JobRegistry> = Arc::new(MemoryRegistry::new(RegistryConfig::from_env()));

    let broker: Arc<dyn Broker> = match build_broker().await {
        Ok(broker) => broker,
        Err(e) => {
            error!("Failed to create broker: {}", e);
            std::process::exit(1);
        }
    };

    let engine = match HttpEngine::from_env() {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to create detection engine client: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = Arc::new(ProcessingContext {
        store,
        registry: Arc::clone(&registry),
        codec: Arc::new(FfmpegCodec::new()),
        engine: Arc::new(engine),
    });

    let executor = Arc::new(JobExecutor::new(
        config.clone(),
        Arc::clone(&broker),
        Arc::clone(&registry),
        ctx,
    ));

    let (sweeper_shutdown_tx, sweeper_shutdown_rx) = watch::channel(false);
    let sweeper = StaleSweeper::new(registry, broker, config.sweep_interval, config.stale_after);
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_shutdown_rx).await;
    });

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
        sweeper_shutdown_tx.send(true).ok();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    sweeper_handle.await.ok();

    info!("Worker shutdown complete");
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vdet=debug"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

async fn build_broker() -> Result<Arc<dyn Broker>, vdet_queue::QueueError> {
    let backend = std::env::var("QUEUE_BACKEND").unwrap_or_else(|_| "redis".to_string());
    if backend == "memory" {
        // Single-process deployments and local development.
        let config = BrokerConfig::from_env();
        return Ok(Arc::new(MemoryBroker::new(config.visibility_timeout)));
    }

    let broker = RedisBroker::from_env()?;
    broker.init().await?;
    Ok(Arc::new(broker))
}
