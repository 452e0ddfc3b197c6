mod broker;
mod cli;
mod config;
mod db;
mod decode;
mod error;
mod metrics_server;
mod model;
mod pipeline;
#[cfg(test)]
mod tests;

use broker::{BrokerMetrics, RabbitBatchConsumer};
use clap::Parser;
use cli::Cli;
use config::AppConfig;
use db::{Database, DbMetrics, PostgresDatabase};
use decode::{Decoder, JsonDecoder};
use error::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> AppResult<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.workers)
        .enable_all()
        .build()
        .map_err(|e| error::AppError::Internal(format!("failed to start Tokio runtime: {e}")))?;
    match runtime.block_on(run(cli)) {
        Ok(()) | Err(AppError::Shutdown) => Ok(()),
        Err(error) => Err(error),
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let mut cfg = AppConfig::load()?;
    if let Some(level) = &cli.log_level {
        cfg.logging.level = level.clone();
    }
    if let Some(queues) = &cli.queues {
        cfg.broker.queues = queues.clone();
    }

    init_tracing(&cfg.logging.level);

    let broker_metrics = Arc::new(BrokerMetrics::new()?);
    let db_metrics = Arc::new(DbMetrics::new()?);

    let db: Arc<dyn Database> =
        Arc::new(PostgresDatabase::connect(&cfg.db, Arc::clone(&db_metrics)).await?);
    let decoder: Arc<dyn Decoder> = Arc::new(JsonDecoder);

    let metrics_handle = if cfg.metrics.enabled {
        let metrics_cfg = cfg.metrics.clone();
        let broker_metrics = Arc::clone(&broker_metrics);
        let db_metrics = Arc::clone(&db_metrics);
        Some(tokio::spawn(async move {
            let gather = move || gather_metrics(&broker_metrics, &db_metrics);
            if let Err(error) = metrics_server::run(metrics_cfg, gather).await {
                tracing::error!(%error, "metrics server exited");
            }
        }))
    } else {
        None
    };

    let mut queue_tasks = Vec::new();
    for queue_name in cfg.broker.queue_names() {
        let broker_cfg = cfg.broker.clone();
        let broker_metrics = Arc::clone(&broker_metrics);
        let decoder = Arc::clone(&decoder);
        let db = Arc::clone(&db);

        queue_tasks.push(tokio::spawn(async move {
            loop {
                let mut consumer =
                    RabbitBatchConsumer::new(broker_cfg.clone(), Arc::clone(&broker_metrics));
                if let Err(error) = consumer.connect().await {
                    tracing::error!(queue = %queue_name, %error, "failed to connect to broker, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }

                match pipeline::run_queue(&consumer, &queue_name, Arc::clone(&decoder), Arc::clone(&db)).await {
                    Ok(()) => break,
                    Err(error) => {
                        tracing::error!(queue = %queue_name, %error, "queue pipeline failed, reconnecting");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }));
    }

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown requested");

    for task in queue_tasks {
        task.abort();
    }
    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    Err(AppError::Shutdown)
}

fn gather_metrics(broker_metrics: &BrokerMetrics, db_metrics: &DbMetrics) -> AppResult<String> {
    #[cfg(feature = "metrics")]
    {
        metrics_server::encode(&[broker_metrics.registry(), db_metrics.registry()])
    }
    #[cfg(not(feature = "metrics"))]
    {
        let _ = (broker_metrics, db_metrics);
        Ok(String::new())
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
