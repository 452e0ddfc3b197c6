//! Prometheus `/metrics` HTTP endpoint, adapted from the teacher's
//! `prometheus/server.rs` axum handler.

use crate::config::MetricsConfig;
use crate::error::{AppError, AppResult};
use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;

type GatherFn = Arc<dyn Fn() -> AppResult<String> + Send + Sync>;

#[derive(Clone)]
struct AppState {
    gather: GatherFn,
}

/// Serves `cfg.path` on `cfg.bind_addr:cfg.port`, rendering whatever
/// `gather` returns (expected to be the text-exposition encoding of one or
/// more `prometheus::Registry`s). Runs until the process is terminated;
/// callers spawn this alongside the broker/db pipelines.
pub async fn run(cfg: MetricsConfig, gather: impl Fn() -> AppResult<String> + Send + Sync + 'static) -> AppResult<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.bind_addr, cfg.port)
        .parse()
        .map_err(|e| AppError::InvalidConfig(format!("invalid metrics bind address: {e}")))?;

    let state = AppState {
        gather: Arc::new(gather),
    };

    let app = Router::new()
        .route(&cfg.path, get(metrics_handler))
        .with_state(state);

    tracing::info!(bind_addr = %cfg.bind_addr, port = cfg.port, path = %cfg.path, "metrics server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Internal(format!("failed to bind metrics server: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Internal(format!("metrics server error: {e}")))?;

    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match (state.gather)() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(error) => {
            tracing::error!(%error, "failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to gather metrics\n").into_response()
        }
    }
}

#[cfg(feature = "metrics")]
pub fn encode(registries: &[&prometheus::Registry]) -> AppResult<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    for registry in registries {
        encoder.encode(&registry.gather(), &mut buffer)?;
    }
    Ok(String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))?)
}
