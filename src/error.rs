use thiserror::Error;

/// Crate-wide result type.
pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    // =========
    // Config / startup
    // =========
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("missing configuration field: {0}")]
    MissingConfig(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // =========
    // Broker (RabbitMQ)
    // =========
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("broker connection torn down, caller must reconnect and restart: {0}")]
    BrokerDisconnected(String),

    // =========
    // Database
    // =========
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("table not found in target database: {0}")]
    UnknownTable(String),

    // =========
    // Metrics / Prometheus
    // =========
    #[error("prometheus registry error: {0}")]
    Prometheus(#[from] prometheus::Error),

    // =========
    // Batch model
    // =========
    #[error("shatter() requires a positive part count, got {0}")]
    InvalidShatterCount(i64),

    // =========
    // Misc
    // =========
    #[error("failed to spawn task: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("shutdown requested")]
    Shutdown,

    #[error("internal error: {0}")]
    Internal(String),
}
