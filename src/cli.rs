use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "batchmq-bridge", about)]
pub struct Cli {
    /// Override `BATCHMQ_LOGGING__LEVEL` (tracing filter directive, e.g. "debug").
    #[arg(long)]
    pub log_level: Option<String>,

    /// Comma-separated queue names, overriding `BATCHMQ_BROKER__QUEUES`.
    #[arg(long)]
    pub queues: Option<String>,

    /// Tokio worker threads.
    #[arg(long, default_value_t = default_workers())]
    pub workers: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}
