//! Bulk insert engine metrics, mirroring [`crate::broker::metrics::BrokerMetrics`]'s
//! feature-gated `prometheus::Registry` pattern.

use crate::error::AppResult;

#[cfg(feature = "metrics")]
use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};

#[derive(Clone, Debug)]
pub struct DbMetrics {
    #[cfg(feature = "metrics")]
    registry: Registry,

    #[cfg(feature = "metrics")]
    pub rows_inserted_total: IntCounter,
    #[cfg(feature = "metrics")]
    pub rows_rejected_total: IntCounter,
    #[cfg(feature = "metrics")]
    pub transport_retries_total: IntCounter,
    #[cfg(feature = "metrics")]
    pub shatter_operations_total: IntCounter,
    #[cfg(feature = "metrics")]
    pub insert_latency_seconds: Histogram,

    #[cfg(not(feature = "metrics"))]
    _noop: (),
}

impl DbMetrics {
    pub fn new() -> AppResult<Self> {
        #[cfg(feature = "metrics")]
        {
            let registry = Registry::new();

            let rows_inserted_total = IntCounter::with_opts(Opts::new(
                "db_rows_inserted_total",
                "Rows successfully bulk-inserted",
            ))?;
            let rows_rejected_total = IntCounter::with_opts(Opts::new(
                "db_rows_rejected_total",
                "Rows isolated into errors_objects after bisection bottomed out",
            ))?;
            let transport_retries_total = IntCounter::with_opts(Opts::new(
                "db_transport_retries_total",
                "Retries issued after a transport-level database failure",
            ))?;
            let shatter_operations_total = IntCounter::with_opts(Opts::new(
                "db_shatter_operations_total",
                "Times a batch was split in two to isolate a bad row",
            ))?;
            let insert_latency_seconds = Histogram::with_opts(HistogramOpts::new(
                "db_insert_latency_seconds",
                "Wall time of a single bulk insert attempt",
            ))?;

            registry.register(Box::new(rows_inserted_total.clone()))?;
            registry.register(Box::new(rows_rejected_total.clone()))?;
            registry.register(Box::new(transport_retries_total.clone()))?;
            registry.register(Box::new(shatter_operations_total.clone()))?;
            registry.register(Box::new(insert_latency_seconds.clone()))?;

            Ok(Self {
                registry,
                rows_inserted_total,
                rows_rejected_total,
                transport_retries_total,
                shatter_operations_total,
                insert_latency_seconds,
            })
        }

        #[cfg(not(feature = "metrics"))]
        {
            Ok(Self { _noop: () })
        }
    }

    #[cfg(feature = "metrics")]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn add_rows_inserted(&self, _n: u64) {
        #[cfg(feature = "metrics")]
        self.rows_inserted_total.inc_by(_n);
    }

    #[inline]
    pub fn add_rows_rejected(&self, _n: u64) {
        #[cfg(feature = "metrics")]
        self.rows_rejected_total.inc_by(_n);
    }

    #[inline]
    pub fn inc_transport_retry(&self) {
        #[cfg(feature = "metrics")]
        self.transport_retries_total.inc();
    }

    #[inline]
    pub fn inc_shatter(&self) {
        #[cfg(feature = "metrics")]
        self.shatter_operations_total.inc();
    }

    #[inline]
    pub fn observe_insert_latency(&self, _seconds: f64) {
        #[cfg(feature = "metrics")]
        self.insert_latency_seconds.observe(_seconds);
    }
}

impl crate::db::bisect::BisectObserver for DbMetrics {
    fn on_inserted(&self, rows: u64) {
        self.add_rows_inserted(rows);
    }

    fn on_rejected(&self, rows: u64) {
        self.add_rows_rejected(rows);
    }

    fn on_transport_retry(&self) {
        self.inc_transport_retry();
    }

    fn on_shatter(&self) {
        self.inc_shatter();
    }
}
