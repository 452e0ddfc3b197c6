//! Batch consumer metrics, following the teacher's feature-gated
//! `ingest/metrics.rs` pattern: a `prometheus::Registry` wrapped in small
//! `#[inline]` helpers so call sites never branch on the `metrics` feature.

use crate::error::AppResult;

#[cfg(feature = "metrics")]
use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};

#[derive(Clone, Debug)]
pub struct BrokerMetrics {
    #[cfg(feature = "metrics")]
    registry: Registry,

    #[cfg(feature = "metrics")]
    pub messages_received_total: IntCounter,
    #[cfg(feature = "metrics")]
    pub batches_emitted_total: IntCounter,
    #[cfg(feature = "metrics")]
    pub decode_errors_total: IntCounter,
    #[cfg(feature = "metrics")]
    pub batch_size: Histogram,

    #[cfg(not(feature = "metrics"))]
    _noop: (),
}

impl BrokerMetrics {
    pub fn new() -> AppResult<Self> {
        #[cfg(feature = "metrics")]
        {
            let registry = Registry::new();

            let messages_received_total = IntCounter::with_opts(Opts::new(
                "broker_messages_received_total",
                "Messages received from the broker, across all queues",
            ))?;
            let batches_emitted_total = IntCounter::with_opts(Opts::new(
                "broker_batches_emitted_total",
                "Batches emitted by the batch consumer (size- or timer-triggered)",
            ))?;
            let decode_errors_total = IntCounter::with_opts(Opts::new(
                "broker_decode_errors_total",
                "Message bodies that failed to decode",
            ))?;
            let batch_size = Histogram::with_opts(HistogramOpts::new(
                "broker_batch_size",
                "Number of messages in each emitted batch",
            ))?;

            registry.register(Box::new(messages_received_total.clone()))?;
            registry.register(Box::new(batches_emitted_total.clone()))?;
            registry.register(Box::new(decode_errors_total.clone()))?;
            registry.register(Box::new(batch_size.clone()))?;

            Ok(Self {
                registry,
                messages_received_total,
                batches_emitted_total,
                decode_errors_total,
                batch_size,
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
    pub fn inc_messages_received(&self) {
        #[cfg(feature = "metrics")]
        self.messages_received_total.inc();
    }

    #[inline]
    pub fn inc_messages_received_by(&self, _n: usize) {
        #[cfg(feature = "metrics")]
        self.messages_received_total.inc_by(_n as u64);
    }

    #[inline]
    pub fn inc_decode_errors(&self, _n: usize) {
        #[cfg(feature = "metrics")]
        self.decode_errors_total.inc_by(_n as u64);
    }

    #[inline]
    pub fn observe_batch(&self, _rows: usize) {
        #[cfg(feature = "metrics")]
        {
            self.batches_emitted_total.inc();
            self.batch_size.observe(_rows as f64);
        }
    }
}
