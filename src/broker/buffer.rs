//! The accumulation cycle behind the batch consumer, factored out from
//! [`crate::broker::rabbitmq::RabbitBatchConsumer`] so the size/timer
//! trigger logic can be exercised without a live broker.

use crate::error::AppResult;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

/// Pulls items off `rx` into an internal buffer, calling `on_flush` with
/// everything accumulated so far whenever the buffer reaches `batch_size`
/// (size trigger) or `interval` elapses since the last flush with at least
/// one item buffered (timer trigger). Returns once `rx` closes, flushing
/// whatever remains first. Propagates the first error `on_flush` returns.
pub async fn drain_timed<T, F, Fut>(
    rx: &mut UnboundedReceiver<T>,
    batch_size: usize,
    interval: Duration,
    mut on_flush: F,
) -> AppResult<()>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = AppResult<()>>,
{
    let mut buffer: Vec<T> = Vec::with_capacity(batch_size);
    let mut remaining = interval;

    loop {
        let wait_start = Instant::now();

        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(item)) => {
                buffer.push(item);
                remaining = remaining.saturating_sub(wait_start.elapsed());

                if buffer.len() < batch_size {
                    continue;
                }
                // Size trigger: fall through to flush.
            }
            Ok(None) => {
                if !buffer.is_empty() {
                    on_flush(std::mem::take(&mut buffer)).await?;
                }
                return Ok(());
            }
            Err(_elapsed) => {
                // Timer trigger: fall through to flush whatever is buffered
                // (possibly nothing, if the cycle opened with no items).
            }
        }

        if !buffer.is_empty() {
            on_flush(std::mem::take(&mut buffer)).await?;
        }
        remaining = interval;
    }
}
