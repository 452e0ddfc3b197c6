//! Wires one [`RabbitBatchConsumer`] queue to one [`Database`] sink: for
//! each configured queue, run `consumer.iterate()` forever, handing every
//! emitted batch to `db.bulk_create()` before the consumer acknowledges it.

use crate::broker::RabbitBatchConsumer;
use crate::db::Database;
use crate::decode::Decoder;
use crate::error::AppResult;
use std::sync::Arc;
use tracing::{error, info};

/// Runs the batch consumer for a single queue, inserting every batch it
/// emits through `db` before acknowledging. Returns only on an
/// unrecoverable broker error, at which point the caller is expected to
/// reconnect and restart by looping this.
pub async fn run_queue(
    consumer: &RabbitBatchConsumer,
    queue_name: &str,
    decoder: Arc<dyn Decoder>,
    db: Arc<dyn Database>,
) -> AppResult<()> {
    consumer
        .iterate(queue_name, decoder, |batch| {
            let db = Arc::clone(&db);
            async move {
                let outcome = db.bulk_create(batch).await?;
                if !outcome.errors_objects.is_empty() || !outcome.errors_bodies.is_empty() {
                    error!(
                        table = %outcome.table_name,
                        rejected_objects = outcome.errors_objects.len(),
                        undecodable_bodies = outcome.errors_bodies.len(),
                        "batch finished with isolated rows"
                    );
                } else {
                    info!(%outcome, "batch committed");
                }
                Ok(())
            }
        })
        .await
}
