pub mod bisect;
pub mod metrics;
pub mod postgres;
pub mod table;

pub use metrics::DbMetrics;
pub use postgres::PostgresDatabase;
pub use table::{TableDescriptor, TableRegistry};

use crate::error::AppResult;
use crate::model::Batch;
use async_trait::async_trait;

/// The bulk insert engine's contract: accept a prepared batch, attempt one
/// bulk insert, and on data failure recursively isolate the bad rows by
/// bisection. Returns the batch with its `errors_objects` populated by
/// whatever bisection could not place.
#[async_trait]
pub trait Database: Send + Sync {
    async fn bulk_create(&self, batch: Batch) -> AppResult<Batch>;
}
