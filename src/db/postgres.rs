//! PostgreSQL bulk insert engine, grounded in the teacher's `db/writer.rs`
//! `QueryBuilder`/`push_values` pattern and in the original's
//! `PostgreSQL.bulk_create` retry/bisect loop.

use crate::config::DatabaseConfig;
use crate::db::bisect::{AttemptOutcome, bisect_and_insert};
use crate::db::{DbMetrics, TableDescriptor, TableRegistry};
use crate::error::{AppError, AppResult};
use crate::model::{Batch, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Owns the connection pool and table descriptor cache, and implements the
/// bisection loop: one insert attempt per call, unbounded retry on transport
/// failure, recursive halving on data failure until the poison row is
/// isolated into `errors_objects`.
pub struct PostgresDatabase {
    pool: PgPool,
    tables: TableRegistry,
    metrics: Arc<DbMetrics>,
    retry_period: Duration,
}

impl PostgresDatabase {
    pub async fn connect(config: &DatabaseConfig, metrics: Arc<DbMetrics>) -> AppResult<Self> {
        let statement_timeout_ms = config.statement_timeout_ms;
        let echo_pool = config.echo_pool;

        let connect_options = PgConnectOptions::from_str(&config.connection_url())?;

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(format!("SET statement_timeout = {statement_timeout_ms}").as_str())
                        .await?;
                    Ok(())
                })
            });

        if echo_pool {
            pool_options = pool_options
                .before_acquire(|_conn, meta| {
                    Box::pin(async move {
                        debug!(age_secs = meta.age.as_secs_f64(), idle_for_secs = meta.idle_for.as_secs_f64(), "pool: acquiring connection");
                        Ok(true)
                    })
                })
                .after_release(|_conn, meta| {
                    Box::pin(async move {
                        debug!(age_secs = meta.age.as_secs_f64(), "pool: releasing connection");
                        Ok(true)
                    })
                });
        }

        let pool = pool_options.connect_with(connect_options).await?;

        Ok(Self {
            pool,
            tables: TableRegistry::new(),
            metrics,
            retry_period: config.retry_period(),
        })
    }

    /// Builds a [`PostgresDatabase`] around an already-open pool, bypassing
    /// [`PostgresDatabase::connect`]'s DSN assembly from [`DatabaseConfig`].
    /// Used by integration tests that hand in an ad hoc connection URL
    /// (e.g. from `BATCHMQ_TEST_DATABASE_URL`) without re-deriving it from
    /// config parts.
    #[cfg(test)]
    pub(crate) fn from_pool(pool: PgPool, metrics: Arc<DbMetrics>, retry_period: Duration) -> Self {
        Self {
            pool,
            tables: TableRegistry::new(),
            metrics,
            retry_period,
        }
    }

    /// Union of the columns present across `batch.objects` that the target
    /// table actually has. A column absent from every row is left out of
    /// the `INSERT` list entirely so the database's own default applies;
    /// a column present in some rows but not others is still in the list,
    /// with `NULL` substituted for the rows missing it.
    fn insert_columns(batch: &Batch, descriptor: &TableDescriptor) -> Vec<String> {
        let mut present: BTreeSet<&str> = BTreeSet::new();
        for object in &batch.objects {
            for key in object.keys() {
                if descriptor.columns.contains(key.as_str()) {
                    present.insert(key.as_str());
                }
            }
        }
        present.into_iter().map(str::to_string).collect()
    }

    async fn execute_insert(
        &self,
        batch: &Batch,
        descriptor: &TableDescriptor,
    ) -> Result<u64, sqlx::Error> {
        if batch.objects.is_empty() {
            return Ok(0);
        }

        let columns = Self::insert_columns(batch, descriptor);
        if columns.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO \"");
        qb.push(descriptor.name.replace('"', "\"\""));
        qb.push("\" (");
        for (i, col) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push('"');
            qb.push(col.replace('"', "\"\""));
            qb.push('"');
        }
        qb.push(") ");

        qb.push_values(batch.objects.iter(), |mut row, object| {
            for col in &columns {
                match object.get(col) {
                    None | Some(Value::Null) => {
                        row.push("NULL");
                    }
                    Some(Value::Int(i)) => {
                        row.push_bind(*i);
                    }
                    Some(Value::Float(f)) => {
                        row.push_bind(*f);
                    }
                    Some(Value::Str(s)) => {
                        row.push_bind(s.clone());
                    }
                    Some(Value::Bool(b)) => {
                        row.push_bind(*b);
                    }
                    Some(Value::Timestamp(ts)) => {
                        row.push_bind(*ts);
                    }
                    Some(Value::Raw(json)) => {
                        row.push_bind(json.to_string());
                    }
                }
            }
        });

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// One insert attempt: reflects the table, runs the bulk insert, and
    /// classifies the result into an [`AttemptOutcome`] for
    /// [`bisect_and_insert`] to act on. Logging happens here, where the
    /// underlying `sqlx::Error` is still in scope.
    async fn attempt_insert(&self, batch: Batch) -> (Batch, AttemptOutcome) {
        let descriptor = match self.tables.get(&self.pool, &batch.table_name).await {
            Ok(descriptor) => descriptor,
            Err(error) => return (batch, AttemptOutcome::Fatal(error)),
        };

        let started = Instant::now();
        match self.execute_insert(&batch, &descriptor).await {
            Ok(rows) => {
                self.metrics
                    .observe_insert_latency(started.elapsed().as_secs_f64());
                (batch, AttemptOutcome::Inserted(rows))
            }
            Err(sqlx::Error::Io(_)) | Err(sqlx::Error::PoolTimedOut) | Err(sqlx::Error::PoolClosed) => {
                warn!(
                    table = %batch.table_name,
                    rows = batch.objects.len(),
                    "transport failure inserting batch, retrying"
                );
                (batch, AttemptOutcome::Transport)
            }
            Err(sqlx::Error::Database(db_err)) => {
                debug!(
                    table = %batch.table_name,
                    rows = batch.objects.len(),
                    error = %db_err,
                    "insert rejected by database"
                );
                (batch, AttemptOutcome::Data)
            }
            Err(other) => (batch, AttemptOutcome::Fatal(AppError::Sqlx(other))),
        }
    }

    /// Attempts a single bulk insert of `batch.prepared()`; on transport
    /// failure retries forever at `retry_period`; on data failure bisects
    /// the batch until each poison row is isolated into the returned
    /// batch's `errors_objects`. The bisection algorithm itself lives in
    /// [`crate::db::bisect`].
    pub async fn bulk_create(&self, batch: Batch) -> AppResult<Batch> {
        let prepared = batch.prepared();
        let mut attempt = |batch: Batch| self.attempt_insert(batch);
        bisect_and_insert(prepared, self.retry_period, self.metrics.as_ref(), &mut attempt).await
    }
}

#[async_trait::async_trait]
impl crate::db::Database for PostgresDatabase {
    async fn bulk_create(&self, batch: Batch) -> AppResult<Batch> {
        PostgresDatabase::bulk_create(self, batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Object;

    fn descriptor(columns: &[&str]) -> TableDescriptor {
        TableDescriptor {
            name: "things".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn insert_columns_is_the_union_across_rows_restricted_to_known_columns() {
        let mut a = Object::new();
        a.insert("x".into(), Value::Int(1));
        let mut b = Object::new();
        b.insert("y".into(), Value::Int(2));
        b.insert("unknown_field".into(), Value::Int(3));

        let batch = Batch {
            table_name: "things".into(),
            objects: vec![a, b],
            errors_bodies: Vec::new(),
            errors_objects: Vec::new(),
        };

        let cols = PostgresDatabase::insert_columns(&batch, &descriptor(&["x", "y", "z"]));
        assert_eq!(cols, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn insert_columns_is_empty_when_no_row_has_a_known_column() {
        let mut a = Object::new();
        a.insert("unknown_field".into(), Value::Int(1));
        let batch = Batch {
            table_name: "things".into(),
            objects: vec![a],
            errors_bodies: Vec::new(),
            errors_objects: Vec::new(),
        };
        let cols = PostgresDatabase::insert_columns(&batch, &descriptor(&["x"]));
        assert!(cols.is_empty());
    }
}
