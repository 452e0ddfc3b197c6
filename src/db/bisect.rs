//! The bisection algorithm behind the bulk insert engine, factored out from
//! [`crate::db::postgres::PostgresDatabase`] so it can be exercised against a
//! fake insert attempt in tests without a live Postgres.

use crate::error::{AppError, AppResult};
use crate::model::Batch;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::time::Duration;

/// What a single insert attempt reported back to the algorithm. The actual
/// database error is logged by the attempt function itself; the algorithm
/// only needs to know which of the three ways an attempt can end.
pub enum AttemptOutcome {
    Inserted(u64),
    /// The broker/database link itself failed; retry forever.
    Transport,
    /// The database rejected the data in this batch; bisect.
    Data,
    /// Anything else (e.g. the target table doesn't exist): not
    /// retryable and not isolatable per-row, so propagate.
    Fatal(AppError),
}

/// Progress hooks the algorithm reports through. Kept separate from
/// `prometheus` so the algorithm compiles and is testable with the
/// `metrics` feature disabled.
pub trait BisectObserver {
    fn on_inserted(&self, _rows: u64) {}
    fn on_rejected(&self, _rows: u64) {}
    fn on_transport_retry(&self) {}
    fn on_shatter(&self) {}
}

impl BisectObserver for () {}

/// One attempt per call; transport failures retry forever after
/// `retry_period`; data failures bisect the batch (`shatter(2)`) and recurse
/// on each shard until every poison row is isolated into `errors_objects`.
pub fn bisect_and_insert<'a, A, Fut>(
    mut batch: Batch,
    retry_period: Duration,
    observer: &'a (impl BisectObserver + Sync),
    attempt: &'a mut A,
) -> BoxFuture<'a, AppResult<Batch>>
where
    A: FnMut(Batch) -> Fut + Send,
    Fut: Future<Output = (Batch, AttemptOutcome)> + Send + 'a,
{
    Box::pin(async move {
        if batch.objects.is_empty() {
            return Ok(batch);
        }

        loop {
            let (returned, outcome) = attempt(batch).await;
            batch = returned;

            match outcome {
                AttemptOutcome::Inserted(rows) => {
                    observer.on_inserted(rows);
                    return Ok(batch);
                }
                AttemptOutcome::Transport => {
                    observer.on_transport_retry();
                    tokio::time::sleep(retry_period).await;
                    continue;
                }
                AttemptOutcome::Fatal(error) => return Err(error),
                AttemptOutcome::Data => {
                    if batch.objects.len() <= 1 {
                        observer.on_rejected(batch.objects.len() as u64);
                        batch.errors_objects.append(&mut batch.objects);
                        return Ok(batch);
                    }

                    observer.on_shatter();
                    let shards = batch.shatter(2)?;
                    let mut merged = Batch {
                        table_name: batch.table_name.clone(),
                        objects: Vec::new(),
                        errors_bodies: std::mem::take(&mut batch.errors_bodies),
                        errors_objects: std::mem::take(&mut batch.errors_objects),
                    };

                    for shard in shards {
                        let result = bisect_and_insert(shard, retry_period, observer, attempt).await?;
                        merged.absorb_errors(result);
                    }
                    return Ok(merged);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Object, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn batch_with_n_objects(n: usize) -> Batch {
        let mut objects = Vec::new();
        for i in 0..n {
            let mut obj = Object::new();
            obj.insert("i".to_string(), Value::Int(i as i64));
            objects.push(obj);
        }
        Batch {
            table_name: "things".to_string(),
            objects,
            errors_bodies: Vec::new(),
            errors_objects: Vec::new(),
        }
    }

    fn row_i(object: &Object) -> i64 {
        match object.get("i") {
            Some(Value::Int(i)) => *i,
            _ => panic!("row missing 'i'"),
        }
    }

    // Row index 2 is poison; bisection should isolate exactly that row.
    #[tokio::test]
    async fn bisection_isolates_the_single_poison_row() {
        let batch = batch_with_n_objects(4);

        let mut attempt = |batch: Batch| async move {
            if batch.objects.iter().any(|o| row_i(o) == 2) && batch.objects.len() > 1 {
                (batch, AttemptOutcome::Data)
            } else if batch.objects.len() == 1 && row_i(&batch.objects[0]) == 2 {
                (batch, AttemptOutcome::Data)
            } else {
                let rows = batch.objects.len() as u64;
                (batch, AttemptOutcome::Inserted(rows))
            }
        };

        let result = bisect_and_insert(batch, Duration::from_millis(1), &(), &mut attempt)
            .await
            .unwrap();

        assert_eq!(result.errors_objects.len(), 1);
        assert_eq!(row_i(&result.errors_objects[0]), 2);
        assert!(result.objects.is_empty());
    }

    // First attempt is a transport failure, second succeeds; the algorithm
    // must retry rather than give up or bisect.
    #[tokio::test]
    async fn transport_failure_retries_instead_of_bisecting() {
        let batch = batch_with_n_objects(2);
        let attempts = Mutex::new(0usize);

        let mut attempt = |batch: Batch| {
            let mut guard = attempts.lock().unwrap();
            *guard += 1;
            let n = *guard;
            drop(guard);
            async move {
                if n == 1 {
                    (batch, AttemptOutcome::Transport)
                } else {
                    let rows = batch.objects.len() as u64;
                    (batch, AttemptOutcome::Inserted(rows))
                }
            }
        };

        let result = bisect_and_insert(batch, Duration::from_millis(1), &(), &mut attempt)
            .await
            .unwrap();

        assert_eq!(*attempts.lock().unwrap(), 2);
        assert_eq!(result.objects.len(), 2);
        assert!(result.errors_objects.is_empty());
    }

    #[tokio::test]
    async fn fatal_outcome_propagates_without_bisecting() {
        let batch = batch_with_n_objects(3);
        let calls = AtomicUsize::new(0);

        let mut attempt = |batch: Batch| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { (batch, AttemptOutcome::Fatal(AppError::UnknownTable("things".into()))) }
        };

        let result = bisect_and_insert(batch, Duration::from_millis(1), &(), &mut attempt).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_batch_never_calls_attempt() {
        let batch = batch_with_n_objects(0);
        let calls = AtomicUsize::new(0);
        let mut attempt = |batch: Batch| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { (batch, AttemptOutcome::Inserted(0)) }
        };
        let result = bisect_and_insert(batch, Duration::from_millis(1), &(), &mut attempt)
            .await
            .unwrap();
        assert!(result.objects.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
