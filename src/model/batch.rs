//! The batch value (`Batch`): a table-scoped group of decoded rows plus two
//! side lists of errors, produced by the batch consumer and consumed by the
//! bulk insert engine.
//!
//! Pure logic, no I/O.

use crate::decode::Decoder;
use crate::error::{AppError, AppResult};
use crate::model::{Object, Value};
use chrono::Utc;
use std::fmt;

/// What the batch model needs from a broker message to build a [`Batch`].
/// Kept minimal and decoupled from any particular broker client.
pub trait MessageLike {
    fn body(&self) -> &[u8];
    fn routing_key(&self) -> Option<&str>;
}

/// Labels for the three observable per-batch outcome counts, recovered from
/// the original's `CollectorObjectType` (`total` / `error_bodies` /
/// `error_objects`). Used by callers that want to report batch outcomes to
/// metrics or logs without hand-rolling the label strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorObjectType {
    Total,
    ErrorBodies,
    ErrorObjects,
}

impl CollectorObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorObjectType::Total => "total",
            CollectorObjectType::ErrorBodies => "error_bodies",
            CollectorObjectType::ErrorObjects => "error_objects",
        }
    }
}

/// A bounded, table-scoped group of decoded rows plus two side lists of
/// errors.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub table_name: String,
    pub objects: Vec<Object>,
    pub errors_bodies: Vec<Vec<u8>>,
    pub errors_objects: Vec<Object>,
}

impl Batch {
    /// Builds a batch from a non-empty run of messages that share a routing
    /// key. Returns `None` if `messages` is empty or the first message
    /// carries no routing key.
    ///
    /// Decode order is preserved independently in `objects` and
    /// `errors_bodies`; a row lands in exactly one of the two.
    pub fn from_messages<M: MessageLike>(messages: &[M], decoder: &dyn Decoder) -> Option<Batch> {
        let first = messages.first()?;
        let routing_key = first.routing_key()?;
        let table_name = routing_key.rsplit('.').next().unwrap_or(routing_key).to_string();

        let mut objects = Vec::with_capacity(messages.len());
        let mut errors_bodies = Vec::new();

        for message in messages {
            match decoder.decode(message.body()) {
                Ok(object) => objects.push(object),
                Err(_) => errors_bodies.push(message.body().to_vec()),
            }
        }

        Some(Batch {
            table_name,
            objects,
            errors_bodies,
            errors_objects: Vec::new(),
        })
    }

    /// Splits `objects` into exactly `n` contiguous, equal-ceiling-sized
    /// shards. Shards carry empty error sequences — the parent keeps sole
    /// ownership of its own error lists.
    ///
    /// `n <= 0` is rejected explicitly rather than left undefined.
    pub fn shatter(&self, n: i64) -> AppResult<Vec<Batch>> {
        if n <= 0 {
            return Err(AppError::InvalidShatterCount(n));
        }
        let n = n as usize;

        let total = self.objects.len();
        let shard_size = total.div_ceil(n).max(1);

        let mut shards = Vec::with_capacity(n);
        for k in 0..n {
            let start = (k * shard_size).min(total);
            let end = ((k + 1) * shard_size).min(total);
            shards.push(Batch {
                table_name: self.table_name.clone(),
                objects: self.objects[start..end].to_vec(),
                errors_bodies: Vec::new(),
                errors_objects: Vec::new(),
            });
        }
        Ok(shards)
    }

    /// Normalizes rows for insertion: drops null fields (letting the
    /// database apply its defaults), and fills a present-but-falsy
    /// `created_at` with the current instant.
    pub fn prepared(&self) -> Batch {
        let mut objects = Vec::with_capacity(self.objects.len());

        for src in &self.objects {
            let mut dst = Object::new();
            for (key, value) in src {
                if value.is_null() {
                    continue;
                }
                dst.insert(key.clone(), value.clone());
            }
            if let Some(created_at) = src.get("created_at") {
                let normalized = if created_at.is_falsy() {
                    Value::Timestamp(Utc::now())
                } else {
                    created_at.clone()
                };
                dst.insert("created_at".to_string(), normalized);
            }
            objects.push(dst);
        }

        Batch {
            table_name: self.table_name.clone(),
            objects,
            errors_bodies: self.errors_bodies.clone(),
            errors_objects: self.errors_objects.clone(),
        }
    }

    /// Folds another batch's error lists into this one. Used by the bulk
    /// insert engine to recombine the outcomes of a `shatter()`'d batch's
    /// independently-inserted shards.
    pub fn absorb_errors(&mut self, mut other: Batch) {
        self.errors_bodies.append(&mut other.errors_bodies);
        self.errors_objects.append(&mut other.errors_objects);
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Batch(table={}, {}={}, {}={}, {}={})",
            self.table_name,
            CollectorObjectType::Total.as_str(),
            self.objects.len(),
            CollectorObjectType::ErrorBodies.as_str(),
            self.errors_bodies.len(),
            CollectorObjectType::ErrorObjects.as_str(),
            self.errors_objects.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::JsonDecoder;

    struct Msg {
        body: Vec<u8>,
        routing_key: Option<String>,
    }

    impl MessageLike for Msg {
        fn body(&self) -> &[u8] {
            &self.body
        }
        fn routing_key(&self) -> Option<&str> {
            self.routing_key.as_deref()
        }
    }

    fn msg(body: &str, routing_key: &str) -> Msg {
        Msg {
            body: body.as_bytes().to_vec(),
            routing_key: Some(routing_key.to_string()),
        }
    }

    #[test]
    fn from_messages_empty_yields_none() {
        let msgs: Vec<Msg> = Vec::new();
        assert!(Batch::from_messages(&msgs, &JsonDecoder).is_none());
    }

    #[test]
    fn from_messages_without_routing_key_yields_none() {
        let msgs = vec![Msg {
            body: b"{}".to_vec(),
            routing_key: None,
        }];
        assert!(Batch::from_messages(&msgs, &JsonDecoder).is_none());
    }

    #[test]
    fn happy_path_three_messages() {
        let msgs = vec![
            msg(r#"{"x":1}"#, "a.b.things"),
            msg(r#"{"x":2}"#, "a.b.things"),
            msg(r#"{"x":3}"#, "a.b.things"),
        ];
        let batch = Batch::from_messages(&msgs, &JsonDecoder).unwrap();
        assert_eq!(batch.table_name, "things");
        assert_eq!(batch.objects.len(), 3);
        assert!(batch.errors_bodies.is_empty());
        assert!(batch.errors_objects.is_empty());
    }

    #[test]
    fn decode_failure_is_isolated_in_errors_bodies() {
        let msgs = vec![
            msg(r#"{"x":1}"#, "a.b.things"),
            msg("not json", "a.b.things"),
            msg(r#"{"x":3}"#, "a.b.things"),
        ];
        let batch = Batch::from_messages(&msgs, &JsonDecoder).unwrap();
        assert_eq!(batch.objects.len(), 2);
        assert_eq!(batch.errors_bodies.len(), 1);
        assert_eq!(batch.errors_bodies[0], b"not json");
    }

    fn batch_with_n_objects(n: usize) -> Batch {
        let mut objects = Vec::new();
        for i in 0..n {
            let mut obj = Object::new();
            obj.insert("i".to_string(), Value::Int(i as i64));
            objects.push(obj);
        }
        Batch {
            table_name: "t".to_string(),
            objects,
            errors_bodies: vec![b"err".to_vec()],
            errors_objects: Vec::new(),
        }
    }

    #[test]
    fn shatter_rejects_non_positive_n() {
        let batch = batch_with_n_objects(4);
        assert!(batch.shatter(0).is_err());
        assert!(batch.shatter(-1).is_err());
    }

    #[test]
    fn shatter_concatenates_back_to_original_and_balances_within_one() {
        for total in [0usize, 1, 2, 3, 4, 5, 7, 10] {
            for n in [1i64, 2, 3] {
                let batch = batch_with_n_objects(total);
                let shards = batch.shatter(n).unwrap();
                assert_eq!(shards.len(), n as usize);

                let mut concatenated = Vec::new();
                for s in &shards {
                    assert!(s.errors_bodies.is_empty());
                    assert!(s.errors_objects.is_empty());
                    concatenated.extend(s.objects.iter().cloned());
                }
                assert_eq!(concatenated, batch.objects);

                let lens: Vec<usize> = shards.iter().map(|s| s.objects.len()).collect();
                let max = *lens.iter().max().unwrap();
                let min = *lens.iter().min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn prepared_drops_nulls_and_fills_created_at() {
        let mut obj1 = Object::new();
        obj1.insert("a".to_string(), Value::Int(1));
        obj1.insert("b".to_string(), Value::Null);
        obj1.insert("created_at".to_string(), Value::Null);

        let mut obj2 = Object::new();
        obj2.insert("a".to_string(), Value::Int(2));
        obj2.insert("created_at".to_string(), Value::Int(1_700_000_000));

        let batch = Batch {
            table_name: "t".to_string(),
            objects: vec![obj1, obj2],
            errors_bodies: Vec::new(),
            errors_objects: Vec::new(),
        };

        let prepared = batch.prepared();
        assert!(!prepared.objects[0].contains_key("b"));
        assert!(matches!(
            prepared.objects[0].get("created_at"),
            Some(Value::Timestamp(_))
        ));
        assert_eq!(
            prepared.objects[1].get("created_at"),
            Some(&Value::Int(1_700_000_000))
        );
    }

    #[test]
    fn prepared_leaves_rows_without_created_at_untouched() {
        let mut obj = Object::new();
        obj.insert("a".to_string(), Value::Int(1));
        let batch = Batch {
            table_name: "t".to_string(),
            objects: vec![obj],
            errors_bodies: Vec::new(),
            errors_objects: Vec::new(),
        };
        let prepared = batch.prepared();
        assert!(!prepared.objects[0].contains_key("created_at"));
    }
}
