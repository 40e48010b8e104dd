use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use socialstore_core::AggregateId;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend};

#[derive(Debug, Default)]
struct Streams {
    by_aggregate: HashMap<AggregateId, Vec<StoredEvent>>,
    /// Global commit order.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single write lock makes every batch atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<Streams>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: Option<&Vec<StoredEvent>>) -> u64 {
        stream
            .and_then(|s| s.last())
            .map(|e| e.sequence_number)
            .unwrap_or(0)
    }
}

fn validate_append(append: &StreamAppend) -> Result<(), EventStoreError> {
    let Some(first) = append.events.first() else {
        return Ok(());
    };
    for (idx, e) in append.events.iter().enumerate() {
        if e.aggregate_id != append.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} batch contains a foreign aggregate_id (index {idx})",
                append.aggregate_id
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream {} batch contains multiple aggregate_types (index {idx})",
                append.aggregate_id
            )));
        }
    }
    Ok(())
}

impl EventStore for InMemoryEventStore {
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut seen = HashSet::new();
        for append in &batch {
            validate_append(append)?;
            if !seen.insert(append.aggregate_id) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream {} appears more than once in one batch",
                    append.aggregate_id
                )));
            }
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        // Check every stream before touching any of them.
        for append in &batch {
            let existing = streams.by_aggregate.get(&append.aggregate_id);
            let current = Self::current_version(existing);
            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    append.aggregate_id, append.expected_version
                )));
            }

            let first_existing = existing.and_then(|s| s.first());
            if let (Some(existing), Some(incoming)) = (first_existing, append.events.first()) {
                if existing.aggregate_type != incoming.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, incoming.aggregate_type
                    )));
                }
            }
        }

        let mut committed = Vec::new();
        for append in batch {
            if append.events.is_empty() {
                continue;
            }
            let stream = streams.by_aggregate.entry(append.aggregate_id).or_default();
            let mut next = Self::current_version(Some(stream)) + 1;
            let mut stored_batch = Vec::with_capacity(append.events.len());
            for e in append.events {
                stored_batch.push(StoredEvent {
                    event_id: e.event_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                });
                next += 1;
            }
            stream.extend(stored_batch.iter().cloned());
            committed.extend(stored_batch);
        }
        streams.log.extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(streams
            .by_aggregate
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(streams.log.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::UncommittedEvent;
    use chrono::Utc;
    use socialstore_core::ExpectedVersion;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.event".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({ "n": 1 }),
        }
    }

    fn append(aggregate_id: AggregateId, expected: u64, n: usize) -> StreamAppend {
        StreamAppend {
            aggregate_id,
            expected_version: ExpectedVersion::Exact(expected),
            events: (0..n).map(|_| event(aggregate_id, "test.stream")).collect(),
        }
    }

    #[test]
    fn sequence_numbers_start_at_one_and_increase() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        store.append_batch(vec![append(id, 0, 2)]).unwrap();
        let more = store.append_batch(vec![append(id, 2, 1)]).unwrap();

        assert_eq!(more[0].sequence_number, 3);
        let seqs: Vec<u64> = store
            .load_stream(id)
            .unwrap()
            .iter()
            .map(|e| e.sequence_number)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append_batch(vec![append(id, 0, 1)]).unwrap();

        let err = store.append_batch(vec![append(id, 0, 1)]).unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn batch_with_one_stale_stream_writes_nothing() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store.append_batch(vec![append(b, 0, 1)]).unwrap();

        let err = store
            .append_batch(vec![append(a, 0, 1), append(b, 0, 1)])
            .unwrap_err();

        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert!(store.load_stream(a).unwrap().is_empty());
        assert_eq!(store.load_stream(b).unwrap().len(), 1);
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn same_stream_twice_in_a_batch_is_rejected() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let err = store
            .append_batch(vec![append(a, 0, 1), append(a, 1, 1)])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
    }

    #[test]
    fn stream_aggregate_type_is_stable() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append_batch(vec![append(id, 0, 1)]).unwrap();

        let err = store
            .append(vec![event(id, "other.stream")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn load_all_preserves_commit_order() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store.append_batch(vec![append(a, 0, 1)]).unwrap();
        store.append_batch(vec![append(b, 0, 1)]).unwrap();
        store.append_batch(vec![append(a, 1, 1)]).unwrap();

        let order: Vec<(AggregateId, u64)> = store
            .load_all()
            .unwrap()
            .iter()
            .map(|e| (e.aggregate_id, e.sequence_number))
            .collect();
        assert_eq!(order, vec![(a, 1), (b, 1), (a, 2)]);
    }
}
