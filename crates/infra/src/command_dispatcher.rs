//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (live views, notification listeners)
//! ```
//!
//! Single-aggregate commands go through [`CommandDispatcher::dispatch`]. When
//! several aggregates must change together (a delivery confirmation and the
//! stock exits it causes), services call [`CommandDispatcher::decide`] per
//! aggregate and hand all decisions to [`CommandDispatcher::commit`], which
//! appends them in one atomic batch.

use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use socialstore_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use socialstore_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (a stream moved on since it was loaded).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Deterministic business rule failure from an aggregate or a service check.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// The loaded stream is malformed.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// Persisting to the event store failed.
    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (events are persisted).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// What an aggregate decided to do, not yet persisted.
#[derive(Debug, Clone)]
pub struct Decision<E> {
    pub events: Vec<E>,
    pub append: StreamAppend,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication: if the append fails nothing is
/// published. If publication fails after a successful append the error is
/// returned, but the change stands.
///
/// Commits are serialized so the bus sees events in commit order; projections
/// rely on per-stream sequence numbers arriving without gaps.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    commit_lock: Mutex<()>,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate an aggregate. A missing stream yields the empty aggregate.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Decide a command against an already loaded aggregate (pure; nothing is written).
    ///
    /// The resulting append expects the stream to still be at the aggregate's version.
    pub fn decide<A>(
        &self,
        aggregate: &A,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
    ) -> Result<Decision<A::Event>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: socialstore_events::Event + Serialize,
    {
        let events = aggregate.handle(command)?;
        let uncommitted = events
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Decision {
            events,
            append: StreamAppend {
                aggregate_id,
                expected_version: ExpectedVersion::Exact(aggregate.version()),
                events: uncommitted,
            },
        })
    }

    /// Persist several decisions atomically, then publish what was committed.
    pub fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, DispatchError> {
        let appends: Vec<StreamAppend> = appends.into_iter().filter(|a| !a.events.is_empty()).collect();
        if appends.is_empty() {
            return Ok(vec![]);
        }

        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| EventStoreError::Unavailable("commit lock poisoned".to_string()))?;

        let committed = self.store.append_batch(appends)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Dispatch a command through the full pipeline and return the new state.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: socialstore_events::Event + Serialize + DeserializeOwned,
    {
        let mut aggregate = self.load(aggregate_id, make_aggregate)?;
        let decision = self.decide(&aggregate, aggregate_id, aggregate_type, command)?;
        self.commit(vec![decision.append])?;

        for ev in &decision.events {
            aggregate.apply(ev);
        }
        Ok(aggregate)
    }
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::CorruptStream(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::CorruptStream(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
