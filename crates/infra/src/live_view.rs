//! Push-based live queries over projections.
//!
//! A [`LiveView`] owns a projection fed by a background [`ProjectionWorker`].
//! Watchers receive the full filtered snapshot right away and again after
//! every change that touches the projection. Dropping the returned
//! [`Subscription`] cancels the watch; the dead sender is pruned by the next
//! change or the next [`LiveView::watch`].

use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use socialstore_events::{EventBus, EventEnvelope, Liveness, Subscription};

use crate::event_store::{EventStore, EventStoreError};
use crate::projections::{Projection, ProjectionError};
use crate::workers::{ProjectionWorker, WorkerHandle};

#[derive(Debug, Error)]
pub enum LiveViewError {
    #[error("failed to replay history: {0}")]
    Replay(#[from] EventStoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("failed to spawn projection worker: {0}")]
    Spawn(#[from] std::io::Error),
}

type RowFilter<R> = Box<dyn Fn(&R) -> bool + Send>;

struct Watcher<R> {
    filter: RowFilter<R>,
    tx: mpsc::Sender<Vec<R>>,
    liveness: Liveness,
}

impl<R: Clone> Watcher<R> {
    fn snapshot(&self, rows: &[R]) -> Vec<R> {
        rows.iter().filter(|r| (self.filter)(r)).cloned().collect()
    }
}

struct ViewState<P: Projection> {
    projection: P,
    watchers: Vec<Watcher<P::Row>>,
}

impl<P: Projection> ViewState<P> {
    fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if !self.projection.apply_envelope(envelope)? {
            return Ok(());
        }

        let rows = self.projection.rows();
        let before = self.watchers.len();
        self.watchers.retain(|w| w.tx.send(w.snapshot(&rows)).is_ok());
        let pruned = before - self.watchers.len();
        if pruned > 0 {
            debug!(pruned, "dropped cancelled live query watchers");
        }
        Ok(())
    }

    /// Drop watchers whose subscription is gone, even if nothing changed.
    fn prune(&mut self) {
        self.watchers.retain(|w| !w.liveness.is_cancelled());
    }
}

/// A projection kept current in the background, with filtered watchers.
pub struct LiveView<P: Projection> {
    state: Arc<Mutex<ViewState<P>>>,
    worker: WorkerHandle,
}

impl<P: Projection> LiveView<P> {
    /// Build `projection` from the store's history and keep it fed from `bus`.
    ///
    /// Subscribes before replaying so nothing committed in between is lost;
    /// the projection's cursors drop whatever arrives twice.
    pub fn start<S, B>(name: &'static str, projection: P, store: &S, bus: &B) -> Result<Self, LiveViewError>
    where
        S: EventStore,
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        let sub = bus.subscribe();

        let mut state = ViewState {
            projection,
            watchers: Vec::new(),
        };
        for stored in store.load_all()? {
            state.apply(&stored.to_envelope())?;
        }

        let state = Arc::new(Mutex::new(state));
        let shared = Arc::clone(&state);
        let worker = ProjectionWorker::run(name, sub, move |envelope: EventEnvelope<JsonValue>| {
            lock(&shared).apply(&envelope)
        })?;

        Ok(Self { state, worker })
    }

    pub fn name(&self) -> &'static str {
        self.worker.name()
    }

    /// Current rows matching `filter`.
    pub fn snapshot(&self, filter: impl Fn(&P::Row) -> bool) -> Vec<P::Row> {
        lock(&self.state)
            .projection
            .rows()
            .into_iter()
            .filter(|r| filter(r))
            .collect()
    }

    /// Stream of snapshots matching `filter`, starting with the current one.
    pub fn watch(&self, filter: impl Fn(&P::Row) -> bool + Send + 'static) -> Subscription<Vec<P::Row>> {
        let (tx, rx) = mpsc::channel();
        let sub = Subscription::new(rx);
        let watcher = Watcher {
            filter: Box::new(filter),
            tx,
            liveness: sub.liveness(),
        };

        let mut state = lock(&self.state);
        state.prune();
        let rows = state.projection.rows();
        if watcher.tx.send(watcher.snapshot(&rows)).is_ok() {
            state.watchers.push(watcher);
        }
        sub
    }

    pub fn watcher_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.prune();
        state.watchers.len()
    }
}

// A panic inside a projection leaves its rows as they were; keep serving them.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
