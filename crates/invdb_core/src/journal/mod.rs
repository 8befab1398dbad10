//! Change journal.
//!
//! Transactions stage their events privately and hand them to the journal
//! on commit. The journal fans every event out to the bounded queues of the
//! watches on its kind; each watch has a dispatcher thread that calls the
//! handler one event at a time.

mod event;
mod watch;

pub use event::{Action, Event, EventHandler};
pub use watch::{LabelFilter, Watch, WatchOptions};

pub(crate) use event::RawEvent;

use crate::error::{StoreError, StoreResult};
use crate::model::Model;
use crate::row::Row;
use crate::types::WatchId;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};
use watch::{Dispatch, WatchState};

struct WatchEntry {
    id: WatchId,
    kind: String,
    filter: Option<LabelFilter>,
    queue: SyncSender<RawEvent>,
    dropped: Arc<AtomicU64>,
    state: Arc<WatchState>,
}

struct JournalState {
    enabled: bool,
    watches: Vec<WatchEntry>,
}

/// Engine-wide change bus.
pub(crate) struct Journal {
    state: Mutex<JournalState>,
    next_id: AtomicU64,
    queue_size: usize,
}

impl Journal {
    pub(crate) fn new(queue_size: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(JournalState {
                enabled: true,
                watches: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
            queue_size,
        })
    }

    /// Runs `commit` and enqueues `staged` inside one critical section.
    ///
    /// Holding the lock across the physical commit makes queue order equal
    /// commit order. Events are dropped if `commit` fails.
    pub(crate) fn commit(
        &self,
        staged: Vec<RawEvent>,
        commit: impl FnOnce() -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        commit()?;
        if !state.enabled || staged.is_empty() {
            return Ok(());
        }
        state.watches.retain(|w| w.state.is_alive());
        for event in &staged {
            for watch in state.watches.iter().filter(|w| w.kind == event.kind) {
                if let Some(filter) = &watch.filter {
                    if !filter(&event.labels) {
                        continue;
                    }
                }
                match watch.queue.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        watch.dropped.fetch_add(1, Ordering::SeqCst);
                        warn!(watch = %watch.id, kind = %event.kind, "watch queue full, event dropped");
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            }
        }
        Ok(())
    }

    /// Registers a watch on `kind` and starts its dispatcher.
    ///
    /// `snapshot` loads the pre-existing rows under the journal lock, so no
    /// commit can land before the watch is registered. `started` runs only
    /// once the snapshot succeeded; a failed snapshot leaves the handler
    /// untouched and returns the error.
    pub(crate) fn watch<M, H>(
        self: &Arc<Self>,
        kind: &str,
        mut handler: H,
        options: WatchOptions,
        snapshot: impl FnOnce() -> StoreResult<Vec<Row>>,
    ) -> StoreResult<Watch>
    where
        M: Model,
        H: EventHandler<M>,
    {
        let mut state = self.state.lock();
        if !state.enabled {
            return Err(StoreError::EngineClosed);
        }
        let rows = if options.snapshot {
            snapshot()?
        } else {
            Vec::new()
        };
        let id = WatchId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        handler.started(id);

        let (queue, rx) = mpsc::sync_channel(self.queue_size);
        let dropped = Arc::new(AtomicU64::new(0));
        let watch_state = WatchState::new();
        let dispatch = Dispatch::<M, H> {
            id,
            handler,
            snapshot: rows,
            kind: kind.to_string(),
            queue: rx,
            dropped: Arc::clone(&dropped),
            state: Arc::clone(&watch_state),
            _model: PhantomData,
        };
        thread::Builder::new()
            .name(format!("invdb-watch-{}", id.as_u64()))
            .spawn(move || dispatch.run())?;

        state.watches.push(WatchEntry {
            id,
            kind: kind.to_string(),
            filter: options.filter,
            queue,
            dropped,
            state: Arc::clone(&watch_state),
        });
        debug!(watch = %id, kind, snapshot = options.snapshot, "watch started");
        Ok(Watch::new(id, Arc::downgrade(self), watch_state))
    }

    /// Ends one watch. Returns false if it was not registered.
    pub(crate) fn end(&self, id: WatchId) -> bool {
        let mut state = self.state.lock();
        let Some(pos) = state.watches.iter().position(|w| w.id == id) else {
            return false;
        };
        let entry = state.watches.remove(pos);
        entry.state.stop();
        true
    }

    /// Stops accepting events and ends every watch.
    pub(crate) fn disable(&self) {
        let mut state = self.state.lock();
        state.enabled = false;
        for entry in state.watches.drain(..) {
            entry.state.stop();
        }
        debug!("journal disabled");
    }

    pub(crate) fn watch_count(&self) -> usize {
        self.state.lock().watches.len()
    }
}
