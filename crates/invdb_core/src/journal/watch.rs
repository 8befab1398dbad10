//! Watch handles and per-watch dispatch.

use crate::error::StoreError;
use crate::journal::event::{Action, Event, EventHandler, RawEvent};
use crate::journal::Journal;
use crate::model::Model;
use crate::row::Row;
use crate::types::WatchId;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// Decides from a transaction's labels whether its events are delivered.
pub type LabelFilter = Arc<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Options of a watch.
#[derive(Clone, Default)]
pub struct WatchOptions {
    /// Deliver a `created` event per pre-existing row before parity.
    pub snapshot: bool,
    /// Events from transactions this filter rejects are not queued.
    pub filter: Option<LabelFilter>,
}

impl WatchOptions {
    /// Options with no snapshot and no filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the snapshot flag.
    #[must_use]
    pub fn snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Sets a label filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Fn(&[String]) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Skips events from transactions labeled `label`.
    #[must_use]
    pub fn skip_label(self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.filter(move |labels| !labels.iter().any(|l| *l == label))
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("snapshot", &self.snapshot)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Liveness shared by the journal, the dispatcher and [`Watch`] handles.
#[derive(Default)]
pub(crate) struct WatchState {
    alive: AtomicBool,
    ended: Mutex<bool>,
    cond: Condvar,
}

impl WatchState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            ..Self::default()
        })
    }

    pub(crate) fn stop(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn mark_ended(&self) {
        self.stop();
        let mut ended = self.ended.lock();
        *ended = true;
        self.cond.notify_all();
    }
}

/// Handle to a live watch.
///
/// Dropping the handle does not end the watch.
pub struct Watch {
    id: WatchId,
    journal: Weak<Journal>,
    state: Arc<WatchState>,
}

impl Watch {
    pub(crate) fn new(id: WatchId, journal: Weak<Journal>, state: Arc<WatchState>) -> Self {
        Self { id, journal, state }
    }

    /// Watch identifier.
    #[must_use]
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Returns true until the watch is ended.
    #[must_use]
    pub fn alive(&self) -> bool {
        self.state.is_alive() && self.journal.strong_count() > 0
    }

    /// Ends the watch. Queued events are still delivered before `end()`.
    pub fn end(&self) {
        if let Some(journal) = self.journal.upgrade() {
            journal.end(self.id);
        } else {
            self.state.stop();
        }
    }

    /// Waits until the handler's `end()` has returned.
    ///
    /// Returns false on timeout.
    pub fn wait_ended(&self, timeout: Duration) -> bool {
        let mut ended = self.state.ended.lock();
        if !*ended {
            self.state.cond.wait_for(&mut ended, timeout);
        }
        *ended
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.id)
            .field("alive", &self.alive())
            .finish()
    }
}

/// Everything a dispatcher thread owns.
pub(crate) struct Dispatch<M: Model, H: EventHandler<M>> {
    pub(crate) id: WatchId,
    pub(crate) handler: H,
    pub(crate) snapshot: Vec<Row>,
    pub(crate) kind: String,
    pub(crate) queue: Receiver<RawEvent>,
    pub(crate) dropped: Arc<AtomicU64>,
    pub(crate) state: Arc<WatchState>,
    pub(crate) _model: std::marker::PhantomData<fn() -> M>,
}

impl<M: Model, H: EventHandler<M>> Dispatch<M, H> {
    /// Delivers the snapshot, signals parity, then drains the queue until it closes.
    pub(crate) fn run(mut self) {
        let snapshot = std::mem::take(&mut self.snapshot);
        let total = snapshot.len();
        for row in snapshot {
            if !self.state.is_alive() {
                break;
            }
            let raw = RawEvent {
                action: Action::Created,
                kind: self.kind.clone(),
                current: row,
                previous: None,
                labels: Arc::from(Vec::<String>::new()),
            };
            self.deliver(&raw, true);
        }
        debug!(watch = %self.id, snapshot = total, "watch reached parity");
        self.handler.parity();

        while let Ok(raw) = self.queue.recv() {
            self.deliver(&raw, false);
            let dropped = self.dropped.swap(0, Ordering::SeqCst);
            if dropped > 0 {
                self.handler.error(StoreError::QueueFull {
                    watch: self.id.as_u64(),
                    dropped,
                });
            }
        }

        self.handler.end();
        self.state.mark_ended();
        debug!(watch = %self.id, "watch ended");
    }

    fn deliver(&mut self, raw: &RawEvent, snapshot: bool) {
        match Event::<M>::decode(raw, snapshot) {
            Ok(event) => match event.action {
                Action::Created => self.handler.created(event),
                Action::Updated => self.handler.updated(event),
                Action::Deleted => self.handler.deleted(event),
            },
            Err(err) => self.handler.error(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_label_filter() {
        let opts = WatchOptions::new().snapshot(true).skip_label("echo");
        let filter = opts.filter.clone().unwrap();
        assert!(filter(&["import".to_string()]));
        assert!(!filter(&["echo".to_string()]));
        assert!(filter(&[]));
        assert!(format!("{opts:?}").contains("snapshot: true"));
    }

    #[test]
    fn wait_ended_times_out_then_succeeds() {
        let state = WatchState::new();
        let watch = Watch::new(WatchId::new(1), Weak::new(), Arc::clone(&state));
        assert!(!watch.wait_ended(Duration::from_millis(10)));
        state.mark_ended();
        assert!(watch.wait_ended(Duration::from_millis(10)));
        assert!(!watch.alive());
    }
}
