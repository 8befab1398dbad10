//! Recording watch handler.
//!
//! The handler runs on the watch's dispatcher thread; tests read what it
//! saw through the shared [`Recorder`], waiting for deliveries with a
//! timeout instead of sleeping.

use invdb_core::{Action, Event, EventHandler, Model, WatchId};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One callback observed by a [`RecordingHandler`].
#[derive(Debug, Clone)]
pub enum Recorded<M> {
    /// `started` with the watch id.
    Started(WatchId),
    /// `parity`.
    Parity,
    /// `created`, `updated` or `deleted`.
    Event(Event<M>),
    /// `error`, rendered.
    Error(String),
    /// `end`.
    End,
}

impl<M> Recorded<M> {
    /// The event, if this entry is one.
    pub fn event(&self) -> Option<&Event<M>> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }
}

/// Shared log of callbacks.
#[derive(Debug)]
pub struct Recorder<M> {
    log: Mutex<Vec<Recorded<M>>>,
    changed: Condvar,
}

impl<M: Clone> Recorder<M> {
    fn push(&self, entry: Recorded<M>) {
        self.log.lock().push(entry);
        self.changed.notify_all();
    }

    /// Copy of everything recorded so far.
    pub fn entries(&self) -> Vec<Recorded<M>> {
        self.log.lock().clone()
    }

    /// Recorded events, in delivery order.
    pub fn events(&self) -> Vec<Event<M>> {
        self.log
            .lock()
            .iter()
            .filter_map(Recorded::event)
            .cloned()
            .collect()
    }

    /// Recorded events of one action.
    pub fn events_of(&self, action: Action) -> Vec<Event<M>> {
        self.events()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }

    /// Recorded error messages.
    pub fn errors(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|r| match r {
                Recorded::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Position of the parity signal in the log.
    pub fn parity_index(&self) -> Option<usize> {
        self.log
            .lock()
            .iter()
            .position(|r| matches!(r, Recorded::Parity))
    }

    /// Returns true once `end` was recorded.
    pub fn ended(&self) -> bool {
        self.log.lock().iter().any(|r| matches!(r, Recorded::End))
    }

    /// Waits until `done` holds for the log, or `timeout` passes.
    pub fn wait_until(&self, timeout: Duration, done: impl Fn(&[Recorded<M>]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut log = self.log.lock();
        while !done(&log) {
            if self.changed.wait_until(&mut log, deadline).timed_out() {
                return done(&log);
            }
        }
        true
    }

    /// Waits until at least `count` events were recorded.
    pub fn wait_events(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| {
            log.iter().filter(|r| r.event().is_some()).count() >= count
        })
    }

    /// Waits for parity.
    pub fn wait_parity(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| log.iter().any(|r| matches!(r, Recorded::Parity)))
    }

    /// Waits for `end`.
    pub fn wait_end(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| log.iter().any(|r| matches!(r, Recorded::End)))
    }
}

/// Handler recording every callback.
#[derive(Debug)]
pub struct RecordingHandler<M> {
    recorder: Arc<Recorder<M>>,
}

impl<M: Clone> RecordingHandler<M> {
    /// A handler and the recorder it writes to.
    pub fn new() -> (Self, Arc<Recorder<M>>) {
        let recorder = Arc::new(Recorder {
            log: Mutex::new(Vec::new()),
            changed: Condvar::new(),
        });
        (
            Self {
                recorder: Arc::clone(&recorder),
            },
            recorder,
        )
    }
}

impl<M: Model + Clone + Sync> EventHandler<M> for RecordingHandler<M> {
    fn started(&mut self, id: WatchId) {
        self.recorder.push(Recorded::Started(id));
    }

    fn parity(&mut self) {
        self.recorder.push(Recorded::Parity);
    }

    fn created(&mut self, event: Event<M>) {
        self.recorder.push(Recorded::Event(event));
    }

    fn updated(&mut self, event: Event<M>) {
        self.recorder.push(Recorded::Event(event));
    }

    fn deleted(&mut self, event: Event<M>) {
        self.recorder.push(Recorded::Event(event));
    }

    fn error(&mut self, error: invdb_core::StoreError) {
        self.recorder.push(Recorded::Error(error.to_string()));
    }

    fn end(&mut self) {
        self.recorder.push(Recorded::End);
    }
}

/// Default wait used by tests.
pub const WAIT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;
    use crate::models::Item;
    use invdb_core::WatchOptions;

    #[test]
    fn records_lifecycle() {
        let store = TestStore::new();
        let (handler, recorder) = RecordingHandler::<Item>::new();
        let watch = store.watch::<Item, _>(handler, WatchOptions::new()).unwrap();
        assert!(matches!(recorder.entries()[0], Recorded::Started(id) if id == watch.id()));
        assert!(recorder.wait_parity(WAIT));

        store.insert(&mut Item::new(1, "a")).unwrap();
        assert!(recorder.wait_events(1, WAIT));
        assert_eq!(recorder.events_of(Action::Created).len(), 1);

        watch.end();
        assert!(recorder.wait_end(WAIT));
        assert!(recorder.ended());
    }
}
