//! Change events and the handler contract.

use crate::error::StoreError;
use crate::model::Model;
use crate::row::Row;
use crate::types::WatchId;
use std::sync::Arc;

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Row inserted (or pre-existing, for snapshot events).
    Created,
    /// Row updated.
    Updated,
    /// Row deleted.
    Deleted,
}

/// A change staged by a transaction, before it is typed for a watch.
#[derive(Debug, Clone)]
pub(crate) struct RawEvent {
    pub(crate) action: Action,
    pub(crate) kind: String,
    pub(crate) current: Row,
    pub(crate) previous: Option<Row>,
    pub(crate) labels: Arc<[String]>,
}

impl RawEvent {
    pub(crate) fn created(kind: &str, current: Row, labels: &Arc<[String]>) -> Self {
        Self {
            action: Action::Created,
            kind: kind.to_string(),
            current,
            previous: None,
            labels: Arc::clone(labels),
        }
    }

    pub(crate) fn updated(kind: &str, previous: Row, current: Row, labels: &Arc<[String]>) -> Self {
        Self {
            action: Action::Updated,
            kind: kind.to_string(),
            current,
            previous: Some(previous),
            labels: Arc::clone(labels),
        }
    }

    pub(crate) fn deleted(kind: &str, current: Row, labels: &Arc<[String]>) -> Self {
        Self {
            action: Action::Deleted,
            kind: kind.to_string(),
            current,
            previous: None,
            labels: Arc::clone(labels),
        }
    }
}

/// A change delivered to a watch handler.
#[derive(Debug, Clone)]
pub struct Event<M> {
    /// What happened.
    pub action: Action,
    /// Kind of the row.
    pub kind: String,
    /// Row after the change; for deletes, the row as it was deleted.
    pub current: M,
    /// Row before an update.
    pub previous: Option<M>,
    /// Labels of the transaction that produced the change.
    pub labels: Vec<String>,
    snapshot: bool,
}

impl<M: Model> Event<M> {
    pub(crate) fn decode(raw: &RawEvent, snapshot: bool) -> crate::StoreResult<Self> {
        let previous = match &raw.previous {
            Some(row) => Some(M::decode(row)?),
            None => None,
        };
        Ok(Self {
            action: raw.action,
            kind: raw.kind.clone(),
            current: M::decode(&raw.current)?,
            previous,
            labels: raw.labels.to_vec(),
            snapshot,
        })
    }
}

impl<M> Event<M> {
    /// Returns true if the producing transaction carried `label`.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Returns true for the synthetic `created` events sent before parity.
    #[must_use]
    pub fn is_snapshot(&self) -> bool {
        self.snapshot
    }
}

/// Callbacks of a watch, invoked one at a time in delivery order.
///
/// Every callback defaults to doing nothing.
#[allow(unused_variables)]
pub trait EventHandler<M: Model>: Send + 'static {
    /// The watch was registered. Called on the caller's thread.
    fn started(&mut self, id: WatchId) {}

    /// Every pre-existing row has been delivered.
    fn parity(&mut self) {}

    /// A row was created.
    fn created(&mut self, event: Event<M>) {}

    /// A row was updated.
    fn updated(&mut self, event: Event<M>) {}

    /// A row was deleted.
    fn deleted(&mut self, event: Event<M>) {}

    /// A delivery problem; the watch continues.
    fn error(&mut self, error: StoreError) {}

    /// The watch ended. Called exactly once.
    fn end(&mut self) {}
}
