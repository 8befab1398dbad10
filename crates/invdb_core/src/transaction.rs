//! Write transactions.

use crate::cursor::Cursor;
use crate::engine::EngineInner;
use crate::error::{SqlContext, StoreError, StoreResult};
use crate::journal::RawEvent;
use crate::model::{Definition, Model, MAX_DETAIL};
use crate::pool::{CancelToken, Lease, Role};
use crate::predicate::{ListOptions, Predicate};
use crate::row::{Labels, Row};
use crate::store;
use crate::value::Value;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{debug, warn};

/// A write transaction holding the engine's writer session.
///
/// Events are staged privately and reach watches only on [`Tx::commit`].
/// Dropping an uncommitted transaction rolls it back.
pub struct Tx {
    inner: Arc<EngineInner>,
    lease: Option<Lease>,
    labels: Arc<[String]>,
    staged: Vec<RawEvent>,
    cancel: Option<CancelToken>,
}

impl Tx {
    pub(crate) fn begin(
        inner: Arc<EngineInner>,
        labels: &[&str],
        cancel: Option<CancelToken>,
    ) -> StoreResult<Self> {
        let lease = inner.pool.acquire(Role::Writer, cancel.as_ref())?;
        lease
            .conn()?
            .execute_batch("BEGIN IMMEDIATE")
            .context(|| "begin transaction".to_string())?;
        debug!(session = %lease.session()?.id(), "transaction started");
        Ok(Self {
            inner,
            lease: Some(lease),
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            staged: Vec::new(),
            cancel,
        })
    }

    /// Labels attached to this transaction's events.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of events staged so far.
    #[must_use]
    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    fn conn(&self) -> StoreResult<&Connection> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(StoreError::Cancelled);
        }
        self.lease
            .as_ref()
            .ok_or_else(|| StoreError::invalid_operation("transaction already ended"))?
            .conn()
    }

    fn definition<M: Model>(&self) -> StoreResult<Arc<Definition>> {
        self.inner.model.require(M::KIND).map(Arc::clone)
    }

    /// Encodes `model` and assigns a generated primary key.
    fn encode<M: Model>(def: &Definition, model: &M) -> StoreResult<(Row, Value)> {
        let mut row = Row::new();
        model.encode(&mut row)?;
        def.assign_pk(&mut row)?;
        let pk = def.pk_value(&row)?;
        Ok((row, pk))
    }

    /// Populates `model` from the stored row with the same primary key.
    pub fn get<M: Model>(&self, model: &mut M) -> StoreResult<()> {
        let def = self.definition::<M>()?;
        let (_, pk) = Self::encode(&def, model)?;
        let row = store::fetch(self.conn()?, &def, &pk, MAX_DETAIL)?
            .ok_or_else(|| StoreError::not_found(def.kind(), pk.key_string()))?;
        *model = M::decode(&row)?;
        Ok(())
    }

    /// Reads the row with primary key `pk`.
    pub fn get_pk<M: Model>(&self, pk: impl Into<Value>) -> StoreResult<M> {
        let def = self.definition::<M>()?;
        let pk = def.pk().as_value(&pk.into())?;
        let row = store::fetch(self.conn()?, &def, &pk, MAX_DETAIL)?
            .ok_or_else(|| StoreError::not_found(def.kind(), pk.key_string()))?;
        M::decode(&row)
    }

    /// Inserts `model`; an existing row with the same key is updated instead.
    ///
    /// On return `model` reflects the stored row (revision, generated key).
    pub fn insert<M: Model>(&mut self, model: &mut M) -> StoreResult<()> {
        let def = self.definition::<M>()?;
        let (row, pk) = Self::encode(&def, model)?;
        let conn = self.conn()?;

        if let Some(current) = store::revision(conn, &def, &pk)? {
            debug!(kind = def.kind(), pk = %pk, "insert of existing row becomes update");
            return self.apply_update(&def, model, row, pk, Some(current), None);
        }

        store::insert(conn, &def, &row)?;
        let parent = pk.key_string();
        store::replace_labels(conn, def.kind(), &parent, &model.labels())?;
        let stored = store::fetch(conn, &def, &pk, MAX_DETAIL)?
            .ok_or_else(|| StoreError::not_found(def.kind(), &parent))?;
        *model = M::decode(&stored)?;
        self.staged
            .push(RawEvent::created(def.kind(), stored, &self.labels));
        Ok(())
    }

    /// Updates `model` at the revision it carries.
    ///
    /// Fails with `Conflict` if the stored revision moved on, `NotFound` if
    /// the row is gone.
    pub fn update<M: Model>(&mut self, model: &mut M) -> StoreResult<()> {
        let def = self.definition::<M>()?;
        let (row, pk) = Self::encode(&def, model)?;
        let expected = expected_revision(&def, &row)?;
        self.apply_update(&def, model, row, pk, expected, None)
    }

    /// Like [`Tx::update`], also requiring `predicate` to hold for the stored row.
    pub fn update_where<M: Model>(&mut self, model: &mut M, predicate: &Predicate) -> StoreResult<()> {
        let def = self.definition::<M>()?;
        let (row, pk) = Self::encode(&def, model)?;
        let expected = expected_revision(&def, &row)?;
        self.apply_update(&def, model, row, pk, expected, Some(predicate))
    }

    fn apply_update<M: Model>(
        &mut self,
        def: &Definition,
        model: &mut M,
        row: Row,
        pk: Value,
        expected: Option<i64>,
        filter: Option<&Predicate>,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let parent = pk.key_string();
        let previous = store::fetch(conn, def, &pk, MAX_DETAIL)?
            .ok_or_else(|| StoreError::not_found(def.kind(), &parent))?;

        if store::update(conn, def, &row, expected, filter)? == 0 {
            return Err(match store::revision(conn, def, &pk)? {
                None => StoreError::not_found(def.kind(), &parent),
                Some(rev) if def.incremented().is_some() && Some(rev) != expected => {
                    StoreError::conflict(def.kind(), &parent)
                }
                Some(_) if filter.is_none() => StoreError::conflict(def.kind(), &parent),
                Some(_) => StoreError::not_found(def.kind(), &parent),
            });
        }

        store::replace_labels(conn, def.kind(), &parent, &model.labels())?;
        let current = store::fetch(conn, def, &pk, MAX_DETAIL)?
            .ok_or_else(|| StoreError::not_found(def.kind(), &parent))?;
        *model = M::decode(&current)?;
        self.staged
            .push(RawEvent::updated(def.kind(), previous, current, &self.labels));
        Ok(())
    }

    /// Deletes `model` and every row reachable through `+cascade` links.
    ///
    /// Deleting a missing row succeeds. Events are staged leaves first.
    pub fn delete<M: Model>(&mut self, model: &M) -> StoreResult<()> {
        let def = self.definition::<M>()?;
        let (_, pk) = Self::encode(&def, model)?;
        let conn = self.conn()?;
        let Some(root) = store::fetch(conn, &def, &pk, MAX_DETAIL)? else {
            return Ok(());
        };

        let doomed = self.inner.graph.cascade_deleted(conn, &def, &root)?;
        let mut events = Vec::with_capacity(doomed.len() + 1);
        for (child, row) in doomed {
            let child_pk = child.pk_value(&row)?;
            store::delete(conn, &child, &child_pk)?;
            store::delete_labels(conn, child.kind(), &child_pk.key_string())?;
            events.push(RawEvent::deleted(child.kind(), row, &self.labels));
        }
        store::delete(conn, &def, &pk)?;
        store::delete_labels(conn, def.kind(), &pk.key_string())?;
        events.push(RawEvent::deleted(def.kind(), root, &self.labels));

        debug!(kind = def.kind(), pk = %pk, rows = events.len(), "delete staged");
        self.staged.extend(events);
        Ok(())
    }

    /// Rows matching `options`, as seen by this transaction.
    pub fn list<M: Model>(&self, options: &ListOptions) -> StoreResult<Vec<M>> {
        self.find(options)?.collect()
    }

    /// Like [`Tx::list`], decoding lazily.
    pub fn find<M: Model>(&self, options: &ListOptions) -> StoreResult<Cursor<M>> {
        let def = self.definition::<M>()?;
        Ok(Cursor::new(store::list(self.conn()?, &def, options)?))
    }

    /// Number of rows matching `predicate`.
    pub fn count<M: Model>(&self, predicate: Option<&Predicate>) -> StoreResult<usize> {
        let def = self.definition::<M>()?;
        store::count(self.conn()?, &def, predicate)
    }

    /// Labels stored for one row.
    pub fn row_labels<M: Model>(&self, model: &M) -> StoreResult<Labels> {
        let def = self.definition::<M>()?;
        let (_, pk) = Self::encode(&def, model)?;
        store::labels(self.conn()?, def.kind(), &pk.key_string())
    }

    /// Commits and hands the staged events to the journal.
    pub fn commit(mut self) -> StoreResult<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(StoreError::Cancelled);
        }
        let lease = self
            .lease
            .take()
            .ok_or_else(|| StoreError::invalid_operation("transaction already ended"))?;
        let staged = std::mem::take(&mut self.staged);
        let events = staged.len();
        self.inner.journal.commit(staged, || {
            lease
                .conn()?
                .execute_batch("COMMIT")
                .context(|| "commit transaction".to_string())
        })?;
        debug!(events, "transaction committed");
        Ok(())
    }

    /// Rolls back and discards the staged events.
    pub fn rollback(mut self) -> StoreResult<()> {
        self.abort()
    }

    /// Ends the transaction, rolling back unless it was committed.
    pub fn end(self) -> StoreResult<()> {
        self.rollback()
    }

    fn abort(&mut self) -> StoreResult<()> {
        let discarded = std::mem::take(&mut self.staged).len();
        let Some(lease) = self.lease.take() else {
            return Ok(());
        };
        let conn = lease.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")
                .context(|| "rollback transaction".to_string())?;
        }
        debug!(discarded, "transaction rolled back");
        Ok(())
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.lease.is_some() {
            if let Err(err) = self.abort() {
                warn!(error = %err, "rollback on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("labels", &self.labels)
            .field("staged", &self.staged.len())
            .field("open", &self.lease.is_some())
            .finish()
    }
}

fn expected_revision(def: &Definition, row: &Row) -> StoreResult<Option<i64>> {
    def.incremented()
        .map(|field| row.get::<i64>(&field.name))
        .transpose()
}
