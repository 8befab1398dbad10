//! Engine facade.

use crate::cascade::{FkGraph, Relation};
use crate::config::Config;
use crate::cursor::Cursor;
use crate::error::{SqlContext, StoreError, StoreResult};
use crate::journal::{EventHandler, Journal, Watch, WatchOptions};
use crate::model::{DataModel, Definition, Model, MAX_DETAIL};
use crate::pool::{CancelToken, Pool, Role};
use crate::predicate::{ListOptions, Predicate};
use crate::row::{Labels, Row};
use crate::sql::create_statements;
use crate::store;
use crate::transaction::Tx;
use crate::types::WatchId;
use crate::value::Value;
use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) struct EngineInner {
    pub(crate) config: Config,
    pub(crate) model: DataModel,
    pub(crate) graph: FkGraph,
    pub(crate) pool: Arc<Pool>,
    pub(crate) journal: Arc<Journal>,
    is_open: RwLock<bool>,
}

impl EngineInner {
    fn shutdown(&self, purge: bool) -> StoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        self.journal.disable();
        self.pool.close();
        *is_open = false;
        debug!(path = %self.config.path.display(), purge, "engine closed");
        if purge {
            purge_files(&self.config.path)?;
        }
        Ok(())
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let _ = self.shutdown(false);
    }
}

/// The inventory store.
///
/// `Engine` owns the session pool and the journal. Handles are cheap to
/// clone and share one engine.
///
/// ```rust,ignore
/// let engine = Engine::open(Config::new().path("inv.db"), model)?;
///
/// engine.with(&["import"], |tx| {
///     tx.insert(&mut host)?;
///     tx.insert(&mut vm)?;
///     Ok::<_, StoreError>(())
/// })?;
///
/// engine.close(false)?;
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Opens (creating if needed) the database and its schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, any session fails
    /// to open, or the schema cannot be created.
    pub fn open(config: Config, mut model: DataModel) -> StoreResult<Self> {
        config.validate()?;
        if config.purge_on_open {
            purge_files(&config.path)?;
        }
        model.set_default_detail(config.default_detail);

        let pool = Pool::open(&config)?;
        if let Err(err) = create_schema(&pool, &model) {
            pool.close();
            return Err(err);
        }
        debug!(
            path = %config.path.display(),
            kinds = model.len(),
            writers = config.writers,
            readers = config.readers,
            "engine opened"
        );

        let graph = FkGraph::new(&model);
        let journal = Journal::new(config.watch_queue_size);
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                model,
                graph,
                pool,
                journal,
                is_open: RwLock::new(true),
            }),
        })
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The data model.
    #[must_use]
    pub fn model(&self) -> &DataModel {
        &self.inner.model
    }

    /// The foreign key graph.
    #[must_use]
    pub fn graph(&self) -> &FkGraph {
        &self.inner.graph
    }

    /// Checks if the engine is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.inner.is_open.read()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::EngineClosed)
        }
    }

    fn definition<M: Model>(&self) -> StoreResult<&Arc<Definition>> {
        self.inner.model.require(M::KIND)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Starts a write transaction labeled with `labels`.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread already holds an open transaction.
    pub fn begin(&self, labels: &[&str]) -> StoreResult<Tx> {
        self.ensure_open()?;
        Tx::begin(Arc::clone(&self.inner), labels, None)
    }

    /// Like [`Engine::begin`], giving up with `Cancelled` once `cancel` is signaled.
    pub fn begin_with(&self, labels: &[&str], cancel: CancelToken) -> StoreResult<Tx> {
        self.ensure_open()?;
        Tx::begin(Arc::clone(&self.inner), labels, Some(cancel))
    }

    /// Runs `f` in a transaction, committing on `Ok` and rolling back on `Err`.
    pub fn with<T, E, F>(&self, labels: &[&str], f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tx = self.begin(labels)?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback after failed block");
                }
                Err(err)
            }
        }
    }

    // ========================================================================
    // One-shot operations
    // ========================================================================

    /// Populates `model` from the stored row with the same primary key.
    pub fn get<M: Model>(&self, model: &mut M) -> StoreResult<()> {
        let def = self.definition::<M>()?;
        let mut row = Row::new();
        model.encode(&mut row)?;
        def.assign_pk(&mut row)?;
        let pk = def.pk_value(&row)?;
        let found = self.read(|conn| store::fetch(conn, def, &pk, MAX_DETAIL))?;
        let found = found.ok_or_else(|| StoreError::not_found(def.kind(), pk.key_string()))?;
        *model = M::decode(&found)?;
        Ok(())
    }

    /// Reads the row with primary key `pk`.
    pub fn get_pk<M: Model>(&self, pk: impl Into<Value>) -> StoreResult<M> {
        let def = self.definition::<M>()?;
        let pk = def.pk().as_value(&pk.into())?;
        let found = self.read(|conn| store::fetch(conn, def, &pk, MAX_DETAIL))?;
        let found = found.ok_or_else(|| StoreError::not_found(def.kind(), pk.key_string()))?;
        M::decode(&found)
    }

    /// Inserts `model` in its own transaction.
    pub fn insert<M: Model>(&self, model: &mut M) -> StoreResult<()> {
        self.with(&[], |tx| tx.insert(model))
    }

    /// Updates `model` in its own transaction.
    pub fn update<M: Model>(&self, model: &mut M) -> StoreResult<()> {
        self.with(&[], |tx| tx.update(model))
    }

    /// Updates `model` where `predicate` holds, in its own transaction.
    pub fn update_where<M: Model>(&self, model: &mut M, predicate: &Predicate) -> StoreResult<()> {
        self.with(&[], |tx| tx.update_where(model, predicate))
    }

    /// Deletes `model` and its cascade, in its own transaction.
    pub fn delete<M: Model>(&self, model: &M) -> StoreResult<()> {
        self.with(&[], |tx| tx.delete(model))
    }

    /// Committed rows matching `options`.
    pub fn list<M: Model>(&self, options: &ListOptions) -> StoreResult<Vec<M>> {
        self.find(options)?.collect()
    }

    /// Like [`Engine::list`], decoding lazily.
    pub fn find<M: Model>(&self, options: &ListOptions) -> StoreResult<Cursor<M>> {
        let def = self.definition::<M>()?;
        let rows = self.read(|conn| store::list(conn, def, options))?;
        Ok(Cursor::new(rows))
    }

    /// Number of committed rows matching `predicate`.
    pub fn count<M: Model>(&self, predicate: Option<&Predicate>) -> StoreResult<usize> {
        let def = self.definition::<M>()?;
        self.read(|conn| store::count(conn, def, predicate))
    }

    /// Labels stored for one row.
    pub fn labels<M: Model>(&self, model: &M) -> StoreResult<Labels> {
        let def = self.definition::<M>()?;
        let mut row = Row::new();
        model.encode(&mut row)?;
        def.assign_pk(&mut row)?;
        let parent = def.pk_value(&row)?.key_string();
        self.read(|conn| store::labels(conn, def.kind(), &parent))
    }

    /// Executes a raw statement on the writer; returns the rows affected.
    ///
    /// Raw statements produce no events.
    pub fn execute(&self, sql: &str) -> StoreResult<usize> {
        self.ensure_open()?;
        let lease = self.inner.pool.acquire(Role::Writer, None)?;
        let conn = lease.conn()?;
        let affected = conn.execute(sql, []).context(|| "execute".to_string())?;
        debug!(affected, "raw statement executed");
        Ok(affected)
    }

    // ========================================================================
    // Untyped primitives
    // ========================================================================

    /// Reads one row of `kind` at full detail.
    pub fn record(&self, kind: &str, pk: &Value) -> StoreResult<Option<Row>> {
        let def = self.inner.model.require(kind)?;
        let pk = def.pk().as_value(pk)?;
        self.read(|conn| store::fetch(conn, def, &pk, MAX_DETAIL))
    }

    /// Rows of `kind` matching `options`.
    pub fn records(&self, kind: &str, options: &ListOptions) -> StoreResult<Vec<Row>> {
        let def = self.inner.model.require(kind)?;
        self.read(|conn| store::list(conn, def, options))
    }

    /// Rows linked to `parent_pk` through `relation`.
    pub fn children(&self, relation: &Relation, parent_pk: &Value) -> StoreResult<Vec<Row>> {
        let child = &relation.child;
        let link = child
            .field(&relation.field)
            .ok_or_else(|| StoreError::field_type(&relation.field, "not a field of the child"))?;
        self.read(|conn| store::children(conn, child, link, parent_pk))
    }

    fn read<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> StoreResult<T>) -> StoreResult<T> {
        self.ensure_open()?;
        let lease = self.inner.pool.acquire(Role::Reader, None)?;
        let conn = lease.conn()?;
        f(conn)
    }

    // ========================================================================
    // Watches
    // ========================================================================

    /// Watches kind `M`, delivering events to `handler` on a dedicated thread.
    ///
    /// `handler.started` runs before this returns. With `options.snapshot`,
    /// every existing row is delivered as a `created` event before `parity`.
    /// If the snapshot read fails, the error is returned and `handler` is
    /// dropped without any callback.
    pub fn watch<M, H>(&self, handler: H, options: WatchOptions) -> StoreResult<Watch>
    where
        M: Model,
        H: EventHandler<M>,
    {
        self.ensure_open()?;
        let def = Arc::clone(self.definition::<M>()?);
        let kind = def.kind().to_string();
        let pool = Arc::clone(&self.inner.pool);
        self.inner
            .journal
            .watch::<M, H>(&kind, handler, options, move || {
                let lease = pool.acquire(Role::Reader, None)?;
                let conn = lease.conn()?;
                store::list(conn, &def, &ListOptions::new().detail(MAX_DETAIL))
            })
    }

    /// Ends a watch by id. Returns false if it was not live.
    pub fn end_watch(&self, id: WatchId) -> bool {
        self.inner.journal.end(id)
    }

    /// Number of live watches.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.inner.journal.watch_count()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Ends every watch and closes every session.
    ///
    /// With `purge`, the database file and its WAL companions are deleted.
    /// Operations in flight fail with `EngineClosed`.
    pub fn close(&self, purge: bool) -> StoreResult<()> {
        self.inner.shutdown(purge)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.inner.config.path)
            .field("kinds", &self.inner.model.len())
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

fn create_schema(pool: &Arc<Pool>, model: &DataModel) -> StoreResult<()> {
    let lease = pool.acquire(Role::Writer, None)?;
    let conn = lease.conn()?;
    let statements = create_statements(model);
    let batch = format!("BEGIN;\n{};\nCOMMIT;", statements.join(";\n"));
    conn.execute_batch(&batch)
        .context(|| "create schema".to_string())?;
    debug!(statements = statements.len(), "schema created");
    Ok(())
}

fn purge_files(path: &Path) -> StoreResult<()> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    for file in files {
        match fs::remove_file(&file) {
            Ok(()) => debug!(file = %file.display(), "purged"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
