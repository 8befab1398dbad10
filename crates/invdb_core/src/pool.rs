//! Session pool: a fixed set of writer and reader connections.
//!
//! Sessions are handed out through two bounded channels. A [`Lease`] returns
//! its session on drop, rolling back anything left open.

use crate::config::Config;
use crate::error::{SqlContext, StoreError, StoreResult};
use crate::types::SessionId;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, warn};

/// How long an acquisition waits before re-checking cancellation.
const POLL: Duration = Duration::from_millis(20);

/// Cooperative cancellation signal for blocking operations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unsignaled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once signaled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Writer,
    Reader,
}

/// One physical connection.
pub(crate) struct Session {
    id: SessionId,
    conn: Connection,
    closed: Arc<AtomicBool>,
}

impl Session {
    /// The connection, unless the pool has been closed.
    pub(crate) fn conn(&self) -> StoreResult<&Connection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::EngineClosed);
        }
        Ok(&self.conn)
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }
}

struct Channel {
    tx: SyncSender<Session>,
    rx: Mutex<Receiver<Session>>,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn drain(&self) -> usize {
        let rx = self.rx.lock();
        let mut n = 0;
        while rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

/// Writer and reader sessions of one database file.
pub(crate) struct Pool {
    writers: Channel,
    readers: Channel,
    closed: Arc<AtomicBool>,
    writer_threads: Mutex<HashSet<ThreadId>>,
}

impl Pool {
    /// Opens `writers + readers` connections to the configured file.
    ///
    /// If any connection fails to open, the pool is closed and the error returned.
    pub(crate) fn open(config: &Config) -> StoreResult<Arc<Self>> {
        let pool = Arc::new(Self {
            writers: Channel::new(config.writers),
            readers: Channel::new(config.readers),
            closed: Arc::new(AtomicBool::new(false)),
            writer_threads: Mutex::new(HashSet::new()),
        });

        let total = config.writers + config.readers;
        for n in 0..total {
            let id = SessionId::new(n);
            let role = if n < config.writers {
                Role::Writer
            } else {
                Role::Reader
            };
            let conn = match open_connection(&config.path, config.busy_timeout, role) {
                Ok(conn) => conn,
                Err(err) => {
                    pool.close();
                    return Err(err);
                }
            };
            let session = Session {
                id,
                conn,
                closed: Arc::clone(&pool.closed),
            };
            if pool.channel(role).tx.try_send(session).is_err() {
                pool.close();
                return Err(StoreError::invalid_operation("session channel rejected a session"));
            }
            debug!(session = %id, ?role, "session opened");
        }
        Ok(pool)
    }

    fn channel(&self, role: Role) -> &Channel {
        match role {
            Role::Writer => &self.writers,
            Role::Reader => &self.readers,
        }
    }

    /// Blocks until a session of `role` is free.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread already holds a writer and asks for another.
    pub(crate) fn acquire(
        self: &Arc<Self>,
        role: Role,
        cancel: Option<&CancelToken>,
    ) -> StoreResult<Lease> {
        let owner = if role == Role::Writer {
            let me = thread::current().id();
            assert!(
                self.writer_threads.lock().insert(me),
                "thread {me:?} requested a second writer session while holding one"
            );
            Some(me)
        } else {
            None
        };

        let release_owner = || {
            if let Some(me) = owner {
                self.writer_threads.lock().remove(&me);
            }
        };

        let channel = self.channel(role);
        loop {
            if self.is_closed() {
                release_owner();
                return Err(StoreError::EngineClosed);
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                release_owner();
                return Err(StoreError::Cancelled);
            }
            let Some(rx) = channel.rx.try_lock_for(POLL) else {
                continue;
            };
            match rx.recv_timeout(POLL) {
                Ok(session) => {
                    drop(rx);
                    if self.is_closed() {
                        release_owner();
                        return Err(StoreError::EngineClosed);
                    }
                    return Ok(Lease {
                        session: Some(session),
                        pool: Arc::clone(self),
                        role,
                        owner,
                    });
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    release_owner();
                    return Err(StoreError::EngineClosed);
                }
            }
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks every session closed and drops the idle ones.
    ///
    /// Leased sessions are dropped when their lease ends.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let idle = self.writers.drain() + self.readers.drain();
        debug!(idle, "session pool closed");
    }

    fn release(&self, role: Role, session: Session) {
        if self.is_closed() {
            debug!(session = %session.id, "session dropped after close");
            return;
        }
        if !session.conn.is_autocommit() {
            if let Err(err) = session.conn.execute_batch("ROLLBACK") {
                warn!(session = %session.id, error = %err, "rollback on release failed");
            }
        }
        if self.channel(role).tx.try_send(session).is_err() {
            warn!("session channel full on release");
        }
    }
}

/// A session checked out of the pool.
pub(crate) struct Lease {
    session: Option<Session>,
    pool: Arc<Pool>,
    role: Role,
    owner: Option<ThreadId>,
}

impl Lease {
    /// The leased session.
    pub(crate) fn session(&self) -> StoreResult<&Session> {
        self.session.as_ref().ok_or(StoreError::EngineClosed)
    }

    /// The leased connection.
    pub(crate) fn conn(&self) -> StoreResult<&Connection> {
        self.session()?.conn()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(self.role, session);
        }
        if let Some(me) = self.owner {
            self.pool.writer_threads.lock().remove(&me);
        }
    }
}

fn open_connection(path: &Path, busy_timeout: Duration, role: Role) -> StoreResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)
        .context(|| format!("open {}", path.display()))?;
    conn.busy_timeout(busy_timeout)
        .context(|| "set busy timeout".to_string())?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;\n\
         PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;",
    )
    .context(|| "configure session".to_string())?;
    if role == Role::Reader {
        conn.execute_batch("PRAGMA query_only = ON")
            .context(|| "configure reader".to_string())?;
    }
    Ok(conn)
}
