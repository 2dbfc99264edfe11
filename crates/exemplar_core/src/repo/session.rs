//! Unit-of-work session and transaction guard.
//!
//! # Responsibility
//! - Own at most one SQLite transaction per connection borrow.
//! - Stage writes and flush them before commit and before every read.
//! - Wrap write operations so they either commit completely or roll back.
//!
//! # Invariants
//! - `begin` is a no-op when a transaction is active or the connection is not
//!   live (session closed, or connection inside someone else's transaction).
//! - After a guarded call returns, no guard-owned transaction is open.
//! - After any failure inside a guarded call, no transaction is active and no
//!   writes are pending.
//! - Cancellation and deadline are checked before every storage statement.

use crate::config::{StoreConfig, TransactionMode};
use crate::repo::error::{RepoError, RepoResult};
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, InterruptHandle, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Per-session settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub transaction_mode: TransactionMode,
    /// Operations fail with `DeadlineExceeded` once this instant has passed.
    pub deadline: Option<Instant>,
}

impl SessionOptions {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

impl From<&StoreConfig> for SessionOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            transaction_mode: config.transaction_mode,
            deadline: None,
        }
    }
}

/// Cancels a session from another thread.
///
/// Cancellation is sticky: every later storage call of the session fails with
/// `RepoError::Cancelled`. A statement already running is interrupted.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    interrupt: Arc<InterruptHandle>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.interrupt.interrupt();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOp {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl WriteOp {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Upsert => "upsert",
        }
    }
}

/// Write statement staged until the next flush.
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub entity: &'static str,
    pub op: WriteOp,
    pub sql: String,
    pub params: Vec<Value>,
    /// Zero affected rows means the target row does not exist.
    pub expect_change: bool,
    /// Identity rendered for `NotFound`.
    pub id: Option<String>,
    /// Zero-based position inside a batch.
    pub item: Option<usize>,
}

struct ActiveTransaction<'conn> {
    tx: Transaction<'conn>,
    unit_id: Uuid,
    started_at: Instant,
    writes: usize,
}

/// One synchronous unit of work over a borrowed connection.
pub struct Session<'conn> {
    conn: &'conn Connection,
    tx: Option<ActiveTransaction<'conn>>,
    pending: Vec<PendingWrite>,
    options: SessionOptions,
    cancelled: Arc<AtomicBool>,
    closed: bool,
}

impl<'conn> Session<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_options(conn, SessionOptions::default())
    }

    pub fn with_options(conn: &'conn Connection, options: SessionOptions) -> Self {
        Self {
            conn,
            tx: None,
            pending: Vec::new(),
            options,
            cancelled: Arc::new(AtomicBool::new(false)),
            closed: false,
        }
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
            interrupt: Arc::new(self.conn.get_interrupt_handle()),
        }
    }

    /// Whether this session currently holds a transaction.
    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Session open and connection outside any transaction.
    pub fn is_live(&self) -> bool {
        !self.closed && self.conn.is_autocommit()
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Starts a transaction when none is active and the connection is live.
    ///
    /// Returns `true` when this call started one.
    pub fn begin(&mut self) -> RepoResult<bool> {
        if self.tx.is_some() || !self.is_live() {
            return Ok(false);
        }
        self.checkpoint()?;

        let mode = self.options.transaction_mode;
        let tx = Transaction::new_unchecked(self.conn, mode.behavior())?;
        let unit_id = Uuid::new_v4();
        debug!(
            "event=tx_begin module=repo status=ok unit_id={} mode={:?}",
            unit_id, mode
        );
        self.tx = Some(ActiveTransaction {
            tx,
            unit_id,
            started_at: Instant::now(),
            writes: 0,
        });
        Ok(true)
    }

    /// Flushes pending writes and commits.
    ///
    /// # Errors
    /// - `NoActiveTransaction` when the session holds none.
    /// - Any flush or commit failure; the transaction is rolled back first.
    pub fn commit(&mut self) -> RepoResult<()> {
        if self.tx.is_none() {
            return Err(RepoError::NoActiveTransaction);
        }
        if let Err(err) = self.flush() {
            self.abort("commit", &err);
            return Err(err);
        }
        let Some(active) = self.tx.take() else {
            return Err(RepoError::NoActiveTransaction);
        };

        let unit_id = active.unit_id;
        let writes = active.writes;
        let started_at = active.started_at;
        match active.tx.commit() {
            Ok(()) => {
                info!(
                    "event=tx_commit module=repo status=ok unit_id={} writes={} duration_ms={}",
                    unit_id,
                    writes,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                let err = RepoError::from(err);
                warn!(
                    "event=tx_commit module=repo status=error unit_id={} error_code={}",
                    unit_id,
                    err.code()
                );
                Err(err)
            }
        }
    }

    /// Discards pending writes and rolls back. No-op without a transaction.
    pub fn rollback(&mut self) -> RepoResult<()> {
        self.pending.clear();
        let Some(active) = self.tx.take() else {
            return Ok(());
        };
        let unit_id = active.unit_id;
        active.tx.rollback()?;
        info!(
            "event=tx_rollback module=repo status=ok unit_id={} reason=requested",
            unit_id
        );
        Ok(())
    }

    /// Rolls back anything open and refuses further work.
    pub fn close(&mut self) -> RepoResult<()> {
        let result = self.rollback();
        self.closed = true;
        result
    }

    /// Executes staged writes inside the active transaction.
    ///
    /// Returns the number of statements executed.
    ///
    /// # Errors
    /// - `NoActiveTransaction` when writes are pending without a transaction.
    /// - The first failing write; a batch item surfaces as `BatchAborted`.
    ///   Remaining writes are discarded.
    pub fn flush(&mut self) -> RepoResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        if self.tx.is_none() {
            self.pending.clear();
            return Err(RepoError::NoActiveTransaction);
        }

        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for write in &pending {
            if let Err(err) = self.execute(write) {
                return Err(match write.item {
                    Some(index) => RepoError::batch_aborted(index, err),
                    None => err,
                });
            }
        }

        if let Some(active) = self.tx.as_mut() {
            active.writes += count;
            debug!(
                "event=flush module=repo status=ok unit_id={} statements={}",
                active.unit_id, count
            );
        }
        Ok(count)
    }

    fn execute(&self, write: &PendingWrite) -> RepoResult<()> {
        self.checkpoint()?;
        let changed = self
            .conn
            .prepare_cached(&write.sql)
            .and_then(|mut stmt| stmt.execute(params_from_iter(write.params.iter())))
            .map_err(|err| RepoError::from_storage(err, write.entity))?;
        if write.expect_change && changed == 0 {
            return Err(RepoError::NotFound {
                entity: write.entity,
                id: write.id.clone().unwrap_or_default(),
            });
        }
        debug!(
            "event=write module=repo status=ok entity={} op={} changed={}",
            write.entity,
            write.op.as_str(),
            changed
        );
        Ok(())
    }

    pub(crate) fn stage(&mut self, write: PendingWrite) {
        self.pending.push(write);
    }

    /// Executes `write` immediately, after flushing earlier staged writes.
    ///
    /// Returns the rowid of the last insert on the connection.
    pub(crate) fn execute_now(&mut self, write: PendingWrite) -> RepoResult<i64> {
        if self.tx.is_none() {
            return Err(RepoError::NoActiveTransaction);
        }
        self.flush()?;
        self.execute(&write)?;
        if let Some(active) = self.tx.as_mut() {
            active.writes += 1;
        }
        Ok(self.conn.last_insert_rowid())
    }

    /// Readies the connection for a read and hands it out.
    ///
    /// # Errors
    /// - `SessionClosed` after `close`.
    /// - `ForeignTransaction` when the connection is inside a transaction this
    ///   session does not own.
    /// - `Cancelled` / `DeadlineExceeded`, or a failed flush of pending writes.
    pub(crate) fn prepare_read(&mut self) -> RepoResult<&'conn Connection> {
        if self.closed {
            return Err(RepoError::SessionClosed);
        }
        if self.tx.is_none() && !self.conn.is_autocommit() {
            return Err(RepoError::ForeignTransaction);
        }
        self.checkpoint()?;
        self.flush()?;
        Ok(self.conn)
    }

    /// Fails once the session is cancelled or past its deadline.
    pub(crate) fn checkpoint(&self) -> RepoResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(RepoError::Cancelled);
        }
        match self.options.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(RepoError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Runs `work` as one all-or-nothing write.
    ///
    /// Without an active transaction the guard owns one: begin, run, flush,
    /// commit. Inside the caller's transaction it runs and flushes, leaving
    /// the commit to the caller. Any failure rolls the transaction back and is
    /// returned unchanged.
    ///
    /// # Errors
    /// - `NoActiveTransaction` when no transaction could be started.
    /// - The first error raised by `work`, the flush or the commit.
    pub fn guarded<R, F>(&mut self, operation: &'static str, work: F) -> RepoResult<R>
    where
        F: FnOnce(&mut Self) -> RepoResult<R>,
    {
        let owned = match self.begin() {
            Ok(owned) => owned,
            Err(err) => {
                self.abort(operation, &err);
                return Err(err);
            }
        };
        if self.tx.is_none() {
            warn!(
                "event=guard module=repo status=error op={} error_code=no_active_transaction closed={}",
                operation, self.closed
            );
            return Err(RepoError::NoActiveTransaction);
        }

        let result = self
            .checkpoint()
            .and_then(|()| work(self))
            .and_then(|value| self.flush().map(|_| value));
        let result = match result {
            Ok(value) if owned => self.commit().map(|()| value),
            other => other,
        };

        if let Err(err) = &result {
            self.abort(operation, err);
        }
        result
    }

    fn abort(&mut self, operation: &'static str, cause: &RepoError) {
        self.pending.clear();
        let Some(active) = self.tx.take() else {
            return;
        };
        let unit_id = active.unit_id;
        match active.tx.rollback() {
            Ok(()) => info!(
                "event=tx_rollback module=repo status=ok unit_id={} op={} reason={}",
                unit_id,
                operation,
                cause.code()
            ),
            Err(err) => warn!(
                "event=tx_rollback module=repo status=error unit_id={} op={} reason={} error={}",
                unit_id,
                operation,
                cause.code(),
                err
            ),
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Some(active) = &self.tx {
            // The transaction rolls back when dropped.
            warn!(
                "event=tx_rollback module=repo status=ok unit_id={} reason=session_dropped pending={}",
                active.unit_id,
                self.pending.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PendingWrite, Session, SessionOptions, WriteOp};
    use crate::repo::error::RepoError;
    use rusqlite::Connection;
    use std::time::{Duration, Instant};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE item (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);")
            .unwrap();
        conn
    }

    fn insert(name: &str) -> PendingWrite {
        PendingWrite {
            entity: "Item",
            op: WriteOp::Insert,
            sql: "INSERT INTO item (name) VALUES (?);".to_string(),
            params: vec![name.to_string().into()],
            expect_change: false,
            id: None,
            item: None,
        }
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM item;", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn begin_while_active_is_a_no_op() {
        let conn = setup();
        let mut session = Session::new(&conn);
        assert!(session.begin().unwrap());
        assert!(!session.begin().unwrap());
        session.commit().unwrap();
        assert!(!session.is_active());
    }

    #[test]
    fn guard_joins_caller_transaction_and_leaves_commit_to_it() {
        let conn = setup();
        let mut session = Session::new(&conn);
        session.begin().unwrap();
        session
            .guarded("insert", |session| {
                session.stage(insert("a"));
                Ok(())
            })
            .unwrap();
        assert!(session.is_active());
        session.rollback().unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn guard_failure_rolls_back_and_clears_state() {
        let conn = setup();
        let mut session = Session::new(&conn);
        let err = session
            .guarded("insert", |session| {
                session.stage(insert("a"));
                session.stage(insert("a"));
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, RepoError::ConstraintViolation { .. }));
        assert!(!session.is_active());
        assert_eq!(session.pending_writes(), 0);
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn expired_deadline_fails_before_touching_storage() {
        let conn = setup();
        let options = SessionOptions::default().with_deadline(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
        let mut session = Session::with_options(&conn, options);
        let err = session.begin().unwrap_err();
        assert!(matches!(err, RepoError::DeadlineExceeded));
        assert!(!session.is_active());
    }
}
