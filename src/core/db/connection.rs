/// Connection Management Module
///
/// This module provides the prepared-statement connection adapter, the
/// parameters it was opened with, and `SharedConnection`, an explicitly
/// owned holder for a connection shared by one application context.

use super::dsn::{self, SqliteTarget};
use super::statement::{query_error, Statement};
use crate::config::Config;
use crate::core::{DbError, Result};
use crate::profiler::{BoundParams, Profiler, QueryCategory};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

/// Everything needed to open (or reopen) a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbParams {
    pub dsn: String,
    /// Kept for parity with server DSNs; SQLite ignores it
    pub username: String,
    /// Kept for parity with server DSNs; SQLite ignores it
    pub password: String,
    /// Applied as `PRAGMA encoding` right after opening
    pub connection_charset: Option<String>,
}

impl DbParams {
    pub fn new(dsn: impl Into<String>) -> Self {
        DbParams {
            dsn: dsn.into(),
            ..Default::default()
        }
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.connection_charset = Some(charset.into());
        self
    }
}

/// Prepared-statement connection adapter.
///
/// Owns the SQLite connection and its profiler. Every statement run through
/// this adapter is timed when the profiler is enabled.
#[derive(Debug)]
pub struct Connection {
    conn: rusqlite::Connection,
    profiler: RefCell<Profiler>,
    params: DbParams,
    started_at: DateTime<Utc>,
}

impl Connection {
    /// Opens a connection from `params`.
    ///
    /// # Errors
    ///
    /// `DbError::Config` for a DSN that is not `sqlite:`, `DbError::Database`
    /// when SQLite cannot open the database or rejects the charset.
    pub fn open(params: DbParams) -> Result<Self> {
        let conn = match SqliteTarget::from_dsn(&params.dsn)? {
            SqliteTarget::Memory => rusqlite::Connection::open_in_memory()?,
            SqliteTarget::File(path) => rusqlite::Connection::open(path)?,
        };

        if let Some(charset) = &params.connection_charset {
            conn.pragma_update(None, "encoding", charset)?;
        }

        info!("Opened connection to {}", params.dsn);

        Ok(Connection {
            conn,
            profiler: RefCell::new(Profiler::new()),
            params,
            started_at: Utc::now(),
        })
    }

    pub fn open_dsn(dsn: &str) -> Result<Self> {
        Self::open(DbParams::new(dsn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_dsn("sqlite::memory:")
    }

    /// Opens the connection described by a configuration file, with the
    /// profiler switched on when `[profiler] enabled = true`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let conn = Self::open(config.connection.db_params())?;
        conn.profiler_mut().set_enabled(config.profiling_enabled());
        Ok(conn)
    }

    pub fn db_params(&self) -> &DbParams {
        &self.params
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since the connection was opened
    pub fn age(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Shared view of the profiler.
    ///
    /// # Panics
    ///
    /// Panics while a [`profiler_mut`](Connection::profiler_mut) guard is
    /// alive. Use [`try_profiler`](Connection::try_profiler) to get an error
    /// instead.
    pub fn profiler(&self) -> Ref<'_, Profiler> {
        self.profiler.borrow()
    }

    /// Exclusive view of the profiler.
    ///
    /// # Panics
    ///
    /// Panics while any other profiler guard of this connection is alive.
    /// Use [`try_profiler_mut`](Connection::try_profiler_mut) to get an
    /// error instead.
    pub fn profiler_mut(&self) -> RefMut<'_, Profiler> {
        self.profiler.borrow_mut()
    }

    /// Like [`profiler`](Connection::profiler), with `DbError::Connection`
    /// on a borrow conflict.
    pub fn try_profiler(&self) -> Result<Ref<'_, Profiler>> {
        self.profiler
            .try_borrow()
            .map_err(|_| DbError::Connection("Profiler is mutably borrowed elsewhere".to_string()))
    }

    /// Like [`profiler_mut`](Connection::profiler_mut), with
    /// `DbError::Connection` on a borrow conflict.
    pub fn try_profiler_mut(&self) -> Result<RefMut<'_, Profiler>> {
        self.profiler
            .try_borrow_mut()
            .map_err(|_| DbError::Connection("Profiler is borrowed elsewhere".to_string()))
    }

    /// The underlying rusqlite connection, bypassing the profiler
    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Runs `op` between `query_start` and `query_end`.
    fn profiled<T>(
        &self,
        sql: &str,
        category: Option<QueryCategory>,
        op: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let handle = self.try_profiler_mut()?.query_start(sql, category);
        let outcome = op();
        self.try_profiler_mut()?.query_end(handle)?;
        outcome
    }

    /// Executes a single statement and returns the number of changed rows.
    pub fn exec(&self, sql: &str) -> Result<usize> {
        self.profiled(sql, None, || {
            self.conn.execute(sql, []).map_err(|e| query_error(e, sql))
        })
    }

    /// Prepares a profiled statement.
    ///
    /// With the profiler enabled the statement's first profile is opened
    /// here, so it shows up as the last profile before it is executed.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        let inner = self
            .conn
            .prepare(sql)
            .map_err(|e| DbError::Query(format!("Failed to prepare statement: {}\n\n{}", e, sql)))?;
        Statement::new(inner, &self.profiler, sql)
    }

    /// Prepares and executes `sql` with `binds`.
    pub fn query(&self, sql: &str, binds: &BoundParams) -> Result<Statement<'_>> {
        let mut stmt = self.prepare(sql)?;
        stmt.execute(Some(binds))?;
        Ok(stmt)
    }

    /// `INSERT INTO table (columns...) VALUES (?...)`
    pub fn insert(&self, table: &str, data: &[(&str, Value)]) -> Result<Statement<'_>> {
        if data.is_empty() {
            return self.query(&format!("INSERT INTO {} DEFAULT VALUES", table), &BoundParams::new());
        }

        let columns: Vec<&str> = data.iter().map(|(c, _)| *c).collect();
        let placeholders = vec!["?"; data.len()];
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        self.query(&sql, &BoundParams::positional(data.iter().map(|(_, v)| v.clone())))
    }

    /// `UPDATE table SET col = ?... WHERE id = ? AND ...`
    pub fn update(
        &self,
        table: &str,
        data: &[(&str, Value)],
        identifier: &[(&str, Value)],
    ) -> Result<Statement<'_>> {
        if data.is_empty() {
            return Err(DbError::Query(format!("Nothing to update in {}", table)));
        }
        if identifier.is_empty() {
            return Err(DbError::Query(format!("Refusing to update {} without criteria", table)));
        }

        let set: Vec<String> = data.iter().map(|(c, _)| format!("{} = ?", c)).collect();
        let sql = format!("UPDATE {} SET {}{}", table, set.join(", "), where_clause(identifier));
        let params = data.iter().chain(identifier.iter()).map(|(_, v)| v.clone());

        self.query(&sql, &BoundParams::positional(params))
    }

    /// `DELETE FROM table WHERE id = ? AND ...`
    pub fn delete(&self, table: &str, identifier: &[(&str, Value)]) -> Result<Statement<'_>> {
        if identifier.is_empty() {
            return Err(DbError::Query(format!("Refusing to delete from {} without criteria", table)));
        }

        let sql = format!("DELETE FROM {}{}", table, where_clause(identifier));
        self.query(&sql, &BoundParams::positional(identifier.iter().map(|(_, v)| v.clone())))
    }

    fn transaction_command(&self, label: &str, sql: &str) -> Result<&Self> {
        self.profiled(label, Some(QueryCategory::TRANSACTION), || {
            self.conn
                .execute_batch(sql)
                .map_err(|e| DbError::Transaction(e.to_string()))
        })?;
        debug!("Transaction command: {}", label);
        Ok(self)
    }

    pub fn begin_transaction(&self) -> Result<&Self> {
        self.transaction_command("begin", "BEGIN")
    }

    pub fn commit(&self) -> Result<&Self> {
        self.transaction_command("commit", "COMMIT")
    }

    pub fn roll_back(&self) -> Result<&Self> {
        self.transaction_command("rollback", "ROLLBACK")
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    pub fn quote_identifier(&self, identifier: &str) -> String {
        dsn::quote_identifier(identifier)
    }

    pub fn quote_single_identifier(&self, identifier: &str) -> String {
        dsn::quote_single_identifier(identifier)
    }
}

fn where_clause(identifier: &[(&str, Value)]) -> String {
    if identifier.is_empty() {
        return String::new();
    }
    let criteria: Vec<String> = identifier.iter().map(|(c, _)| format!("{} = ?", c)).collect();
    format!(" WHERE {}", criteria.join(" AND "))
}

/// Holder of the connection shared by one application context.
///
/// Replaces a process-wide singleton: the owner creates it, hands it where
/// it is needed and resets it explicitly. With a maximum lifetime set, an
/// expired connection is transparently reopened from its [`DbParams`] on the
/// next [`instance`](SharedConnection::instance) call.
#[derive(Debug, Default)]
pub struct SharedConnection {
    current: Option<Rc<Connection>>,
    max_lifetime: Option<Duration>,
}

impl SharedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_lifetime(max_lifetime: Option<Duration>) -> Self {
        SharedConnection {
            current: None,
            max_lifetime,
        }
    }

    /// Holder primed with the connection described by `config`, renewed
    /// after `[connection] max_lifetime_secs` when that key is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut shared = Self::with_max_lifetime(config.connection.max_lifetime());
        shared.set_instance(Connection::from_config(config)?);
        Ok(shared)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime
    }

    pub fn set_max_lifetime(&mut self, max_lifetime: Option<Duration>) {
        self.max_lifetime = max_lifetime;
    }

    pub fn set_instance(&mut self, connection: Connection) -> Rc<Connection> {
        let shared = Rc::new(connection);
        self.current = Some(Rc::clone(&shared));
        shared
    }

    /// Returns the shared connection, reopening it once it is too old.
    ///
    /// # Errors
    ///
    /// `DbError::Connection` when no connection was set; any open error
    /// when renewing.
    pub fn instance(&mut self) -> Result<Rc<Connection>> {
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| DbError::Connection("No shared connection has been set".to_string()))?;

        if let Some(max_lifetime) = self.max_lifetime {
            if current.age() >= max_lifetime {
                let params = current.db_params().clone();
                let profiling = current.try_profiler()?.enabled();
                self.current = None;
                info!("Renewing shared connection to {}", params.dsn);

                let renewed = Connection::open(params)?;
                renewed.try_profiler_mut()?.set_enabled(profiling);
                return Ok(self.set_instance(renewed));
            }
        }

        Ok(Rc::clone(current))
    }

    /// Drops the held connection
    pub fn reset_instance(&mut self) {
        self.current = None;
    }
}
