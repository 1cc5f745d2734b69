/// Cursor Connection Module
///
/// The procedural adapter: run one query at a time and walk its records
/// with `next_record` / `field`. The connection is opened lazily on first
/// use and can be dropped with `reset`.

use super::dsn::{escape_literal, SqliteTarget};
use super::record::{ColumnMeta, Record};
use super::statement::query_error;
use crate::core::{DbError, Result};
use crate::profiler::Profiler;
use rusqlite::types::Value;
use serde::Deserialize;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Connection settings of a [`CursorConnection`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CursorParams {
    pub dsn: String,
    #[serde(default)]
    pub connection_charset: Option<String>,
    /// Time every query through the adapter's profiler
    #[serde(default)]
    pub enable_profiling: bool,
}

/// What a query produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// A result set with this many rows is now active
    Rows(usize),
    /// No result set; this many rows were changed
    Changed(usize),
}

#[derive(Debug)]
struct ResultSet {
    rows: VecDeque<Record>,
    num_rows: usize,
}

/// Procedural, record-at-a-time adapter.
#[derive(Debug)]
pub struct CursorConnection {
    params: CursorParams,
    conn: Option<rusqlite::Connection>,
    profiler: Profiler,
    result: Option<ResultSet>,
    record: Option<Record>,
    affected_rows: usize,
}

impl CursorConnection {
    pub fn new(params: CursorParams) -> Self {
        let mut profiler = Profiler::new();
        profiler.set_enabled(params.enable_profiling);

        CursorConnection {
            params,
            conn: None,
            profiler,
            result: None,
            record: None,
            affected_rows: 0,
        }
    }

    fn connect(&mut self) -> Result<&rusqlite::Connection> {
        if self.conn.is_none() {
            let conn = match SqliteTarget::from_dsn(&self.params.dsn)? {
                SqliteTarget::Memory => rusqlite::Connection::open_in_memory()?,
                SqliteTarget::File(path) => rusqlite::Connection::open(path)?,
            };
            if let Some(charset) = &self.params.connection_charset {
                conn.pragma_update(None, "encoding", charset)?;
            }
            info!("Cursor connection opened to {}", self.params.dsn);
            self.conn = Some(conn);
        }

        self.conn
            .as_ref()
            .ok_or_else(|| DbError::Connection("Connection unavailable".to_string()))
    }

    /// The live connection, opening it if needed
    pub fn connection(&mut self) -> Result<&rusqlite::Connection> {
        self.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Closes the connection; the next call reconnects.
    pub fn reset(&mut self) {
        if self.conn.take().is_some() {
            debug!("Cursor connection closed");
        }
        self.free();
    }

    pub fn params(&self) -> &CursorParams {
        &self.params
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut Profiler {
        &mut self.profiler
    }

    /// Escapes `value` for a single-quoted literal.
    pub fn escape(&self, value: impl ToString) -> String {
        escape_literal(&value.to_string())
    }

    /// Drops the active result set and current record.
    pub fn free(&mut self) -> &mut Self {
        self.result = None;
        self.record = None;
        self
    }

    /// Runs `sql`, replacing any active result set.
    ///
    /// # Errors
    ///
    /// `DbError::Query` whose message contains the SQLite error followed by
    /// the SQL text.
    pub fn query(&mut self, sql: &str) -> Result<QueryOutcome> {
        self.connect()?;
        self.free();

        let handle = self.profiler.query_start(sql, None);
        let outcome = match &self.conn {
            Some(conn) => run_query(conn, sql),
            None => Err(DbError::Connection("Connection unavailable".to_string())),
        };
        self.profiler.query_end(handle)?;

        match outcome? {
            (Some(rows), _) => {
                let num_rows = rows.len();
                self.affected_rows = num_rows;
                self.result = Some(ResultSet { rows, num_rows });
                Ok(QueryOutcome::Rows(num_rows))
            }
            (None, changed) => {
                self.affected_rows = changed;
                Ok(QueryOutcome::Changed(changed))
            }
        }
    }

    /// Moves to the next record of the active result set.
    ///
    /// Returns `false` once the rows are exhausted, freeing the result set.
    pub fn next_record(&mut self) -> Result<bool> {
        let result = self
            .result
            .as_mut()
            .ok_or_else(|| DbError::Query("No query active for next_record()".to_string()))?;

        self.record = result.rows.pop_front();
        let has_record = self.record.is_some();
        if !has_record {
            self.free();
        }
        Ok(has_record)
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    /// Column of the current record
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.record.as_ref().and_then(|r| r.get(name))
    }

    /// Rows changed by the last statement, or returned by the last query
    pub fn affected_rows(&self) -> usize {
        self.affected_rows
    }

    pub fn num_rows(&self) -> Result<usize> {
        self.result
            .as_ref()
            .map(|r| r.num_rows)
            .ok_or_else(|| DbError::Query("No result set active for num_rows()".to_string()))
    }

    /// Column names and declared types of `table`.
    pub fn metadata(&mut self, table: &str) -> Result<Vec<ColumnMeta>> {
        self.connect()?;
        let sql = format!("SELECT * FROM {} WHERE 0", table);

        let handle = self.profiler.query_start(&sql, None);
        let columns = match &self.conn {
            Some(conn) => describe(conn, &sql),
            None => Err(DbError::Connection("Connection unavailable".to_string())),
        };
        self.profiler.query_end(handle)?;
        self.free();

        columns
    }

    pub fn last_insert_id(&mut self) -> Result<i64> {
        Ok(self.connect()?.last_insert_rowid())
    }
}

/// Executes `sql`, buffering rows when it produces a result set.
fn run_query(conn: &rusqlite::Connection, sql: &str) -> Result<(Option<VecDeque<Record>>, usize)> {
    let mut stmt = conn.prepare(sql).map_err(|e| query_error(e, sql))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    if columns.is_empty() {
        let changed = stmt.raw_execute().map_err(|e| query_error(e, sql))?;
        return Ok((None, changed));
    }

    let mut buffered = VecDeque::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().map_err(|e| query_error(e, sql))? {
        buffered.push_back(Record::from_row(&columns, row).map_err(|e| query_error(e, sql))?);
    }
    Ok((Some(buffered), 0))
}

fn describe(conn: &rusqlite::Connection, sql: &str) -> Result<Vec<ColumnMeta>> {
    let stmt = conn.prepare(sql).map_err(|e| query_error(e, sql))?;
    Ok(stmt
        .columns()
        .into_iter()
        .map(|c| ColumnMeta {
            name: c.name().to_string(),
            decl_type: c.decl_type().map(String::from),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::QueryCategory;

    fn memory_params() -> CursorParams {
        CursorParams {
            dsn: "sqlite::memory:".to_string(),
            connection_charset: Some("UTF-8".to_string()),
            enable_profiling: false,
        }
    }

    fn setup() -> CursorConnection {
        let mut db = CursorConnection::new(memory_params());
        db.query("CREATE TABLE user (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
        db.query("INSERT INTO user (name) VALUES ('Alice'), ('Bob')").unwrap();
        db
    }

    #[test]
    fn test_lazy_connection() {
        let mut db = CursorConnection::new(memory_params());
        assert!(!db.is_connected());
        db.connection().unwrap();
        assert!(db.is_connected());

        db.reset();
        assert!(!db.is_connected());
    }

    #[test]
    fn test_wrong_dsn_fails_on_connect() {
        let mut db = CursorConnection::new(CursorParams {
            dsn: "sqlite:/nonexistent/dir/db.sqlite".to_string(),
            ..Default::default()
        });
        assert!(matches!(db.connection(), Err(DbError::Database(_))));
    }

    #[test]
    fn test_walk_records() {
        let mut db = setup();
        assert_eq!(db.query("SELECT id, name FROM user ORDER BY id").unwrap(), QueryOutcome::Rows(2));
        assert_eq!(db.num_rows().unwrap(), 2);

        let mut names = Vec::new();
        while db.next_record().unwrap() {
            names.push(db.field("name").cloned());
        }
        assert_eq!(
            names,
            vec![Some(Value::Text("Alice".into())), Some(Value::Text("Bob".into()))]
        );
        // Exhausting the rows frees the result set
        assert!(db.record().is_none());
        assert!(db.next_record().is_err());
    }

    #[test]
    fn test_next_record_without_query() {
        let mut db = CursorConnection::new(memory_params());
        match db.next_record() {
            Err(DbError::Query(msg)) => assert!(msg.contains("No query active")),
            other => panic!("Expected Query error, got {:?}", other),
        }
    }

    #[test]
    fn test_affected_rows_and_last_insert_id() {
        let mut db = setup();
        assert_eq!(db.last_insert_id().unwrap(), 2);
        assert_eq!(db.query("UPDATE user SET name = 'X'").unwrap(), QueryOutcome::Changed(2));
        assert_eq!(db.affected_rows(), 2);
        assert!(db.num_rows().is_err());
    }

    #[test]
    fn test_wrong_query_reports_sql() {
        let mut db = setup();
        let sql = "SELECT 1 FROM non_existing_table_5f3a";
        match db.query(sql) {
            Err(DbError::Query(msg)) => assert!(msg.contains(sql)),
            other => panic!("Expected Query error, got {:?}", other),
        }
    }

    #[test]
    fn test_escape() {
        let db = CursorConnection::new(memory_params());
        assert_ne!(db.escape("'"), "'");
        assert_eq!(db.escape(1), "1");
        assert_eq!(db.escape("A"), "A");
    }

    #[test]
    fn test_metadata() {
        let mut db = setup();
        let columns = db.metadata("user").unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].decl_type.as_deref(), Some("INTEGER"));
        assert_eq!(columns[1].name, "name");
    }

    #[test]
    fn test_profiling() {
        let mut params = memory_params();
        params.enable_profiling = true;
        let mut db = CursorConnection::new(params);

        db.query("CREATE TABLE t (id INTEGER)").unwrap();
        db.query("INSERT INTO t VALUES (1)").unwrap();
        db.query("SELECT * FROM t").unwrap();

        let profiler = db.profiler();
        assert_eq!(profiler.total_num_queries(None), 3);
        assert_eq!(profiler.total_num_queries(Some(QueryCategory::SELECT)), 1);
        assert_eq!(profiler.total_num_queries(Some(QueryCategory::INSERT)), 1);
    }
}
