/// Statement Module
///
/// Prepared statements handed out by [`Connection::prepare`](super::Connection::prepare).
/// Every execution is wrapped in a profile through a `StatementTracker`, and
/// the produced rows are buffered so they can be fetched after `execute`
/// returns.

use super::record::Record;
use crate::core::{DbError, Result};
use crate::profiler::{BoundParams, ParamKey, Profiler, QueryHandle, StatementTracker};
use std::cell::RefCell;
use std::collections::VecDeque;
use tracing::debug;

/// A profiled prepared statement bound to its connection.
pub struct Statement<'conn> {
    inner: rusqlite::Statement<'conn>,
    profiler: &'conn RefCell<Profiler>,
    tracker: StatementTracker,
    sql: String,
    columns: Vec<String>,
    rows: VecDeque<Record>,
    row_count: usize,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn new(
        inner: rusqlite::Statement<'conn>,
        profiler: &'conn RefCell<Profiler>,
        sql: &str,
    ) -> Result<Self> {
        let tracker = StatementTracker::new(&mut *borrow_profiler(profiler)?, sql);
        let columns = inner.column_names().into_iter().map(String::from).collect();

        Ok(Statement {
            inner,
            profiler,
            tracker,
            sql: sql.to_string(),
            columns,
            rows: VecDeque::new(),
            row_count: 0,
        })
    }

    /// Executes the statement with `params`.
    ///
    /// Positional keys are bound in order starting at index 1; named keys
    /// are matched against `:name`, `@name` and `$name` placeholders. Rows
    /// still buffered from a previous execution are dropped first, so a
    /// failed execution leaves nothing to fetch.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` (with the SQL text appended) when binding or
    /// execution fails, and `DbError::Profiler` when the profiler ledger no
    /// longer knows this statement's handle.
    pub fn execute(&mut self, params: Option<&BoundParams>) -> Result<bool> {
        let mut profiler = borrow_profiler(self.profiler)?;
        self.rows.clear();
        self.row_count = 0;

        let inner = &mut self.inner;
        let columns = &self.columns;
        let sql = &self.sql;
        let mut produced = None;

        let outcome = self.tracker.execute(&mut profiler, params, |params| {
            produced = Some(run(inner, columns, sql, params)?);
            Ok(true)
        })?;

        if let Some((rows, row_count)) = produced {
            debug!("Executed statement, {} row(s)", row_count);
            self.rows = rows;
            self.row_count = row_count;
        }
        Ok(outcome)
    }

    /// Next buffered row, if any
    pub fn fetch(&mut self) -> Option<Record> {
        self.rows.pop_front()
    }

    /// All remaining buffered rows
    pub fn fetch_all(&mut self) -> Vec<Record> {
        self.rows.drain(..).collect()
    }

    /// Rows changed by the last execution, or rows returned for queries.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Handle of the profile covering the latest execution, `None` when the
    /// statement was prepared with profiling disabled.
    pub fn profile_handle(&self) -> Option<QueryHandle> {
        self.tracker.handle()
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("tracker", &self.tracker)
            .field("row_count", &self.row_count)
            .finish()
    }
}

fn borrow_profiler(profiler: &RefCell<Profiler>) -> Result<std::cell::RefMut<'_, Profiler>> {
    profiler
        .try_borrow_mut()
        .map_err(|_| DbError::Connection("Profiler is borrowed elsewhere".to_string()))
}

pub(crate) fn query_error(err: rusqlite::Error, sql: &str) -> DbError {
    DbError::Query(format!("{}\n\n{}", err, sql))
}

/// The driver side of an execution: bind, step, collect.
fn run(
    stmt: &mut rusqlite::Statement<'_>,
    columns: &[String],
    sql: &str,
    params: Option<&BoundParams>,
) -> Result<(VecDeque<Record>, usize)> {
    if let Some(params) = params {
        bind(stmt, params, sql)?;
    }

    if columns.is_empty() {
        let changed = stmt.raw_execute().map_err(|e| query_error(e, sql))?;
        return Ok((VecDeque::new(), changed));
    }

    let mut buffered = VecDeque::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().map_err(|e| query_error(e, sql))? {
        buffered.push_back(Record::from_row(columns, row).map_err(|e| query_error(e, sql))?);
    }
    let count = buffered.len();
    Ok((buffered, count))
}

fn bind(stmt: &mut rusqlite::Statement<'_>, params: &BoundParams, sql: &str) -> Result<()> {
    for (key, value) in params.shifted().iter() {
        let index = match key {
            ParamKey::Position(position) => *position,
            ParamKey::Name(name) => named_index(stmt, name, sql)?,
        };
        stmt.raw_bind_parameter(index, value)
            .map_err(|e| query_error(e, sql))?;
    }
    Ok(())
}

fn named_index(stmt: &rusqlite::Statement<'_>, name: &str, sql: &str) -> Result<usize> {
    let candidates = if name.starts_with(|c| matches!(c, ':' | '@' | '$')) {
        vec![name.to_string()]
    } else {
        vec![format!(":{}", name), format!("@{}", name), format!("${}", name)]
    };

    for candidate in &candidates {
        if let Some(index) = stmt
            .parameter_index(candidate)
            .map_err(|e| query_error(e, sql))?
        {
            return Ok(index);
        }
    }

    Err(DbError::Query(format!("Unknown parameter '{}'\n\n{}", name, sql)))
}

#[cfg(test)]
mod tests {
    use super::super::Connection;
    use super::*;
    use rusqlite::types::Value;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.exec("CREATE TABLE user (id INTEGER PRIMARY KEY ASC, name TEXT)").unwrap();
        conn
    }

    #[test]
    fn test_execute_and_fetch() {
        let conn = setup();
        conn.exec("INSERT INTO user (name) VALUES ('Alice')").unwrap();
        conn.exec("INSERT INTO user (name) VALUES ('Bob')").unwrap();

        let mut stmt = conn.prepare("SELECT id, name FROM user ORDER BY id").unwrap();
        assert!(stmt.execute(None).unwrap());
        assert_eq!(stmt.column_names(), &["id".to_string(), "name".to_string()]);
        assert_eq!(stmt.row_count(), 2);

        let first = stmt.fetch().unwrap();
        assert_eq!(first.get("name"), Some(&Value::Text("Alice".to_string())));
        let rest = stmt.fetch_all();
        assert_eq!(rest.len(), 1);
        assert!(stmt.fetch().is_none());
    }

    #[test]
    fn test_positional_and_named_binding() {
        let conn = setup();
        let mut insert = conn.prepare("INSERT INTO user (id, name) VALUES (?, ?)").unwrap();
        insert
            .execute(Some(&BoundParams::positional([Value::Integer(7), Value::Text("Carol".into())])))
            .unwrap();
        assert_eq!(insert.row_count(), 1);

        let mut select = conn.prepare("SELECT name FROM user WHERE id = :id").unwrap();
        select.execute(Some(&BoundParams::named([("id", 7i64)]))).unwrap();
        assert_eq!(select.fetch().unwrap().get("name"), Some(&Value::Text("Carol".into())));
    }

    #[test]
    fn test_unknown_named_parameter() {
        let conn = setup();
        let mut select = conn.prepare("SELECT name FROM user WHERE id = :id").unwrap();
        let err = select.execute(Some(&BoundParams::named([("nope", 1i64)]))).unwrap_err();
        match err {
            DbError::Query(msg) => {
                assert!(msg.contains("nope"));
                assert!(msg.contains("SELECT name FROM user"));
            }
            other => panic!("Expected Query error, got {:?}", other),
        }
    }

    #[test]
    fn test_reexecution_replaces_rows() {
        let conn = setup();
        conn.exec("INSERT INTO user (name) VALUES ('Alice')").unwrap();

        let mut stmt = conn.prepare("SELECT name FROM user").unwrap();
        stmt.execute(None).unwrap();
        stmt.execute(None).unwrap();
        assert_eq!(stmt.fetch_all().len(), 1);
    }

    #[test]
    fn test_failed_reexecution_drops_buffered_rows() {
        let conn = setup();
        conn.exec("INSERT INTO user (name) VALUES ('Alice')").unwrap();

        let mut stmt = conn.prepare("SELECT name FROM user WHERE id = :id").unwrap();
        stmt.execute(Some(&BoundParams::named([("id", 1i64)]))).unwrap();
        assert_eq!(stmt.row_count(), 1);

        assert!(stmt.execute(Some(&BoundParams::named([("nope", 1i64)]))).is_err());
        assert_eq!(stmt.row_count(), 0);
        assert!(stmt.fetch().is_none());
    }

    #[test]
    fn test_unprofiled_statement_has_no_handle() {
        let conn = setup();
        let mut stmt = conn.prepare("SELECT 1").unwrap();
        stmt.execute(None).unwrap();
        assert_eq!(stmt.profile_handle(), None);
        assert_eq!(conn.profiler().total_num_queries(None), 0);
    }
}
