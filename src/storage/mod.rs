//! Storage module for persisting finished query profiles
use crate::core::Result;
use crate::profiler::{Profiler, QueryCategory};
use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error};
use uuid::Uuid;

const PROFILE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS query_profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    handle INTEGER NOT NULL,
    query TEXT NOT NULL,
    category INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    elapsed_secs REAL NOT NULL,
    params TEXT NOT NULL
)"#;

const SELECT_COLUMNS: &str =
    "SELECT id, session_id, handle, query, category, started_at, elapsed_secs, params FROM query_profiles";

#[derive(Debug, Clone, Serialize)]
pub struct StoredProfile {
    pub id: i64,
    pub session_id: String,
    pub handle: i64,
    pub query: String,
    pub category: QueryCategory,
    pub started_at: String,
    pub elapsed_secs: f64,
    pub params: serde_json::Value,
}

impl StoredProfile {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = row.get(7)?;
        let params = serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(StoredProfile {
            id: row.get(0)?,
            session_id: row.get(1)?,
            handle: row.get(2)?,
            query: row.get(3)?,
            category: QueryCategory::from_bits_truncate(row.get(4)?),
            started_at: row.get(5)?,
            elapsed_secs: row.get(6)?,
            params,
        })
    }
}

/// Profile snapshots kept in a SQLite file. Each store instance writes under
/// its own session id.
pub struct ProfileStore {
    conn: Connection,
    session_id: Uuid,
}

impl ProfileStore {
    /// Initialize storage with the given path
    pub fn new(path: PathBuf) -> Result<Self> {
        debug!("Initializing profile storage at {:?}", path);
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(PROFILE_TABLE_SQL, [])?;
        Ok(Self {
            conn,
            session_id: Uuid::new_v4(),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Saves every ended profile of `profiler`; unfinished ones are skipped.
    pub fn save(&self, profiler: &Profiler) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO query_profiles (session_id, handle, query, category, started_at, elapsed_secs, params)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        let mut saved = 0;
        for (handle, profile) in profiler.query_profiles(None, false) {
            let params = serde_json::to_string(&profile.params().to_json())?;
            let result = stmt.execute((
                self.session_id.to_string(),
                handle.index() as i64,
                profile.query(),
                profile.category().bits(),
                profile.started_at().to_rfc3339(),
                profile.elapsed_secs().unwrap_or_default(),
                params,
            ));

            if let Err(e) = result {
                error!("Failed to store profile {}: {}", handle, e);
                return Err(e.into());
            }
            saved += 1;
        }

        debug!("Stored {} profile(s) for session {}", saved, self.session_id);
        Ok(saved)
    }

    /// Profiles of one session, in handle order
    pub fn load_session(&self, session_id: Uuid) -> Result<Vec<StoredProfile>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE session_id = ?1 ORDER BY handle", SELECT_COLUMNS))?;
        let entries = stmt.query_map([session_id.to_string()], StoredProfile::from_row)?;
        Ok(entries.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The slowest stored profiles across all sessions
    pub fn slowest(&self, limit: usize) -> Result<Vec<StoredProfile>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY elapsed_secs DESC LIMIT ?1", SELECT_COLUMNS))?;
        let entries = stmt.query_map([limit as i64], StoredProfile::from_row)?;
        Ok(entries.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Distinct session ids, oldest first
    pub fn sessions(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT session_id FROM query_profiles GROUP BY session_id ORDER BY MIN(id)")?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        Ok(ids.collect::<rusqlite::Result<Vec<String>>>()?)
    }
}
