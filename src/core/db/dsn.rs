/// DSN and Quoting Module
///
/// String helpers shared by the adapters: building and parsing DSN strings,
/// quoting identifiers and escaping literals.

use crate::core::{DbError, Result};
use std::path::PathBuf;

/// Default DSN components for [`build_dsn`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DsnParts {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
    pub unix_socket: Option<String>,
}

/// Keys understood by [`build_dsn`], in output order.
pub const DSN_KEYS: [&str; 4] = ["host", "port", "dbname", "unix_socket"];

impl DsnParts {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            "host" => self.host.clone(),
            "port" => self.port.map(|p| p.to_string()),
            "dbname" => self.dbname.clone(),
            "unix_socket" => self.unix_socket.clone(),
            _ => None,
        }
    }
}

/// Builds a `driver:key=value;...` DSN.
///
/// `overrides` win over `defaults`. Keys other than [`DSN_KEYS`] are ignored
/// and empty values are left out.
///
/// # Examples
///
/// ```
/// use dbkit::core::db::{build_dsn, DsnParts};
///
/// let defaults = DsnParts { host: Some("1.2.3.4".into()), ..Default::default() };
/// assert_eq!(build_dsn("mysql", &defaults, &[("port", "9999")]), "mysql:host=1.2.3.4;port=9999;");
/// ```
pub fn build_dsn(driver: &str, defaults: &DsnParts, overrides: &[(&str, &str)]) -> String {
    let mut dsn = format!("{}:", driver);
    for key in DSN_KEYS {
        let value = overrides
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .or_else(|| defaults.get(key));

        if let Some(value) = value.filter(|v| !v.is_empty()) {
            dsn.push_str(&format!("{}={};", key, value));
        }
    }
    dsn
}

/// Where a `sqlite:` DSN points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    File(PathBuf),
}

impl SqliteTarget {
    /// Parses `sqlite::memory:` or `sqlite:<path>`.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let (driver, rest) = dsn
            .split_once(':')
            .ok_or_else(|| DbError::Config(format!("Malformed DSN '{}'", dsn)))?;

        if driver != "sqlite" {
            return Err(DbError::Config(format!("Unsupported DSN driver '{}'", driver)));
        }

        match rest {
            ":memory:" => Ok(SqliteTarget::Memory),
            "" => Err(DbError::Config(format!("DSN '{}' has no database path", dsn))),
            path => Ok(SqliteTarget::File(PathBuf::from(path))),
        }
    }
}

/// Quotes a possibly qualified identifier, one dot-separated part at a time.
pub fn quote_identifier(identifier: &str) -> String {
    identifier
        .split('.')
        .map(quote_single_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// Wraps an identifier in backticks, doubling embedded backticks.
pub fn quote_single_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Escapes a value for use inside a single-quoted SQLite string literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
