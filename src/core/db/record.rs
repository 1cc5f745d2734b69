/// Record Module
///
/// Rows fetched by the adapters and the column metadata they expose.

use rusqlite::types::{Value, ValueRef};
use serde::Serialize;

/// One fetched row, addressable by column name or position.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Record { columns, values }
    }

    /// Reads the current row of a rusqlite cursor.
    pub(crate) fn from_row(columns: &[String], row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let values = (0..columns.len())
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Record::new(columns.to_vec(), values))
    }

    /// Value of the first column called `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Values formatted for display
    pub fn display_values(&self) -> Vec<String> {
        self.values.iter().map(|v| format_value(ValueRef::from(v))).collect()
    }
}

/// Column metadata as reported by SQLite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Declared type, absent for expressions
    pub decl_type: Option<String>,
}

/// Formats a SQLite value for display
pub fn format_value(value: ValueRef) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(b) => format!("<BLOB: {} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::new(
            vec!["id".to_string(), "name".to_string(), "data".to_string()],
            vec![Value::Integer(1), Value::Text("Bob".to_string()), Value::Blob(vec![1, 2, 3])],
        )
    }

    #[test]
    fn test_lookup() {
        let record = sample();
        assert_eq!(record.get("name"), Some(&Value::Text("Bob".to_string())));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.get_index(0), Some(&Value::Integer(1)));
        assert_eq!(record.len(), 3);
        assert_eq!(record.iter().next(), Some(("id", &Value::Integer(1))));
    }

    #[test]
    fn test_display_values() {
        let record = sample();
        assert_eq!(record.display_values(), vec!["1", "Bob", "<BLOB: 3 bytes>"]);
        assert_eq!(format_value(ValueRef::Null), "NULL");
    }
}
