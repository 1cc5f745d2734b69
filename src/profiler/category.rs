//! Query categories used by the profiler.
//!
//! Categories are single bits so a filter can select several of them at once:
//! `QueryCategory::INSERT | QueryCategory::UPDATE` matches both kinds.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bit set of statement categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryCategory(u8);

impl QueryCategory {
    pub const CONNECT: QueryCategory = QueryCategory(1);
    pub const QUERY: QueryCategory = QueryCategory(2);
    pub const INSERT: QueryCategory = QueryCategory(4);
    pub const UPDATE: QueryCategory = QueryCategory(8);
    pub const DELETE: QueryCategory = QueryCategory(16);
    pub const SELECT: QueryCategory = QueryCategory(32);
    pub const TRANSACTION: QueryCategory = QueryCategory(64);

    const NAMED: [(QueryCategory, &'static str); 7] = [
        (Self::CONNECT, "connect"),
        (Self::QUERY, "query"),
        (Self::INSERT, "insert"),
        (Self::UPDATE, "update"),
        (Self::DELETE, "delete"),
        (Self::SELECT, "select"),
        (Self::TRANSACTION, "transaction"),
    ];

    /// Every single-bit category, in bit order
    pub fn all() -> impl Iterator<Item = QueryCategory> {
        Self::NAMED.into_iter().map(|(category, _)| category)
    }

    pub const fn empty() -> Self {
        QueryCategory(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Builds a category set from raw bits, dropping unknown bits.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        QueryCategory(bits & 0x7f)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when the two sets share at least one bit.
    pub const fn intersects(self, other: QueryCategory) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: QueryCategory) -> bool {
        self.0 & other.0 == other.0
    }

    /// Guesses the category from the leading keyword of a statement.
    ///
    /// Only the first six characters after leading whitespace are looked at,
    /// so anything other than insert/update/delete/select falls back to
    /// [`QueryCategory::QUERY`].
    pub fn infer(sql: &str) -> Self {
        let prefix: String = sql
            .trim_start_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
            .chars()
            .take(6)
            .collect::<String>()
            .to_ascii_lowercase();

        match prefix.as_str() {
            "insert" => Self::INSERT,
            "update" => Self::UPDATE,
            "delete" => Self::DELETE,
            "select" => Self::SELECT,
            _ => Self::QUERY,
        }
    }
}

impl BitOr for QueryCategory {
    type Output = QueryCategory;

    fn bitor(self, rhs: QueryCategory) -> QueryCategory {
        QueryCategory(self.0 | rhs.0)
    }
}

impl BitOrAssign for QueryCategory {
    fn bitor_assign(&mut self, rhs: QueryCategory) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for QueryCategory {
    type Output = QueryCategory;

    fn bitand(self, rhs: QueryCategory) -> QueryCategory {
        QueryCategory(self.0 & rhs.0)
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(category, _)| self.contains(*category))
            .map(|(_, name)| *name)
            .collect();

        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_category() {
        assert_eq!(QueryCategory::infer("SELECT 1"), QueryCategory::SELECT);
        assert_eq!(QueryCategory::infer("INSERT INTO t VALUES (1)"), QueryCategory::INSERT);
        assert_eq!(QueryCategory::infer("UPDATE t SET a = 1"), QueryCategory::UPDATE);
        assert_eq!(QueryCategory::infer("DELETE FROM t"), QueryCategory::DELETE);
        assert_eq!(QueryCategory::infer("CREATE TABLE t (id INTEGER)"), QueryCategory::QUERY);
    }

    #[test]
    fn test_infer_trims_and_ignores_case() {
        assert_eq!(QueryCategory::infer("\n\t  select * from t"), QueryCategory::SELECT);
        assert_eq!(QueryCategory::infer("InSeRt into t"), QueryCategory::INSERT);
        // Shorter than the keyword
        assert_eq!(QueryCategory::infer("sel"), QueryCategory::QUERY);
        assert_eq!(QueryCategory::infer(""), QueryCategory::QUERY);
        // Prefix match only, no SQL awareness
        assert_eq!(QueryCategory::infer("selection"), QueryCategory::SELECT);
        assert_eq!(QueryCategory::infer("WITH x AS (SELECT 1) SELECT * FROM x"), QueryCategory::QUERY);
    }

    #[test]
    fn test_bit_operations() {
        let filter = QueryCategory::INSERT | QueryCategory::UPDATE;
        assert_eq!(filter.bits(), 12);
        assert!(filter.intersects(QueryCategory::INSERT));
        assert!(filter.intersects(QueryCategory::UPDATE));
        assert!(!filter.intersects(QueryCategory::SELECT));
        assert!((filter & QueryCategory::SELECT).is_empty());
        assert!(filter.contains(QueryCategory::INSERT));
        assert!(!QueryCategory::INSERT.contains(filter));
        assert_eq!(QueryCategory::from_bits_truncate(0xff).bits(), 127);
    }

    #[test]
    fn test_display() {
        assert_eq!(QueryCategory::SELECT.to_string(), "select");
        assert_eq!((QueryCategory::CONNECT | QueryCategory::TRANSACTION).to_string(), "connect|transaction");
        assert_eq!(QueryCategory::empty().to_string(), "none");
        assert_eq!(QueryCategory::all().count(), 7);
    }
}
