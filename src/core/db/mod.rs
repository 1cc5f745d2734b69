/// Database Module
///
/// This module provides the connection adapters of dbkit, organized into
/// focused submodules:
/// - **Connection** (`connection.rs`): the prepared-statement adapter, its
///   parameters and the explicitly owned shared instance
/// - **Statements** (`statement.rs`): profiled prepared statements
/// - **Cursor** (`cursor.rs`): the procedural record-by-record adapter
/// - **Records** (`record.rs`): fetched rows and column metadata
/// - **DSN** (`dsn.rs`): DSN strings, identifier quoting and escaping
///
/// ## Error Handling
///
/// All operations return the crate-wide `DbError`. Profiler usage errors are
/// passed through untranslated.
pub mod connection;
pub mod cursor;
pub mod dsn;
pub mod record;
pub mod statement;

pub use connection::*;
pub use cursor::*;
pub use dsn::*;
pub use record::*;
pub use statement::*;
