/// Core Module for dbkit
///
/// This module contains the shared infrastructure of the crate: the error
/// types and the two SQLite connection adapters built on top of the
/// query profiler.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, ProfilerError, Result};
