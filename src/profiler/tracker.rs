//! Profiling glue for reusable prepared statements.
//!
//! A prepared statement can be executed many times but a profile can only be
//! ended once. The tracker holds the handle of the statement's current
//! profile and forks a fresh one whenever the held profile has already ended,
//! so every physical execution gets its own ledger entry.
use super::{BoundParams, Profiler, QueryHandle};
use crate::core::DbError;

/// Per-statement profiling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementTracker {
    handle: Option<QueryHandle>,
}

impl StatementTracker {
    /// Opens the statement's first profile.
    ///
    /// If the profiler is disabled at this point the statement is never
    /// profiled, even if the profiler is enabled later.
    pub fn new(profiler: &mut Profiler, sql: &str) -> Self {
        StatementTracker {
            handle: profiler.query_start(sql, None),
        }
    }

    /// Tracker that never touches the profiler.
    pub fn untracked() -> Self {
        StatementTracker { handle: None }
    }

    /// Handle of the profile covering the latest (or upcoming) execution.
    pub fn handle(&self) -> Option<QueryHandle> {
        self.handle
    }

    pub fn is_tracked(&self) -> bool {
        self.handle.is_some()
    }

    /// Runs `driver` inside a profile.
    ///
    /// The driver receives the caller's parameters unchanged; the profile
    /// stores them with zero-based lists shifted to start at 1. The profile
    /// is closed even when the driver fails, then the driver's error is
    /// returned.
    pub fn execute<F>(
        &mut self,
        profiler: &mut Profiler,
        params: Option<&BoundParams>,
        driver: F,
    ) -> Result<bool, DbError>
    where
        F: FnOnce(Option<&BoundParams>) -> Result<bool, DbError>,
    {
        let Some(mut handle) = self.handle else {
            return driver(params);
        };

        if profiler.query_profile(handle)?.has_ended() {
            let stale = profiler.query_profile(handle)?.clone();
            handle = profiler.query_clone(&stale);
            self.handle = Some(handle);
        }

        let profile = profiler.query_profile_mut(handle)?;
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            profile.bind_params(params);
        }
        profile.start();

        let outcome = driver(params);
        profiler.query_end(Some(handle))?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::{ParamKey, QueryCategory};
    use rusqlite::types::Value;

    fn enabled_profiler() -> Profiler {
        let mut profiler = Profiler::new();
        profiler.set_enabled(true);
        profiler
    }

    #[test]
    fn test_untracked_statement_skips_profiler() {
        let mut profiler = Profiler::new();
        let mut tracker = StatementTracker::new(&mut profiler, "SELECT 1");
        assert!(!tracker.is_tracked());

        // Enabling later does not change a statement prepared while disabled
        profiler.set_enabled(true);
        let mut calls = 0;
        let result = tracker
            .execute(&mut profiler, None, |_| {
                calls += 1;
                Ok(true)
            })
            .unwrap();

        assert!(result);
        assert_eq!(calls, 1);
        assert_eq!(profiler.total_num_queries(None), 0);
        assert_eq!(StatementTracker::untracked(), tracker);
    }

    #[test]
    fn test_first_execution_reuses_prepared_profile() {
        let mut profiler = enabled_profiler();
        let mut tracker = StatementTracker::new(&mut profiler, "SELECT 1");
        let prepared = tracker.handle();

        tracker.execute(&mut profiler, None, |_| Ok(true)).unwrap();

        assert_eq!(tracker.handle(), prepared);
        assert_eq!(profiler.total_num_queries(None), 1);
        assert!(profiler.last_query_profile().unwrap().has_ended());
    }

    #[test]
    fn test_each_execution_gets_its_own_profile() {
        let mut profiler = enabled_profiler();
        let mut tracker = StatementTracker::new(&mut profiler, "SELECT 1");

        tracker.execute(&mut profiler, None, |_| Ok(true)).unwrap();
        let first = tracker.handle().unwrap();
        tracker.execute(&mut profiler, None, |_| Ok(true)).unwrap();
        let second = tracker.handle().unwrap();
        tracker.execute(&mut profiler, None, |_| Ok(true)).unwrap();
        let third = tracker.handle().unwrap();

        assert!(first < second && second < third);
        let ended = profiler.query_profiles(Some(QueryCategory::SELECT), false);
        assert_eq!(ended.len(), 3);
        assert!(ended.values().all(|p| p.query() == "SELECT 1"));
    }

    #[test]
    fn test_params_are_shifted_for_the_profile_only() {
        let mut profiler = enabled_profiler();
        let mut tracker = StatementTracker::new(&mut profiler, "SELECT ?, ?");
        let params = BoundParams::positional(["a".to_string(), "b".to_string()]);

        tracker
            .execute(&mut profiler, Some(&params), |seen| {
                // The driver sees the caller's zero-based list
                assert_eq!(seen, Some(&params));
                Ok(true)
            })
            .unwrap();

        let profile = profiler.query_profile(tracker.handle().unwrap()).unwrap();
        assert_eq!(profile.params().get(&ParamKey::Position(1)), Some(&Value::Text("a".into())));
        assert_eq!(profile.params().get(&ParamKey::Position(2)), Some(&Value::Text("b".into())));
    }

    #[test]
    fn test_cloned_profile_does_not_inherit_params() {
        let mut profiler = enabled_profiler();
        let mut tracker = StatementTracker::new(&mut profiler, "SELECT :id");

        let params = BoundParams::named([("id", 1i64)]);
        tracker.execute(&mut profiler, Some(&params), |_| Ok(true)).unwrap();
        tracker.execute(&mut profiler, None, |_| Ok(true)).unwrap();

        let profile = profiler.query_profile(tracker.handle().unwrap()).unwrap();
        assert!(profile.params().is_empty());
    }

    #[test]
    fn test_driver_failure_still_ends_profile() {
        let mut profiler = enabled_profiler();
        let mut tracker = StatementTracker::new(&mut profiler, "SELECT * FROM missing");

        let result = tracker.execute(&mut profiler, None, |_| {
            Err(DbError::Query("no such table: missing".to_string()))
        });

        assert!(matches!(result, Err(DbError::Query(_))));
        assert!(profiler.last_query_profile().unwrap().has_ended());
    }

    #[test]
    fn test_driver_false_is_returned() {
        let mut profiler = enabled_profiler();
        let mut tracker = StatementTracker::new(&mut profiler, "SELECT 1");
        assert!(!tracker.execute(&mut profiler, None, |_| Ok(false)).unwrap());
    }

    #[test]
    fn test_cleared_ledger_surfaces_not_found() {
        let mut profiler = enabled_profiler();
        let mut tracker = StatementTracker::new(&mut profiler, "SELECT 1");
        profiler.clear();

        let result = tracker.execute(&mut profiler, None, |_| Ok(true));
        assert!(matches!(result, Err(DbError::Profiler(_))));
    }
}
