//! A single timed query execution.
use super::category::QueryCategory;
use super::params::{BoundParams, ParamKey};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;

/// Timing and parameter record of one query execution attempt.
///
/// Text and category never change after creation. Timing is reset by
/// [`start`](QueryProfile::start) and closed by [`end`](QueryProfile::end).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryProfile {
    text: String,
    category: QueryCategory,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    bound_params: BoundParams,
}

impl QueryProfile {
    /// Creates a profile whose timing starts now.
    pub fn new(text: impl Into<String>, category: QueryCategory) -> Self {
        QueryProfile {
            text: text.into(),
            category,
            started_at: Utc::now(),
            ended_at: None,
            bound_params: BoundParams::new(),
        }
    }

    /// Fresh profile for the same statement: no parameters, not ended,
    /// started now. Nothing is shared with `self`.
    pub fn fork(&self) -> Self {
        QueryProfile::new(self.text.clone(), self.category)
    }

    pub fn start(&mut self) {
        self.started_at = Utc::now();
    }

    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn has_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn query(&self) -> &str {
        &self.text
    }

    pub fn category(&self) -> QueryCategory {
        self.category
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn bind_param(&mut self, key: impl Into<ParamKey>, value: impl Into<Value>) {
        self.bound_params.insert(key, value);
    }

    /// Records a whole parameter set, shifting zero-based lists to start at 1.
    pub fn bind_params(&mut self, params: &BoundParams) {
        for (key, value) in params.shifted().iter() {
            self.bound_params.insert(key.clone(), value.clone());
        }
    }

    pub fn params(&self) -> &BoundParams {
        &self.bound_params
    }

    /// Seconds between start and end, or `None` while unfinished.
    pub fn elapsed_secs(&self) -> Option<f64> {
        let ended_at = self.ended_at?;
        let elapsed = ended_at - self.started_at;
        Some(match elapsed.num_nanoseconds() {
            Some(nanos) => nanos as f64 / 1e9,
            None => elapsed.num_milliseconds() as f64 / 1e3,
        })
    }

    /// JSON summary used by reports.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "query": self.text,
            "category": self.category.to_string(),
            "started_at": self.started_at.to_rfc3339(),
            "ended_at": self.ended_at.map(|t| t.to_rfc3339()),
            "elapsed_secs": self.elapsed_secs(),
            "params": self.bound_params.to_json(),
        })
    }
}
