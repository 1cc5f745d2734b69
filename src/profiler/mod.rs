/// Query Profiler Module
///
/// This module records timing and bound parameters for executed statements.
/// It is organised in four parts:
/// - **Categories** (`category.rs`): the `QueryCategory` bit set used for filtering
/// - **Parameters** (`params.rs`): the ordered parameter map captured per execution
/// - **Profiles** (`profile.rs`): one `QueryProfile` per execution attempt
/// - **Statement tracking** (`tracker.rs`): the glue that keeps a reusable
///   prepared statement at one profile per physical execution
///
/// The `Profiler` itself is a ledger of profiles keyed by increasing handles.
/// It is not thread-safe; an owner shared between threads has to wrap it in
/// a single lock.
pub mod category;
pub mod params;
pub mod profile;
pub mod tracker;

pub use category::QueryCategory;
pub use params::{BoundParams, ParamKey};
pub use profile::QueryProfile;
pub use tracker::StatementTracker;

use crate::core::ProfilerError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

/// Ledger key of a profiled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct QueryHandle(usize);

impl QueryHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for QueryHandle {
    fn from(index: usize) -> Self {
        QueryHandle(index)
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of [`Profiler::query_end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// The profile was closed and kept
    Stored,
    /// The profiler is disabled; nothing happened
    Ignored,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Stored => "stored",
            QueryStatus::Ignored => "ignored",
        }
    }
}

/// Per-category totals over ended profiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub category: String,
    pub count: usize,
    pub elapsed_secs: f64,
}

/// Ledger of query profiles.
#[derive(Debug, Default)]
pub struct Profiler {
    enabled: bool,
    profiles: BTreeMap<QueryHandle, QueryProfile>,
    next_handle: usize,
}

impl Profiler {
    /// Creates a disabled profiler with an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) -> &mut Self {
        self.enabled = enabled;
        self
    }

    /// Drops every profile. Handles start again from 0.
    pub fn clear(&mut self) -> &mut Self {
        self.profiles.clear();
        self.next_handle = 0;
        self
    }

    fn push(&mut self, profile: QueryProfile) -> QueryHandle {
        let handle = QueryHandle(self.next_handle);
        self.next_handle += 1;
        self.profiles.insert(handle, profile);
        handle
    }

    /// Opens a profile for `text` and returns its handle.
    ///
    /// Returns `None` without touching the ledger when disabled. A missing
    /// category is guessed with [`QueryCategory::infer`].
    pub fn query_start(&mut self, text: &str, category: Option<QueryCategory>) -> Option<QueryHandle> {
        if !self.enabled {
            return None;
        }

        let category = category.unwrap_or_else(|| QueryCategory::infer(text));
        let handle = self.push(QueryProfile::new(text, category));
        trace!("profiler: started {} ({})", handle, category);
        Some(handle)
    }

    /// Closes the profile behind `handle`.
    ///
    /// When disabled the handle is not even looked at and
    /// [`QueryStatus::Ignored`] is returned.
    pub fn query_end(&mut self, handle: Option<QueryHandle>) -> Result<QueryStatus, ProfilerError> {
        if !self.enabled {
            return Ok(QueryStatus::Ignored);
        }

        let Some(handle) = handle else {
            return Err(ProfilerError::NotFound { handle: None });
        };
        let profile = self.query_profile_mut(handle)?;

        if profile.has_ended() {
            return Err(ProfilerError::AlreadyEnded(handle));
        }

        profile.end();
        trace!("profiler: ended {}", handle);
        Ok(QueryStatus::Stored)
    }

    /// Appends a fresh copy of `profile` (see [`QueryProfile::fork`]).
    pub fn query_clone(&mut self, profile: &QueryProfile) -> QueryHandle {
        let handle = self.push(profile.fork());
        trace!("profiler: cloned into {}", handle);
        handle
    }

    pub fn query_profile(&self, handle: QueryHandle) -> Result<&QueryProfile, ProfilerError> {
        self.profiles
            .get(&handle)
            .ok_or(ProfilerError::NotFound { handle: Some(handle) })
    }

    pub fn query_profile_mut(&mut self, handle: QueryHandle) -> Result<&mut QueryProfile, ProfilerError> {
        self.profiles
            .get_mut(&handle)
            .ok_or(ProfilerError::NotFound { handle: Some(handle) })
    }

    fn matches(profile: &QueryProfile, category: Option<QueryCategory>) -> bool {
        category.map_or(true, |filter| profile.category().intersects(filter))
    }

    /// Profiles matching `category`; unfinished ones only on request.
    pub fn query_profiles(
        &self,
        category: Option<QueryCategory>,
        include_unfinished: bool,
    ) -> BTreeMap<QueryHandle, &QueryProfile> {
        self.profiles
            .iter()
            .filter(|(_, p)| (p.has_ended() || include_unfinished) && Self::matches(p, category))
            .map(|(h, p)| (*h, p))
            .collect()
    }

    /// Sum of elapsed seconds over ended profiles matching `category`.
    pub fn total_elapsed_secs(&self, category: Option<QueryCategory>) -> f64 {
        self.profiles
            .values()
            .filter(|p| Self::matches(p, category))
            .filter_map(QueryProfile::elapsed_secs)
            .sum()
    }

    /// Number of profiled queries.
    ///
    /// Without a filter this is the ledger size, unfinished profiles
    /// included. With a filter only ended profiles are counted.
    pub fn total_num_queries(&self, category: Option<QueryCategory>) -> usize {
        match category {
            None => self.profiles.len(),
            Some(_) => self
                .profiles
                .values()
                .filter(|p| p.has_ended() && Self::matches(p, category))
                .count(),
        }
    }

    /// Most recently appended profile, ended or not.
    pub fn last_query_profile(&self) -> Option<&QueryProfile> {
        self.profiles.values().next_back()
    }

    /// Count and elapsed time per category, skipping categories with no
    /// ended profile.
    pub fn summary(&self) -> Vec<ProfileSummary> {
        QueryCategory::all()
            .map(|category| ProfileSummary {
                category: category.to_string(),
                count: self.total_num_queries(Some(category)),
                elapsed_secs: self.total_elapsed_secs(Some(category)),
            })
            .filter(|summary| summary.count > 0)
            .collect()
    }
}
