//! The [`DataSource`] seam between the aggregator and the app's storage.
//!
//! Implementations return boxed futures so the trait stays object-safe
//! and can be shared as `&dyn DataSource` across tasks.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::Deserialize;

use super::DataRange;
use crate::records::{BreathingRecord, DiaryRecord, GratitudeRecord, Record};

/// Error raised by a [`DataSource`] call. Never escapes the aggregator.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Boxed future returned by [`DataSource`] methods.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Read access to a user's recent domain records.
///
/// Every method may fail; the aggregator degrades instead of propagating.
pub trait DataSource: Send + Sync {
    fn diary_entries<'a>(
        &'a self,
        user_id: &'a str,
        range: DataRange,
    ) -> SourceFuture<'a, Vec<DiaryRecord>>;

    fn gratitude_entries<'a>(
        &'a self,
        user_id: &'a str,
        range: DataRange,
    ) -> SourceFuture<'a, Vec<GratitudeRecord>>;

    fn breathing_sessions<'a>(
        &'a self,
        user_id: &'a str,
        range: DataRange,
    ) -> SourceFuture<'a, Vec<BreathingRecord>>;

    /// The stored summary of the user's most recent evening reflection.
    fn last_evening_summary<'a>(&'a self, user_id: &'a str) -> SourceFuture<'a, Option<String>>;
}

/// A [`DataSource`] over records held in memory.
///
/// Deserializes from a JSON snapshot so the CLI can run the pipeline
/// against an export of the app's tables:
///
/// ```json
/// {
///   "diary": [{ "user_id": "u1", "created_at": "2026-03-01T20:00:00Z", "content": "..." }],
///   "gratitude": [],
///   "breathing": [],
///   "last_evening_summaries": { "u1": "..." }
/// }
/// ```
#[derive(Deserialize, Debug, Default, Clone)]
pub struct InMemoryDataSource {
    #[serde(default)]
    pub diary: Vec<DiaryRecord>,
    #[serde(default)]
    pub gratitude: Vec<GratitudeRecord>,
    #[serde(default)]
    pub breathing: Vec<BreathingRecord>,
    #[serde(default)]
    pub last_evening_summaries: HashMap<String, String>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_diary(mut self, records: impl IntoIterator<Item = DiaryRecord>) -> Self {
        self.diary.extend(records);
        self
    }

    pub fn with_gratitude(mut self, records: impl IntoIterator<Item = GratitudeRecord>) -> Self {
        self.gratitude.extend(records);
        self
    }

    pub fn with_breathing(mut self, records: impl IntoIterator<Item = BreathingRecord>) -> Self {
        self.breathing.extend(records);
        self
    }

    pub fn with_last_evening_summary(
        mut self,
        user_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        self.last_evening_summaries
            .insert(user_id.into(), summary.into());
        self
    }
}

fn select<T: Record + Clone>(records: &[T], user_id: &str, range: DataRange) -> Vec<T> {
    records
        .iter()
        .filter(|r| r.user_id() == user_id && range.contains(r.created_at()))
        .cloned()
        .collect()
}

impl DataSource for InMemoryDataSource {
    fn diary_entries<'a>(
        &'a self,
        user_id: &'a str,
        range: DataRange,
    ) -> SourceFuture<'a, Vec<DiaryRecord>> {
        let found = select(&self.diary, user_id, range);
        Box::pin(async move { Ok(found) })
    }

    fn gratitude_entries<'a>(
        &'a self,
        user_id: &'a str,
        range: DataRange,
    ) -> SourceFuture<'a, Vec<GratitudeRecord>> {
        let found = select(&self.gratitude, user_id, range);
        Box::pin(async move { Ok(found) })
    }

    fn breathing_sessions<'a>(
        &'a self,
        user_id: &'a str,
        range: DataRange,
    ) -> SourceFuture<'a, Vec<BreathingRecord>> {
        let found = select(&self.breathing, user_id, range);
        Box::pin(async move { Ok(found) })
    }

    fn last_evening_summary<'a>(&'a self, user_id: &'a str) -> SourceFuture<'a, Option<String>> {
        let found = self.last_evening_summaries.get(user_id).cloned();
        Box::pin(async move { Ok(found) })
    }
}
