//! Domain records read from the app's storage layer.
//!
//! These mirror the rows the app persists for diary, gratitude, and
//! breathing features. The insight pipeline only ever reads them; all
//! timestamps are UTC and serialize as ISO-8601.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A free-text diary entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiaryRecord {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    /// Optional self-reported mood label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

/// Which gratitude ritual an entry belongs to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Evening,
}

/// A gratitude journal entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GratitudeRecord {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub time_of_day: TimeOfDay,
}

/// A guided breathing session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BreathingRecord {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// Identifier of the breathing technique (e.g. `"box"`, `"4-7-8"`).
    pub method_id: String,
    pub duration_seconds: u32,
    pub completed: bool,
}

/// Implemented by every record type so sources and the aggregator can
/// filter, sort, and trim collections generically.
pub trait Record {
    fn user_id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Record for DiaryRecord {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for GratitudeRecord {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for BreathingRecord {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gratitude_deserializes_lowercase_time_of_day() {
        let json = r#"{
            "user_id": "u1",
            "created_at": "2026-03-01T07:30:00Z",
            "content": "Sonne",
            "time_of_day": "morning"
        }"#;
        let record: GratitudeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.time_of_day, TimeOfDay::Morning);
        assert_eq!(record.id, "");
        assert_eq!(record.created_at.to_rfc3339(), "2026-03-01T07:30:00+00:00");
    }

    #[test]
    fn diary_mood_is_optional() {
        let json = r#"{"user_id":"u1","created_at":"2026-03-01T20:00:00Z","content":"ok"}"#;
        let record: DiaryRecord = serde_json::from_str(json).unwrap();
        assert!(record.mood.is_none());
        let back = serde_json::to_string(&record).unwrap();
        assert!(!back.contains("mood"));
    }
}
