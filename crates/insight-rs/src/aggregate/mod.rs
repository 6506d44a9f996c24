//! Time-window aggregation of a user's recent journal activity.
//!
//! [`TimeWindowAggregator`] pulls diary, gratitude, and breathing records
//! from a [`DataSource`] and condenses them into a bounded
//! [`Aggregation`]: at most [`MAX_ITEMS_PER_DOMAIN`] newest records per
//! domain, each text capped at [`MAX_TEXT_CHARS`] characters.
//!
//! Data-layer failures never propagate. A failed fetch produces an
//! offline aggregation so insight generation can still fall back to
//! generic content.

pub mod source;

use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::prompt::{random_morning_impulses, templates};
use crate::records::{BreathingRecord, DiaryRecord, GratitudeRecord, Record, TimeOfDay};
use crate::{Language, truncate_with_ellipsis};

pub use source::{DataSource, InMemoryDataSource, SourceError, SourceFuture};

/// Length of the look-back window in hours.
pub const WINDOW_HOURS: i64 = 24;
/// Maximum number of records kept per domain.
pub const MAX_ITEMS_PER_DOMAIN: usize = 5;
/// Maximum characters kept from a record's free text.
pub const MAX_TEXT_CHARS: usize = 500;
/// Number of generic impulses picked for a morning aggregation.
pub const MORNING_IMPULSE_COUNT: usize = 3;

/// Time span an aggregation covers, inclusive at both ends so a record
/// written exactly at `end` is kept. Valid only when `start < end`.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DataRange {
    /// The window of `hours` hours ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, hours: i64) -> Self {
        Self {
            start: end - Duration::hours(hours),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Start bound as an ISO-8601 string, the format storage backends query with.
    pub fn start_iso(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn end_iso(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Snapshot of the last 24 hours for the evening reflection.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EveningAggregation {
    pub diary_entries: Vec<DiaryRecord>,
    pub gratitude_entries: Vec<GratitudeRecord>,
    /// Completed sessions only.
    pub breathing_sessions: Vec<BreathingRecord>,
    pub summary: String,
    pub has_data: bool,
    pub data_range: DataRange,
}

/// Inputs for the morning impulse.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MorningAggregation {
    pub last_evening_summary: Option<String>,
    pub today_goals: Vec<String>,
    /// Always true: generic impulses exist even without user data.
    pub has_data: bool,
    pub data_range: DataRange,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Aggregation {
    Evening(EveningAggregation),
    Morning(MorningAggregation),
}

impl Aggregation {
    pub fn has_data(&self) -> bool {
        match self {
            Aggregation::Evening(a) => a.has_data,
            Aggregation::Morning(a) => a.has_data,
        }
    }

    pub fn data_range(&self) -> DataRange {
        match self {
            Aggregation::Evening(a) => a.data_range,
            Aggregation::Morning(a) => a.data_range,
        }
    }
}

impl From<EveningAggregation> for Aggregation {
    fn from(a: EveningAggregation) -> Self {
        Aggregation::Evening(a)
    }
}

impl From<MorningAggregation> for Aggregation {
    fn from(a: MorningAggregation) -> Self {
        Aggregation::Morning(a)
    }
}

/// Builds [`Aggregation`]s from a [`DataSource`].
///
/// Holds its own random source for impulse selection; use
/// [`with_seed`](Self::with_seed) for reproducible picks.
#[derive(Debug)]
pub struct TimeWindowAggregator {
    language: Language,
    rng: Mutex<StdRng>,
}

impl TimeWindowAggregator {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn with_seed(language: Language, seed: u64) -> Self {
        Self {
            language,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub async fn aggregate_evening(
        &self,
        user_id: &str,
        source: &dyn DataSource,
    ) -> EveningAggregation {
        self.aggregate_evening_at(user_id, source, Utc::now()).await
    }

    /// Aggregate the 24 hours ending at `now`.
    pub async fn aggregate_evening_at(
        &self,
        user_id: &str,
        source: &dyn DataSource,
        now: DateTime<Utc>,
    ) -> EveningAggregation {
        let range = DataRange::ending_at(now, WINDOW_HOURS);
        debug!(
            "Aggregating evening data for {user_id}: {} .. {}",
            range.start_iso(),
            range.end_iso()
        );

        let fetched = futures::try_join!(
            source.diary_entries(user_id, range),
            source.gratitude_entries(user_id, range),
            source.breathing_sessions(user_id, range),
        );
        let (diary, gratitude, breathing) = match fetched {
            Ok(records) => records,
            Err(e) => {
                warn!("Evening aggregation degraded to offline mode: {e}");
                return EveningAggregation {
                    diary_entries: vec![],
                    gratitude_entries: vec![],
                    breathing_sessions: vec![],
                    summary: offline_summary(self.language).to_string(),
                    has_data: false,
                    data_range: range,
                };
            }
        };

        let breathing: Vec<BreathingRecord> =
            breathing.into_iter().filter(|b| b.completed).collect();

        let counts = DomainCounts {
            diary: diary.len(),
            gratitude_morning: gratitude
                .iter()
                .filter(|g| g.time_of_day == TimeOfDay::Morning)
                .count(),
            gratitude_evening: gratitude
                .iter()
                .filter(|g| g.time_of_day == TimeOfDay::Evening)
                .count(),
            breathing: breathing.len(),
            breathing_minutes: breathing_minutes(&breathing),
        };
        let has_data = counts.any();
        let summary = if has_data {
            counts.summary(self.language)
        } else {
            no_activity_summary(self.language).to_string()
        };

        let diary_entries = newest_first(diary)
            .into_iter()
            .map(|mut d| {
                d.content = truncate_with_ellipsis(&d.content, MAX_TEXT_CHARS);
                d.mood = d.mood.map(|m| truncate_with_ellipsis(&m, MAX_TEXT_CHARS));
                d
            })
            .collect();
        let gratitude_entries = newest_first(gratitude)
            .into_iter()
            .map(|mut g| {
                g.content = truncate_with_ellipsis(&g.content, MAX_TEXT_CHARS);
                g
            })
            .collect();

        EveningAggregation {
            diary_entries,
            gratitude_entries,
            breathing_sessions: newest_first(breathing)
                .into_iter()
                .map(|mut b| {
                    b.method_id = truncate_with_ellipsis(&b.method_id, MAX_TEXT_CHARS);
                    b
                })
                .collect(),
            summary,
            has_data,
            data_range: range,
        }
    }

    pub async fn aggregate_morning(
        &self,
        user_id: &str,
        source: &dyn DataSource,
    ) -> MorningAggregation {
        self.aggregate_morning_at(user_id, source, Utc::now()).await
    }

    pub async fn aggregate_morning_at(
        &self,
        user_id: &str,
        source: &dyn DataSource,
        now: DateTime<Utc>,
    ) -> MorningAggregation {
        let range = DataRange::ending_at(now, WINDOW_HOURS);
        let pool = templates::morning_impulses(self.language);

        match source.last_evening_summary(user_id).await {
            Ok(last_evening_summary) => {
                let today_goals = {
                    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                    random_morning_impulses(self.language, MORNING_IMPULSE_COUNT, &mut *rng)
                };
                MorningAggregation {
                    last_evening_summary: last_evening_summary
                        .map(|s| truncate_with_ellipsis(&s, MAX_TEXT_CHARS)),
                    today_goals,
                    has_data: true,
                    data_range: range,
                }
            }
            Err(e) => {
                warn!("Morning aggregation degraded to offline mode: {e}");
                MorningAggregation {
                    last_evening_summary: None,
                    today_goals: pool.iter().map(|s| s.to_string()).collect(),
                    has_data: true,
                    data_range: range,
                }
            }
        }
    }
}

/// Render an aggregation as a plain-text block for the user prompt.
///
/// Returns an empty string when the aggregation has no data.
pub fn format_for_ai_prompt(aggregation: &Aggregation, language: Language) -> String {
    match aggregation {
        Aggregation::Evening(a) => format_evening(a, language),
        Aggregation::Morning(a) => format_morning(a, language),
    }
}

pub fn format_evening(aggregation: &EveningAggregation, language: Language) -> String {
    if !aggregation.has_data {
        return String::new();
    }
    let labels = Labels::for_language(language);
    let mut sections: Vec<String> = Vec::new();

    if !aggregation.diary_entries.is_empty() {
        let mut s = format!("{}\n", labels.diary);
        for d in &aggregation.diary_entries {
            s.push_str(&format!("- [{}] {}", d.created_at.format("%H:%M"), d.content));
            if let Some(ref mood) = d.mood {
                s.push_str(&format!(" ({}: {mood})", labels.mood));
            }
            s.push('\n');
        }
        sections.push(s);
    }
    if !aggregation.gratitude_entries.is_empty() {
        let mut s = format!("{}\n", labels.gratitude);
        for g in &aggregation.gratitude_entries {
            let when = match g.time_of_day {
                TimeOfDay::Morning => labels.morning,
                TimeOfDay::Evening => labels.evening,
            };
            s.push_str(&format!("- [{when}] {}\n", g.content));
        }
        sections.push(s);
    }
    if !aggregation.breathing_sessions.is_empty() {
        let mut s = format!("{}\n", labels.breathing);
        for b in &aggregation.breathing_sessions {
            s.push_str(&format!(
                "- {}: {} min\n",
                b.method_id,
                minutes_rounded(u64::from(b.duration_seconds))
            ));
        }
        sections.push(s);
    }

    sections.join("\n").trim_end().to_string()
}

pub fn format_morning(aggregation: &MorningAggregation, language: Language) -> String {
    if !aggregation.has_data {
        return String::new();
    }
    let labels = Labels::for_language(language);
    let mut sections: Vec<String> = Vec::new();

    if let Some(ref summary) = aggregation.last_evening_summary {
        sections.push(format!("{}\n{summary}\n", labels.last_evening));
    }
    if !aggregation.today_goals.is_empty() {
        let mut s = format!("{}\n", labels.impulses);
        for goal in &aggregation.today_goals {
            s.push_str(&format!("- {goal}\n"));
        }
        sections.push(s);
    }

    sections.join("\n").trim_end().to_string()
}

/// False iff the aggregation's range is empty or inverted.
pub fn validate_aggregation(aggregation: &Aggregation) -> bool {
    aggregation.data_range().is_valid()
}

pub(crate) fn no_activity_summary(language: Language) -> &'static str {
    match language {
        Language::De => "Keine Aktivitäten in den letzten 24 Stunden.",
        Language::En => "No activity in the last 24 hours.",
    }
}

pub(crate) fn offline_summary(language: Language) -> &'static str {
    match language {
        Language::De => "Offline-Modus: keine Daten verfügbar.",
        Language::En => "Offline mode: no data available.",
    }
}

fn newest_first<T: Record>(mut records: Vec<T>) -> Vec<T> {
    records.sort_by_key(|r| std::cmp::Reverse(r.created_at()));
    records.truncate(MAX_ITEMS_PER_DOMAIN);
    records
}

fn breathing_minutes(sessions: &[BreathingRecord]) -> u64 {
    minutes_rounded(sessions.iter().map(|b| u64::from(b.duration_seconds)).sum())
}

fn minutes_rounded(seconds: u64) -> u64 {
    (seconds + 30) / 60
}

struct DomainCounts {
    diary: usize,
    gratitude_morning: usize,
    gratitude_evening: usize,
    breathing: usize,
    breathing_minutes: u64,
}

impl DomainCounts {
    fn any(&self) -> bool {
        self.diary + self.gratitude_morning + self.gratitude_evening + self.breathing > 0
    }

    fn summary(&self, language: Language) -> String {
        let mut clauses = Vec::new();
        match language {
            Language::De => {
                if self.diary > 0 {
                    let noun = if self.diary == 1 { "Tagebucheintrag" } else { "Tagebucheinträge" };
                    clauses.push(format!("{} {noun}", self.diary));
                }
                match (self.gratitude_morning, self.gratitude_evening) {
                    (0, 0) => {}
                    (m, 0) => clauses.push(format!("{m} Morgen-Dankbarkeit")),
                    (0, e) => clauses.push(format!("{e} Abend-Dankbarkeit")),
                    (m, e) => clauses.push(format!("{m} Morgen- und {e} Abend-Dankbarkeit")),
                }
                if self.breathing > 0 {
                    let noun = if self.breathing == 1 { "Atemübung" } else { "Atemübungen" };
                    clauses.push(format!(
                        "{} abgeschlossene {noun} ({} Minuten)",
                        self.breathing, self.breathing_minutes
                    ));
                }
                format!("Letzte 24 Stunden: {}.", clauses.join(", "))
            }
            Language::En => {
                if self.diary > 0 {
                    let noun = if self.diary == 1 { "diary entry" } else { "diary entries" };
                    clauses.push(format!("{} {noun}", self.diary));
                }
                let gratitude_noun = |n: usize| if n == 1 { "entry" } else { "entries" };
                match (self.gratitude_morning, self.gratitude_evening) {
                    (0, 0) => {}
                    (m, 0) => clauses.push(format!("{m} morning gratitude {}", gratitude_noun(m))),
                    (0, e) => clauses.push(format!("{e} evening gratitude {}", gratitude_noun(e))),
                    (m, e) => clauses.push(format!(
                        "{m} morning and {e} evening gratitude {}",
                        gratitude_noun(m + e)
                    )),
                }
                if self.breathing > 0 {
                    let noun = if self.breathing == 1 { "session" } else { "sessions" };
                    clauses.push(format!(
                        "{} completed breathing {noun} ({} minutes total)",
                        self.breathing, self.breathing_minutes
                    ));
                }
                format!("Last 24 hours: {}.", clauses.join(", "))
            }
        }
    }
}

struct Labels {
    diary: &'static str,
    gratitude: &'static str,
    breathing: &'static str,
    last_evening: &'static str,
    impulses: &'static str,
    mood: &'static str,
    morning: &'static str,
    evening: &'static str,
}

impl Labels {
    fn for_language(language: Language) -> Self {
        match language {
            Language::De => Self {
                diary: "TAGEBUCH:",
                gratitude: "DANKBARKEIT:",
                breathing: "ATEMÜBUNGEN:",
                last_evening: "ZUSAMMENFASSUNG GESTERN ABEND:",
                impulses: "IMPULSE FÜR HEUTE:",
                mood: "Stimmung",
                morning: "Morgen",
                evening: "Abend",
            },
            Language::En => Self {
                diary: "DIARY ENTRIES:",
                gratitude: "GRATITUDE:",
                breathing: "BREATHING SESSIONS:",
                last_evening: "LAST EVENING SUMMARY:",
                impulses: "TODAY'S IMPULSES:",
                mood: "mood",
                morning: "morning",
                evening: "evening",
            },
        }
    }
}
