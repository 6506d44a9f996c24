//! Per-user call and token accounting.
//!
//! A [`UsageStore`] tracks how many calls and tokens each user consumed
//! today, plus a sliding one-minute window of call timestamps. Daily
//! counters roll over automatically at the UTC date boundary and can be
//! cleared explicitly with [`UsageStore::reset_daily_limits`].
//!
//! Checks against these counters are advisory: concurrent requests for the
//! same user may read the same status before either increments it.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Width of the per-minute rate window.
const MINUTE_WINDOW_SECS: i64 = 60;

/// Per-user ceilings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RateLimits {
    pub max_calls_per_day: u32,
    pub max_tokens_per_day: u64,
    pub max_calls_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_calls_per_day: 20,
            max_tokens_per_day: 20_000,
            max_calls_per_minute: 5,
        }
    }
}

impl RateLimits {
    /// Name of the first limit a request estimated at `estimated_tokens`
    /// would break, or `None` if it fits.
    pub fn exceeded_by(&self, status: &UsageStatus, estimated_tokens: u64) -> Option<&'static str> {
        if status.calls_today >= self.max_calls_per_day {
            Some("daily call limit")
        } else if status.tokens_today.saturating_add(estimated_tokens) > self.max_tokens_per_day {
            Some("daily token limit")
        } else if status.calls_last_minute >= self.max_calls_per_minute {
            Some("per-minute call limit")
        } else {
            None
        }
    }

    fn is_limited(&self, status: &UsageStatus) -> bool {
        status.calls_today >= self.max_calls_per_day
            || status.tokens_today >= self.max_tokens_per_day
            || status.calls_last_minute >= self.max_calls_per_minute
    }
}

/// Snapshot of one user's consumption.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UsageStatus {
    pub calls_today: u32,
    pub tokens_today: u64,
    pub last_call_time: Option<DateTime<Utc>>,
    pub calls_last_minute: u32,
    /// Whether any limit is already reached.
    pub is_limited: bool,
}

/// Boxed future returned by [`UsageStore`] methods.
pub type UsageFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistence for per-user usage counters.
///
/// Methods are infallible: a store that cannot persist logs the failure and
/// keeps serving from memory.
pub trait UsageStore: Send + Sync {
    fn status<'a>(&'a self, user_id: &'a str) -> UsageFuture<'a, UsageStatus>;

    fn increment_usage<'a>(&'a self, user_id: &'a str, tokens: u64) -> UsageFuture<'a, ()>;

    /// Zero every user's daily call and token counters.
    fn reset_daily_limits(&self) -> UsageFuture<'_, ()>;
}

// ── Ledger ─────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
struct UserUsage {
    day: NaiveDate,
    calls_today: u32,
    tokens_today: u64,
    last_call_time: Option<DateTime<Utc>>,
    #[serde(default)]
    recent_calls: Vec<DateTime<Utc>>,
}

impl UserUsage {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            calls_today: 0,
            tokens_today: 0,
            last_call_time: None,
            recent_calls: Vec::new(),
        }
    }
}

/// Clock-explicit usage bookkeeping shared by the store implementations.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct UsageLedger {
    #[serde(default)]
    users: HashMap<String, UserUsage>,
}

impl UsageLedger {
    pub(crate) fn status(
        &self,
        user_id: &str,
        limits: &RateLimits,
        now: DateTime<Utc>,
    ) -> UsageStatus {
        let Some(usage) = self.users.get(user_id) else {
            return UsageStatus::default();
        };
        let today = usage.day == now.date_naive();
        let window_start = now - Duration::seconds(MINUTE_WINDOW_SECS);
        let calls_last_minute = usage
            .recent_calls
            .iter()
            .filter(|t| **t > window_start && **t <= now)
            .count();

        let mut status = UsageStatus {
            calls_today: if today { usage.calls_today } else { 0 },
            tokens_today: if today { usage.tokens_today } else { 0 },
            last_call_time: usage.last_call_time,
            calls_last_minute: u32::try_from(calls_last_minute).unwrap_or(u32::MAX),
            is_limited: false,
        };
        status.is_limited = limits.is_limited(&status);
        status
    }

    pub(crate) fn record(&mut self, user_id: &str, tokens: u64, now: DateTime<Utc>) {
        let day = now.date_naive();
        let usage = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserUsage::new(day));
        if usage.day != day {
            usage.day = day;
            usage.calls_today = 0;
            usage.tokens_today = 0;
        }
        usage.calls_today = usage.calls_today.saturating_add(1);
        usage.tokens_today = usage.tokens_today.saturating_add(tokens);
        usage.last_call_time = Some(now);

        let window_start = now - Duration::seconds(MINUTE_WINDOW_SECS);
        usage.recent_calls.retain(|t| *t > window_start);
        usage.recent_calls.push(now);
    }

    pub(crate) fn reset_daily(&mut self) {
        for usage in self.users.values_mut() {
            usage.calls_today = 0;
            usage.tokens_today = 0;
        }
    }
}

// ── In-memory store ────────────────────────────────────────────────

/// Process-local [`UsageStore`]. Counters are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    limits: RateLimits,
    ledger: Mutex<UsageLedger>,
}

impl InMemoryUsageStore {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            ledger: Mutex::new(UsageLedger::default()),
        }
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }
}

impl UsageStore for InMemoryUsageStore {
    fn status<'a>(&'a self, user_id: &'a str) -> UsageFuture<'a, UsageStatus> {
        let status = lock(&self.ledger).status(user_id, &self.limits, Utc::now());
        Box::pin(async move { status })
    }

    fn increment_usage<'a>(&'a self, user_id: &'a str, tokens: u64) -> UsageFuture<'a, ()> {
        lock(&self.ledger).record(user_id, tokens, Utc::now());
        Box::pin(async {})
    }

    fn reset_daily_limits(&self) -> UsageFuture<'_, ()> {
        lock(&self.ledger).reset_daily();
        debug!("Daily usage counters reset");
        Box::pin(async {})
    }
}

fn lock(ledger: &Mutex<UsageLedger>) -> std::sync::MutexGuard<'_, UsageLedger> {
    ledger.lock().unwrap_or_else(|e| e.into_inner())
}

// ── File-backed store ──────────────────────────────────────────────

/// Error opening a [`FileUsageStore`].
#[derive(Debug, thiserror::Error)]
pub enum UsageStoreError {
    #[error("failed to read usage file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse usage file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// [`UsageStore`] persisted as a JSON file.
///
/// The file is loaded once at open and rewritten atomically (temp file +
/// rename) after every mutation. Write failures are logged; the in-memory
/// ledger stays authoritative for the life of the process.
#[derive(Debug)]
pub struct FileUsageStore {
    path: PathBuf,
    limits: RateLimits,
    ledger: Mutex<UsageLedger>,
}

impl FileUsageStore {
    /// Open the store at `path`. A missing file starts an empty ledger.
    pub fn open(path: impl Into<PathBuf>, limits: RateLimits) -> Result<Self, UsageStoreError> {
        let path = path.into();
        let ledger = if path.exists() {
            let json = std::fs::read_to_string(&path).map_err(|source| UsageStoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&json).map_err(|source| UsageStoreError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            UsageLedger::default()
        };
        Ok(Self {
            path,
            limits,
            ledger: Mutex::new(ledger),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Apply `f` to the ledger and persist the result while still holding
    /// the lock, so concurrent writers cannot reorder snapshots.
    fn mutate(&self, f: impl FnOnce(&mut UsageLedger)) {
        let mut ledger = lock(&self.ledger);
        f(&mut ledger);
        if let Err(e) = self.save(&ledger) {
            warn!("Failed to persist usage to {}: {e}", self.path.display());
        }
    }

    fn save(&self, ledger: &UsageLedger) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(ledger)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)
    }
}

impl UsageStore for FileUsageStore {
    fn status<'a>(&'a self, user_id: &'a str) -> UsageFuture<'a, UsageStatus> {
        let status = lock(&self.ledger).status(user_id, &self.limits, Utc::now());
        Box::pin(async move { status })
    }

    fn increment_usage<'a>(&'a self, user_id: &'a str, tokens: u64) -> UsageFuture<'a, ()> {
        self.mutate(|ledger| ledger.record(user_id, tokens, Utc::now()));
        Box::pin(async {})
    }

    fn reset_daily_limits(&self) -> UsageFuture<'_, ()> {
        self.mutate(UsageLedger::reset_daily);
        debug!("Daily usage counters reset in {}", self.path.display());
        Box::pin(async {})
    }
}
