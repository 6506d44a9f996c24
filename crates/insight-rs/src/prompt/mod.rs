//! Prompt assembly: localized system prompts, data embedding, PII
//! scrubbing, and token budgeting.
//!
//! A [`Prompt`] is a system/user pair plus a character-based token
//! estimate. Estimates use a fixed [`CHARS_PER_TOKEN`] ratio so they are
//! deterministic and monotonic in prompt length, which is all the budget
//! checks need.

pub(crate) mod templates;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{EveningAggregation, MorningAggregation, format_evening, format_morning};
use crate::redact::{self, RedactionMap, ScrubOptions};
use crate::{InsightKind, Language, TRUNCATION_MARKER, truncate_with_ellipsis};

// ── Constants ──────────────────────────────────────────────────────

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Largest prompt (system + user) accepted without optimization.
pub const MAX_PROMPT_TOKENS: usize = 2000;

// ── Types ──────────────────────────────────────────────────────────

/// Prompt composition settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PromptConfig {
    pub language: Language,
    /// Scrub PII from embedded user data before it reaches the model.
    pub redact_pii: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            language: Language::De,
            redact_pii: true,
        }
    }
}

impl PromptConfig {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            ..Default::default()
        }
    }

    pub fn with_redaction(mut self, redact_pii: bool) -> Self {
        self.redact_pii = redact_pii;
        self
    }
}

/// A ready-to-send prompt.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub system_prompt: String,
    pub user_prompt: String,
    pub estimated_token_count: usize,
    pub language: Language,
    pub kind: InsightKind,
    /// Placeholder → original mapping for scrubbed user data. Empty when
    /// redaction was off or nothing was found.
    #[serde(default)]
    pub redactions: RedactionMap,
}

impl Prompt {
    fn new(
        kind: InsightKind,
        language: Language,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        redactions: RedactionMap,
    ) -> Self {
        let system_prompt = system_prompt.into();
        let user_prompt = user_prompt.into();
        Self {
            estimated_token_count: estimate_prompt_tokens(&system_prompt, &user_prompt),
            system_prompt,
            user_prompt,
            language,
            kind,
            redactions,
        }
    }
}

// ── Estimation ─────────────────────────────────────────────────────

/// `ceil(chars / CHARS_PER_TOKEN)`, counting characters rather than bytes.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn estimate_prompt_tokens(system: &str, user: &str) -> usize {
    (system.chars().count() + user.chars().count()).div_ceil(CHARS_PER_TOKEN)
}

// ── Builders ───────────────────────────────────────────────────────

pub fn build_evening_prompt(aggregation: &EveningAggregation, config: &PromptConfig) -> Prompt {
    let language = config.language;
    let system = templates::evening_system(language);

    if !aggregation.has_data {
        return Prompt::new(
            InsightKind::Evening,
            language,
            system,
            templates::evening_user_no_data(language),
            RedactionMap::new(),
        );
    }

    let (data, redactions) = scrub_if_enabled(format_evening(aggregation, language), config);
    Prompt::new(
        InsightKind::Evening,
        language,
        system,
        templates::evening_user(language, &data),
        redactions,
    )
}

pub fn build_morning_prompt(aggregation: &MorningAggregation, config: &PromptConfig) -> Prompt {
    let language = config.language;
    let system = templates::morning_system(language);

    if !aggregation.has_data {
        return Prompt::new(
            InsightKind::Morning,
            language,
            system,
            templates::morning_user_no_data(language),
            RedactionMap::new(),
        );
    }

    // Only the stored summary is user-authored; impulses come from our own
    // pools and are left alone.
    let mut redactions = RedactionMap::new();
    let mut scrubbed;
    let aggregation = match aggregation.last_evening_summary {
        Some(ref summary) if config.redact_pii => {
            let result = redact::scrub(summary, &ScrubOptions::default());
            redactions = result.original_map;
            scrubbed = aggregation.clone();
            scrubbed.last_evening_summary = Some(result.scrubbed_text);
            &scrubbed
        }
        _ => aggregation,
    };

    Prompt::new(
        InsightKind::Morning,
        language,
        system,
        templates::morning_user(language, &format_morning(aggregation, language)),
        redactions,
    )
}

/// Generic prompt used when no usable aggregation exists.
pub fn build_fallback_prompt(kind: InsightKind, language: Language) -> Prompt {
    let (system, user) = match kind {
        InsightKind::Evening => (
            templates::evening_system(language),
            templates::evening_user_no_data(language),
        ),
        InsightKind::Morning => (
            templates::morning_system(language),
            templates::morning_user_no_data(language),
        ),
    };
    Prompt::new(kind, language, system, user, RedactionMap::new())
}

fn scrub_if_enabled(data: String, config: &PromptConfig) -> (String, RedactionMap) {
    if !config.redact_pii {
        return (data, RedactionMap::new());
    }
    let result = redact::scrub(&data, &ScrubOptions::default());
    if !result.original_map.is_empty() {
        debug!("Scrubbed {} PII occurrence(s) from prompt data", result.original_map.len());
    }
    (result.scrubbed_text, result.original_map)
}

// ── Budgeting ──────────────────────────────────────────────────────

pub fn validate_prompt_size(prompt: &Prompt) -> bool {
    prompt.estimated_token_count <= MAX_PROMPT_TOKENS
}

/// Shrink the user prompt until the estimate fits `target_tokens`
/// (default [`MAX_PROMPT_TOKENS`]). The system prompt is never touched.
///
/// Returns an equal prompt when already within budget. Otherwise the user
/// prompt is cut at a character boundary and ends with
/// [`TRUNCATION_MARKER`], unless the remaining room is too small to hold
/// the marker, in which case it is cut without one. The user prompt always
/// gets strictly shorter. When the system prompt alone exceeds the target,
/// the user prompt is cut by at least one token's worth of characters.
pub fn optimize_for_token_budget(prompt: &Prompt, target_tokens: Option<usize>) -> Prompt {
    let target = target_tokens.unwrap_or(MAX_PROMPT_TOKENS);
    let current = estimate_prompt_tokens(&prompt.system_prompt, &prompt.user_prompt);
    if current <= target {
        return prompt.clone();
    }

    // Over budget implies the user prompt is longer than `room`.
    let system_chars = prompt.system_prompt.chars().count();
    let room = (target * CHARS_PER_TOKEN)
        .checked_sub(system_chars)
        .unwrap_or_else(|| ((current - 1) * CHARS_PER_TOKEN).saturating_sub(system_chars));
    let marker_chars = TRUNCATION_MARKER.chars().count();

    let user_prompt = if room > marker_chars {
        truncate_with_ellipsis(&prompt.user_prompt, room - marker_chars)
    } else {
        prompt.user_prompt.chars().take(room).collect()
    };
    let optimized = Prompt {
        estimated_token_count: estimate_prompt_tokens(&prompt.system_prompt, &user_prompt),
        user_prompt,
        ..prompt.clone()
    };
    debug!(
        "Prompt over budget: {} → {} estimated tokens (target {})",
        current, optimized.estimated_token_count, target
    );
    optimized
}

// ── Randomized content ─────────────────────────────────────────────

/// One breathing exercise suggestion from the language's pool.
pub fn random_breathing_recommendation<R: Rng + ?Sized>(
    language: Language,
    rng: &mut R,
) -> &'static str {
    templates::breathing_recommendations(language)
        .choose(rng)
        .copied()
        .unwrap_or_default()
}

/// Up to `count` distinct morning impulses, in random order.
pub fn random_morning_impulses<R: Rng + ?Sized>(
    language: Language,
    count: usize,
    rng: &mut R,
) -> Vec<String> {
    templates::morning_impulses(language)
        .choose_multiple(rng, count)
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DataRange;
    use crate::records::DiaryRecord;
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn range() -> DataRange {
        DataRange::ending_at(Utc.with_ymd_and_hms(2026, 3, 1, 21, 0, 0).unwrap(), 24)
    }

    fn evening_with_diary(content: &str) -> EveningAggregation {
        EveningAggregation {
            diary_entries: vec![DiaryRecord {
                id: "d1".into(),
                user_id: "u1".into(),
                created_at: Utc.with_ymd_and_hms(2026, 3, 1, 20, 15, 0).unwrap(),
                content: content.into(),
                mood: Some("ruhig".into()),
            }],
            gratitude_entries: vec![],
            breathing_sessions: vec![],
            summary: "Letzte 24 Stunden: 1 Tagebucheintrag.".into(),
            has_data: true,
            data_range: range(),
        }
    }

    fn empty_evening() -> EveningAggregation {
        EveningAggregation {
            diary_entries: vec![],
            gratitude_entries: vec![],
            breathing_sessions: vec![],
            summary: String::new(),
            has_data: false,
            data_range: range(),
        }
    }

    #[test]
    fn evening_prompt_embeds_scrubbed_data() {
        let agg = evening_with_diary("Kaffee mit Anna Müller getrunken.");
        let prompt = build_evening_prompt(&agg, &PromptConfig::default());

        assert_eq!(prompt.kind, InsightKind::Evening);
        assert_eq!(prompt.language, Language::De);
        assert!(prompt.system_prompt.contains("Atemempfehlung:"));
        assert!(prompt.user_prompt.contains("TAGEBUCH:"));
        assert!(prompt.user_prompt.contains("- [20:15] Kaffee mit [NAME]_1 getrunken."));
        assert!(!prompt.user_prompt.contains("Anna"));
        assert_eq!(prompt.redactions["[NAME]_1"], "Anna Müller");
    }

    #[test]
    fn redaction_can_be_disabled() {
        let agg = evening_with_diary("Kaffee mit Anna Müller getrunken.");
        let config = PromptConfig::new(Language::En).with_redaction(false);
        let prompt = build_evening_prompt(&agg, &config);

        assert!(prompt.user_prompt.contains("Anna Müller"));
        assert!(prompt.user_prompt.contains("DIARY ENTRIES:"));
        assert!(prompt.system_prompt.contains("Breathing recommendation:"));
        assert!(prompt.redactions.is_empty());
    }

    #[test]
    fn no_data_uses_sentinel() {
        let prompt = build_evening_prompt(&empty_evening(), &PromptConfig::default());
        assert!(prompt.user_prompt.starts_with("Keine Daten verfügbar."));

        let morning = MorningAggregation {
            last_evening_summary: None,
            today_goals: vec![],
            has_data: false,
            data_range: range(),
        };
        let prompt = build_morning_prompt(&morning, &PromptConfig::new(Language::En));
        assert!(prompt.user_prompt.starts_with("No data available."));
        assert!(prompt.system_prompt.contains("Daily focus:"));
    }

    #[test]
    fn morning_prompt_scrubs_summary_only() {
        let morning = MorningAggregation {
            last_evening_summary: Some("Abend mit Hans Schmidt verbracht.".into()),
            today_goals: vec!["Trink ein Glas Wasser.".into()],
            has_data: true,
            data_range: range(),
        };
        let prompt = build_morning_prompt(&morning, &PromptConfig::default());

        assert!(prompt.user_prompt.contains("Abend mit [NAME]_1 verbracht."));
        assert!(prompt.user_prompt.contains("- Trink ein Glas Wasser."));
        assert_eq!(prompt.redactions.len(), 1);
        assert!(prompt.system_prompt.contains("Tagesfokus:"));
    }

    #[test]
    fn estimate_is_ceiling_of_chars_over_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // Multi-byte characters count once.
        assert_eq!(estimate_tokens("äöüß"), 1);

        let prompt = build_fallback_prompt(InsightKind::Morning, Language::De);
        let chars = prompt.system_prompt.chars().count() + prompt.user_prompt.chars().count();
        assert_eq!(prompt.estimated_token_count, chars.div_ceil(4));
    }

    #[test]
    fn fallback_prompt_matches_kind() {
        let prompt = build_fallback_prompt(InsightKind::Evening, Language::En);
        assert_eq!(prompt.kind, InsightKind::Evening);
        assert!(prompt.user_prompt.starts_with("No data available."));
        assert!(validate_prompt_size(&prompt));
    }

    #[test]
    fn size_validation_threshold() {
        let mut prompt = build_fallback_prompt(InsightKind::Evening, Language::De);
        prompt.estimated_token_count = MAX_PROMPT_TOKENS;
        assert!(validate_prompt_size(&prompt));
        prompt.estimated_token_count = MAX_PROMPT_TOKENS + 1;
        assert!(!validate_prompt_size(&prompt));
    }

    #[test]
    fn optimize_is_noop_under_budget() {
        let prompt = build_fallback_prompt(InsightKind::Evening, Language::De);
        assert_eq!(optimize_for_token_budget(&prompt, None), prompt);
    }

    #[test]
    fn optimize_truncates_user_prompt_only() {
        // Longer than the aggregator would ever emit, to force an oversized prompt.
        let agg = evening_with_diary(&"Ein langer Tag. ".repeat(1000));
        let prompt = build_evening_prompt(&agg, &PromptConfig::default().with_redaction(false));
        assert!(!validate_prompt_size(&prompt));

        let optimized = optimize_for_token_budget(&prompt, None);
        assert!(optimized.estimated_token_count < prompt.estimated_token_count);
        assert!(optimized.estimated_token_count <= MAX_PROMPT_TOKENS);
        assert!(validate_prompt_size(&optimized));
        assert!(optimized.user_prompt.ends_with("..."));
        assert_eq!(optimized.system_prompt, prompt.system_prompt);
    }

    #[test]
    fn optimize_honors_custom_target() {
        let prompt = build_evening_prompt(
            &evening_with_diary(&"x".repeat(400)),
            &PromptConfig::default(),
        );
        let target = prompt.estimated_token_count - 50;
        let optimized = optimize_for_token_budget(&prompt, Some(target));
        assert!(optimized.estimated_token_count <= target);
        assert!(optimized.user_prompt.ends_with("..."));
    }

    #[test]
    fn optimize_with_target_below_system_prompt_still_shrinks() {
        let prompt = build_evening_prompt(
            &evening_with_diary("Ruhiger Tag."),
            &PromptConfig::default(),
        );
        let optimized = optimize_for_token_budget(&prompt, Some(1));
        assert!(optimized.estimated_token_count < prompt.estimated_token_count);
        assert_eq!(optimized.system_prompt, prompt.system_prompt);
    }

    #[test]
    fn optimize_never_grows_a_tiny_user_prompt() {
        let system = templates::evening_system(Language::De);
        let prompt = Prompt::new(
            InsightKind::Evening,
            Language::De,
            system,
            "ab",
            RedactionMap::new(),
        );
        let optimized = optimize_for_token_budget(&prompt, Some(1));

        assert!(optimized.user_prompt.chars().count() < 2);
        assert!(!optimized.user_prompt.ends_with("..."));
        assert!(optimized.estimated_token_count <= prompt.estimated_token_count);
        assert_eq!(optimized.system_prompt, prompt.system_prompt);
    }

    #[test]
    fn optimize_fits_target_just_above_system_prompt() {
        let system = templates::evening_system(Language::En);
        let target = estimate_tokens(system) + 1;
        let user = "x".repeat(CHARS_PER_TOKEN * 3);
        let prompt = Prompt::new(
            InsightKind::Evening,
            Language::En,
            system,
            user.clone(),
            RedactionMap::new(),
        );
        assert!(prompt.estimated_token_count > target);

        let optimized = optimize_for_token_budget(&prompt, Some(target));
        assert!(optimized.user_prompt.chars().count() < user.chars().count());
        assert!(optimized.estimated_token_count <= target);
    }

    #[test]
    fn morning_impulses_vary_across_calls() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = HashSet::new();
        for _ in 0..20 {
            let picks = random_morning_impulses(Language::De, 3, &mut rng);
            assert_eq!(picks.len(), 3);
            let unique: HashSet<_> = picks.iter().collect();
            assert_eq!(unique.len(), 3, "impulses are drawn without replacement");
            seen.extend(picks);
        }
        assert!(seen.len() > 3);
    }

    #[test]
    fn impulse_count_is_clamped_to_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        let picks = random_morning_impulses(Language::En, 100, &mut rng);
        assert_eq!(picks.len(), templates::morning_impulses(Language::En).len());
    }

    #[test]
    fn breathing_recommendations_vary() {
        let mut rng = StdRng::seed_from_u64(3);
        let seen: HashSet<&str> = (0..30)
            .map(|_| random_breathing_recommendation(Language::En, &mut rng))
            .collect();
        assert!(seen.len() > 1);
        assert!(
            seen.iter()
                .all(|r| templates::breathing_recommendations(Language::En).contains(r))
        );
    }
}
