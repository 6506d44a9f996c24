//! Heuristic PII scrubbing with reversible placeholders.
//!
//! [`scrub`] replaces names, locations, email addresses, and phone numbers
//! with tokens like `[NAME]_1` and returns the mapping needed to restore
//! them with [`unscrub`]. Numbering is per category, left to right, one
//! index per occurrence.
//!
//! This is a best-effort scrub tuned for German and English journal text,
//! not a certified anonymizer. Known limitation: a bare capitalized word
//! after a locational preposition (`"in Berlin"`) is classified as a name,
//! not a location.
//!
//! All patterns run on the `regex` crate's finite-automata engine, so
//! matching is linear in the input length.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kinds of personal data the scrubber recognizes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PiiCategory {
    Name,
    Location,
    Email,
    Phone,
}

impl PiiCategory {
    /// All categories in overlap-resolution priority order.
    pub const ALL: [PiiCategory; 4] = [
        PiiCategory::Email,
        PiiCategory::Phone,
        PiiCategory::Location,
        PiiCategory::Name,
    ];

    /// Placeholder label used when no custom label is configured.
    pub fn default_label(self) -> &'static str {
        match self {
            PiiCategory::Name => "NAME",
            PiiCategory::Location => "LOCATION",
            PiiCategory::Email => "EMAIL",
            PiiCategory::Phone => "PHONE",
        }
    }
}

/// Per-call scrubbing options.
#[derive(Debug, Clone)]
pub struct ScrubOptions {
    /// Overrides the bracketed label for a category, e.g. `Name → "PERSON"`
    /// yields `[PERSON]_1`. Labels must not contain `[`, `]`, or newlines.
    pub custom_placeholders: HashMap<PiiCategory, String>,
    /// Categories to detect. Defaults to all.
    pub categories: Vec<PiiCategory>,
}

impl Default for ScrubOptions {
    fn default() -> Self {
        Self {
            custom_placeholders: HashMap::new(),
            categories: PiiCategory::ALL.to_vec(),
        }
    }
}

impl ScrubOptions {
    pub fn with_placeholder(mut self, category: PiiCategory, label: impl Into<String>) -> Self {
        self.custom_placeholders.insert(category, label.into());
        self
    }

    /// Restrict detection to the given categories.
    pub fn only(mut self, categories: impl IntoIterator<Item = PiiCategory>) -> Self {
        self.categories = categories.into_iter().collect();
        self
    }

    fn label(&self, category: PiiCategory) -> &str {
        self.custom_placeholders
            .get(&category)
            .map(String::as_str)
            .unwrap_or_else(|| category.default_label())
    }
}

/// Placeholder token → original substring.
pub type RedactionMap = BTreeMap<String, String>;

/// Output of [`scrub`].
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RedactionResult {
    pub scrubbed_text: String,
    pub original_map: RedactionMap,
}

/// Number of detections per category.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PiiCounts {
    pub names: usize,
    pub locations: usize,
    pub emails: usize,
    pub phones: usize,
}

impl PiiCounts {
    pub fn total(&self) -> usize {
        self.names + self.locations + self.emails + self.phones
    }
}

// ── Patterns ───────────────────────────────────────────────────────

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b"));

/// German numbers: `+49`/`0049` international prefix or a domestic leading 0,
/// an area code, and a subscriber number with optional separators.
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    compile(concat!(
        r"(?:(?:\+|\b00)49[ /-]?(?:\(0\)[ /-]?)?|\b0)",
        r"\d{2,5}[ /-]?\d{3,8}(?:[ -]\d{2,5})?\b",
    ))
});

static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    compile(concat!(
        // Hauptstraße 12, Bahnhofstr. 5, Lindenweg 3a
        r"\b\p{Lu}[\p{L}-]*(?:straße|strasse|str\.|weg|gasse|platz|allee|ring|damm|ufer)",
        r"[ \t]+\d{1,4}[a-z]?\b",
        // Berliner Straße 7
        r"|\b\p{Lu}\p{Ll}+[ \t]+(?:Straße|Strasse|Weg|Gasse|Platz|Allee|Ring|Damm)",
        r"[ \t]+\d{1,4}[a-z]?\b",
        // 12 Baker Street
        r"|\b\d{1,5}[ \t]+\p{Lu}\p{Ll}+[ \t]+(?:Street|Road|Avenue|Lane|Drive)\b",
        // 10115 Berlin
        r"|\b\d{5}[ \t]+\p{Lu}\p{Ll}+\b",
    ))
});

const WORD: &str = r"\p{Lu}\p{Ll}+(?:-\p{Lu}\p{Ll}+)*";

static CAPITALIZED_WORD: LazyLock<Regex> = LazyLock::new(|| compile(WORD));

/// Two or more capitalized words separated by spaces.
static NAME_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"\b{WORD}(?:[ \t]+{WORD})+\b")));

/// A single capitalized word after a locational preposition or honorific.
static NAME_AFTER_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"\b(?:(?i:in|aus|nach|from)|Frau|Herrn?|Mrs|Mr|Ms|Dr)\.?[ \t]+({WORD})\b"
    ))
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| compile(r"\[[^\[\]\n]+\]_\d+"));

/// Capitalized words that are never names on their own: sentence
/// starters, pronouns, articles, time words, honorifics.
static NOT_A_NAME: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // German
        "Ich", "Du", "Er", "Sie", "Es", "Wir", "Ihr", "Mein", "Meine", "Meinen", "Meinem",
        "Meiner", "Dein", "Deine", "Unser", "Unsere", "Der", "Die", "Das", "Den", "Dem", "Des",
        "Ein", "Eine", "Einen", "Einem", "Einer", "Am", "Im", "Um", "In", "Aus", "Nach", "Zum",
        "Zur", "Vom", "Beim", "Mit", "Und", "Oder", "Aber", "Dann", "Danach", "Später", "Heute",
        "Gestern", "Morgen", "Vorgestern", "Übermorgen", "Morgens", "Mittags", "Abends",
        "Nachts", "Abend", "Mittag", "Nacht", "Vormittag", "Nachmittag", "Woche", "Wochenende",
        "Montag", "Dienstag", "Mittwoch", "Donnerstag", "Freitag", "Samstag", "Sonntag",
        "Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August", "September",
        "Oktober", "November", "Dezember", "Frau", "Herr", "Herrn", "Dr", "Liebe", "Lieber",
        "Hallo", "Danke", "Gott", "Mama", "Papa", "Oma", "Opa", "Hause", "Ruhe", "Arbeit",
        "Schule", "Bett",
        // English
        "The", "An", "This", "That", "These", "Those", "My", "Our", "Your", "His", "Her",
        "Their", "We", "You", "He", "She", "They", "It", "And", "But", "Or", "Then", "From",
        "At", "On", "Today", "Yesterday", "Tomorrow", "Tonight", "Morning", "Evening",
        "Afternoon", "Night", "Week", "Weekend", "Monday", "Tuesday", "Wednesday", "Thursday",
        "Friday", "Saturday", "Sunday", "January", "February", "March", "June", "July",
        "October", "December", "Mr", "Mrs", "Ms", "Dear", "Hello", "Thanks", "God", "Mom",
        "Mum", "Dad", "Home", "Work", "School",
    ]
    .into_iter()
    .collect()
});

// ── Detection ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    category: PiiCategory,
}

fn candidates(text: &str, category: PiiCategory) -> Vec<(usize, usize)> {
    match category {
        PiiCategory::Email => EMAIL.find_iter(text).map(|m| (m.start(), m.end())).collect(),
        PiiCategory::Phone => PHONE.find_iter(text).map(|m| (m.start(), m.end())).collect(),
        PiiCategory::Location => LOCATION.find_iter(text).map(|m| (m.start(), m.end())).collect(),
        PiiCategory::Name => name_candidates(text),
    }
}

fn name_candidates(text: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();

    for m in NAME_SEQUENCE.find_iter(text) {
        let words: Vec<(usize, usize)> = CAPITALIZED_WORD
            .find_iter(m.as_str())
            .map(|w| (m.start() + w.start(), m.start() + w.end()))
            .collect();
        let is_name = |&(s, e): &(usize, usize)| {
            text.get(s..e).is_some_and(|w| !NOT_A_NAME.contains(w))
        };
        let Some(first) = words.iter().position(is_name) else {
            continue;
        };
        let Some(last) = words.iter().rposition(is_name) else {
            continue;
        };
        if last > first {
            found.push((words[first].0, words[last].1));
        }
    }

    for caps in NAME_AFTER_TRIGGER.captures_iter(text) {
        if let Some(word) = caps.get(1)
            && !NOT_A_NAME.contains(word.as_str())
        {
            found.push((word.start(), word.end()));
        }
    }

    found
}

/// Detect non-overlapping PII spans, sorted by position.
///
/// Categories are resolved in [`PiiCategory::ALL`] priority order: a
/// candidate overlapping an already accepted span is dropped. Within a
/// category, candidates sharing a start position are tried longest first.
fn detect(text: &str, categories: &[PiiCategory]) -> Vec<Span> {
    // start → (end, category)
    let mut accepted: BTreeMap<usize, (usize, PiiCategory)> = BTreeMap::new();

    for category in PiiCategory::ALL {
        if !categories.contains(&category) {
            continue;
        }
        let mut found = candidates(text, category);
        found.sort_unstable_by_key(|&(start, end)| (start, Reverse(end)));
        for (start, end) in found {
            let overlaps_before = accepted
                .range(..=start)
                .next_back()
                .is_some_and(|(_, &(prev_end, _))| prev_end > start);
            let overlaps_after = accepted.range(start..end).next().is_some();
            if !overlaps_before && !overlaps_after {
                accepted.insert(start, (end, category));
            }
        }
    }

    accepted
        .into_iter()
        .map(|(start, (end, category))| Span {
            start,
            end,
            category,
        })
        .collect()
}

// ── Public API ─────────────────────────────────────────────────────

/// Replace detected PII with numbered placeholders.
///
/// Deterministic: identical input and options produce identical output.
/// Text without detectable PII is returned unchanged with an empty map.
pub fn scrub(text: &str, options: &ScrubOptions) -> RedactionResult {
    let spans = detect(text, &options.categories);
    if spans.is_empty() {
        return RedactionResult {
            scrubbed_text: text.to_string(),
            original_map: RedactionMap::new(),
        };
    }

    // Counters are keyed by label so categories sharing a custom label
    // never produce colliding placeholders.
    let mut counters: HashMap<&str, usize> = HashMap::new();
    let literal: HashSet<&str> = PLACEHOLDER.find_iter(text).map(|m| m.as_str()).collect();
    let mut original_map = RedactionMap::new();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for span in spans {
        out.push_str(text.get(cursor..span.start).unwrap_or_default());

        let label = options.label(span.category);
        let counter = counters.entry(label).or_insert(0);
        let placeholder = loop {
            *counter += 1;
            let candidate = format!("[{label}]_{counter}");
            // Skip tokens that already occur literally in the input.
            if !literal.contains(candidate.as_str()) {
                break candidate;
            }
        };

        original_map.insert(
            placeholder.clone(),
            text.get(span.start..span.end).unwrap_or_default().to_string(),
        );
        out.push_str(&placeholder);
        cursor = span.end;
    }
    out.push_str(text.get(cursor..).unwrap_or_default());

    RedactionResult {
        scrubbed_text: out,
        original_map,
    }
}

/// Restore original substrings for every mapped placeholder in `text`.
///
/// Placeholders missing from `map` are left as they are.
pub fn unscrub(text: &str, map: &RedactionMap) -> String {
    if map.is_empty() {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            map.get(token).cloned().unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

pub fn contains_pii(text: &str) -> bool {
    !detect(text, &PiiCategory::ALL).is_empty()
}

pub fn count_pii(text: &str) -> PiiCounts {
    let mut counts = PiiCounts::default();
    for span in detect(text, &PiiCategory::ALL) {
        match span.category {
            PiiCategory::Name => counts.names += 1,
            PiiCategory::Location => counts.locations += 1,
            PiiCategory::Email => counts.emails += 1,
            PiiCategory::Phone => counts.phones += 1,
        }
    }
    counts
}
