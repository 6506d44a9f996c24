//! Locally generated insight text used when the model cannot be reached.

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::Language;
use crate::prompt::random_breathing_recommendation;

const FALLBACK_DE: &[&str] = &[
    "• Du hast dir heute Zeit für dich genommen, das zählt.\n\
     • Jeder Tag bringt kleine Momente, die es wert sind, bemerkt zu werden.\n\
     • Sei stolz auf das, was du geschafft hast, auch auf die kleinen Dinge.",
    "• Nimm dir einen Augenblick, um innezuhalten und durchzuatmen.\n\
     • Nicht jeder Tag muss perfekt sein, um wertvoll zu sein.\n\
     • Gönn dir heute Abend etwas Ruhe und Freundlichkeit.",
    "• Du darfst den Tag so annehmen, wie er war.\n\
     • Achte darauf, was dir heute Kraft gegeben hat.\n\
     • Morgen ist eine neue Gelegenheit für einen guten Moment.",
];

const FALLBACK_EN: &[&str] = &[
    "• You took time for yourself today, and that matters.\n\
     • Every day holds small moments worth noticing.\n\
     • Be proud of what you accomplished, including the small things.",
    "• Take a moment to pause and breathe.\n\
     • A day does not have to be perfect to be valuable.\n\
     • Allow yourself some calm and kindness tonight.",
    "• You can accept the day just as it was.\n\
     • Notice what gave you strength today.\n\
     • Tomorrow is a fresh chance for a good moment.",
];

fn breathing_label(language: Language) -> &'static str {
    match language {
        Language::De => "Atemempfehlung",
        Language::En => "Breathing recommendation",
    }
}

/// Number of distinct fallback bodies per language.
pub fn variant_count(language: Language) -> usize {
    pool(language).len()
}

fn pool(language: Language) -> &'static [&'static str] {
    match language {
        Language::De => FALLBACK_DE,
        Language::En => FALLBACK_EN,
    }
}

/// A random fallback body followed by a breathing recommendation line.
pub fn fallback_content<R: Rng + ?Sized>(language: Language, rng: &mut R) -> String {
    let body = pool(language).choose(rng).copied().unwrap_or_default();
    let breathing = random_breathing_recommendation(language, rng);
    format!("{body}\n\n{}: {breathing}", breathing_label(language))
}
