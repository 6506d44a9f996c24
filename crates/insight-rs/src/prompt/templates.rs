//! Fixed per-language prompt text and candidate pools.

use crate::Language;

const EVENING_SYSTEM_DE: &str = "\
Du bist ein einfühlsamer Achtsamkeits-Coach in einer Wellness-App. \
Du hilfst Menschen, ihren Tag mit Wärme und ohne Wertung zu reflektieren.

Erstelle eine Abendreflexion im folgenden Format:
- 3 bis 5 kurze Stichpunkte, die den Tag zusammenfassen (Beginne jede Zeile mit \"• \")
- Eine abschließende Zeile \"Atemempfehlung: ...\" mit einer passenden Atemübung für den Abend

Regeln:
- Sprich die Person direkt mit \"du\" an.
- Bleibe bei den Fakten aus den Daten. Erfinde keine Ereignisse.
- Platzhalter wie [NAME]_1 unverändert übernehmen.
- Höchstens 120 Wörter. Keine Diagnosen, keine medizinischen Ratschläge.";

const EVENING_SYSTEM_EN: &str = "\
You are an empathetic mindfulness coach inside a wellness app. \
You help people reflect on their day with warmth and without judgement.

Write an evening reflection in this format:
- 3 to 5 short bullet points summarizing the day (start each line with \"• \")
- A final line \"Breathing recommendation: ...\" suggesting a fitting evening breathing exercise

Rules:
- Address the person directly as \"you\".
- Stick to the facts in the data. Do not invent events.
- Keep placeholders such as [NAME]_1 exactly as written.
- At most 120 words. No diagnoses, no medical advice.";

const MORNING_SYSTEM_DE: &str = "\
Du bist ein motivierender Achtsamkeits-Coach in einer Wellness-App. \
Du hilfst Menschen, mit Klarheit und Zuversicht in den Tag zu starten.

Erstelle einen Morgenimpuls im folgenden Format:
- 2 bis 3 inspirierende Impulse für den Tag (Beginne jede Zeile mit \"• \")
- Eine Zeile \"Tagesfokus: ...\" mit einem einzigen, konkreten Fokus
- Eine Zeile \"Dankbarkeits-Erinnerung: ...\" als sanfte Einladung zur Dankbarkeit

Regeln:
- Sprich die Person direkt mit \"du\" an.
- Knüpfe, wenn vorhanden, an die Zusammenfassung des letzten Abends an.
- Platzhalter wie [NAME]_1 unverändert übernehmen.
- Höchstens 100 Wörter.";

const MORNING_SYSTEM_EN: &str = "\
You are a motivating mindfulness coach inside a wellness app. \
You help people start their day with clarity and confidence.

Write a morning impulse in this format:
- 2 to 3 inspiring impulses for the day (start each line with \"• \")
- A line \"Daily focus: ...\" naming one concrete focus
- A line \"Gratitude reminder: ...\" gently inviting gratitude

Rules:
- Address the person directly as \"you\".
- If available, build on last evening's summary.
- Keep placeholders such as [NAME]_1 exactly as written.
- At most 100 words.";

pub(crate) fn evening_system(language: Language) -> &'static str {
    match language {
        Language::De => EVENING_SYSTEM_DE,
        Language::En => EVENING_SYSTEM_EN,
    }
}

pub(crate) fn morning_system(language: Language) -> &'static str {
    match language {
        Language::De => MORNING_SYSTEM_DE,
        Language::En => MORNING_SYSTEM_EN,
    }
}

/// User-prompt sentinel used when the aggregation carries no data.
pub(crate) fn no_data_sentinel(language: Language) -> &'static str {
    match language {
        Language::De => "Keine Daten verfügbar.",
        Language::En => "No data available.",
    }
}

pub(crate) fn evening_user(language: Language, data: &str) -> String {
    match language {
        Language::De => format!(
            "Hier sind meine Aktivitäten der letzten 24 Stunden:\n\n{data}\n\n\
             Bitte erstelle meine Abendreflexion."
        ),
        Language::En => format!(
            "Here is my activity from the last 24 hours:\n\n{data}\n\n\
             Please write my evening reflection."
        ),
    }
}

pub(crate) fn evening_user_no_data(language: Language) -> String {
    match language {
        Language::De => format!(
            "{} Bitte erstelle eine sanfte, allgemeine Abendreflexion.",
            no_data_sentinel(language)
        ),
        Language::En => format!(
            "{} Please write a gentle, general evening reflection.",
            no_data_sentinel(language)
        ),
    }
}

pub(crate) fn morning_user(language: Language, data: &str) -> String {
    match language {
        Language::De => format!("{data}\n\nBitte erstelle meinen Morgenimpuls für heute."),
        Language::En => format!("{data}\n\nPlease write my morning impulse for today."),
    }
}

pub(crate) fn morning_user_no_data(language: Language) -> String {
    match language {
        Language::De => format!(
            "{} Bitte erstelle einen allgemeinen, motivierenden Morgenimpuls.",
            no_data_sentinel(language)
        ),
        Language::En => format!(
            "{} Please write a general, motivating morning impulse.",
            no_data_sentinel(language)
        ),
    }
}

const BREATHING_DE: &[&str] = &[
    "4-7-8-Atmung: 4 Sekunden einatmen, 7 Sekunden halten, 8 Sekunden ausatmen.",
    "Box-Atmung: je 4 Sekunden einatmen, halten, ausatmen und halten.",
    "Verlängerte Ausatmung: 4 Sekunden ein, 6 Sekunden aus, für 3 Minuten.",
    "Bauchatmung: eine Hand auf den Bauch legen und 10 tiefe Atemzüge spüren.",
    "Wechselatmung: abwechselnd durch das linke und rechte Nasenloch atmen, 5 Runden.",
    "Kohärente Atmung: 5 Sekunden ein, 5 Sekunden aus, für 5 Minuten.",
];

const BREATHING_EN: &[&str] = &[
    "4-7-8 breathing: inhale for 4 seconds, hold for 7, exhale for 8.",
    "Box breathing: inhale, hold, exhale, and hold for 4 seconds each.",
    "Extended exhale: breathe in for 4 seconds and out for 6, for 3 minutes.",
    "Belly breathing: rest a hand on your belly and feel 10 deep breaths.",
    "Alternate nostril breathing: switch nostrils with each breath, 5 rounds.",
    "Coherent breathing: 5 seconds in, 5 seconds out, for 5 minutes.",
];

pub(crate) fn breathing_recommendations(language: Language) -> &'static [&'static str] {
    match language {
        Language::De => BREATHING_DE,
        Language::En => BREATHING_EN,
    }
}

const IMPULSES_DE: &[&str] = &[
    "Beginne den Tag mit drei bewussten Atemzügen, bevor du aufs Handy schaust.",
    "Wähle eine Aufgabe, die heute wirklich zählt, und gib ihr deine volle Aufmerksamkeit.",
    "Gönn dir eine kurze Pause an der frischen Luft.",
    "Sei heute freundlich zu dir selbst, auch wenn nicht alles gelingt.",
    "Trink ein Glas Wasser und spüre, wie dein Körper wach wird.",
    "Schreib einer Person, die dir wichtig ist, eine kleine Nachricht.",
    "Nimm dir einen Moment, um bewusst zu lächeln.",
    "Achte heute auf einen schönen Augenblick und halte ihn kurz fest.",
];

const IMPULSES_EN: &[&str] = &[
    "Start the day with three mindful breaths before you check your phone.",
    "Pick one task that truly matters today and give it your full attention.",
    "Treat yourself to a short break in the fresh air.",
    "Be kind to yourself today, even if not everything goes to plan.",
    "Drink a glass of water and notice your body waking up.",
    "Send a small message to someone who matters to you.",
    "Take a moment to smile on purpose.",
    "Look out for one beautiful moment today and hold on to it briefly.",
];

pub(crate) fn morning_impulses(language: Language) -> &'static [&'static str] {
    match language {
        Language::De => IMPULSES_DE,
        Language::En => IMPULSES_EN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_have_enough_candidates() {
        for lang in [Language::De, Language::En] {
            assert!(breathing_recommendations(lang).len() >= 5);
            assert!(morning_impulses(lang).len() >= 5);
        }
    }

    #[test]
    fn system_prompts_share_structure_across_languages() {
        assert!(evening_system(Language::De).contains("Atemempfehlung:"));
        assert!(evening_system(Language::En).contains("Breathing recommendation:"));
        assert!(morning_system(Language::De).contains("Tagesfokus:"));
        assert!(morning_system(Language::De).contains("Dankbarkeits-Erinnerung:"));
        assert!(morning_system(Language::En).contains("Daily focus:"));
        assert!(morning_system(Language::En).contains("Gratitude reminder:"));
    }
}
