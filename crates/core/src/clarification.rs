//! Offline keyword suggestions used when the classifier is unsure or
//! unreachable.

use serde::{Deserialize, Serialize};

use crate::domain::intent::IntentType;

pub const DEFAULT_MAX_SUGGESTIONS: usize = 3;

/// Keyword table. Earlier rows take precedence when several match.
const KEYWORDS: &[(&str, IntentType)] = &[
    ("what club", IntentType::ShotRecommendation),
    ("which club", IntentType::ShotRecommendation),
    ("should i hit", IntentType::ShotRecommendation),
    ("recommend", IntentType::ShotRecommendation),
    ("club", IntentType::ClubAdjustment),
    ("clubs", IntentType::ClubAdjustment),
    ("yardage", IntentType::ClubAdjustment),
    ("yardages", IntentType::ClubAdjustment),
    ("distance", IntentType::ClubAdjustment),
    ("distances", IntentType::ClubAdjustment),
    ("carry", IntentType::ClubAdjustment),
    ("score", IntentType::ScoreEntry),
    ("scored", IntentType::ScoreEntry),
    ("par", IntentType::ScoreEntry),
    ("birdie", IntentType::ScoreEntry),
    ("bogey", IntentType::ScoreEntry),
    ("new round", IntentType::RoundStart),
    ("tee off", IntentType::RoundStart),
    ("start", IntentType::RoundStart),
    ("end round", IntentType::RoundEnd),
    ("finish", IntentType::RoundEnd),
    ("miss", IntentType::PatternQuery),
    ("misses", IntentType::PatternQuery),
    ("slice", IntentType::PatternQuery),
    ("hook", IntentType::PatternQuery),
    ("tendency", IntentType::PatternQuery),
    ("pattern", IntentType::PatternQuery),
    ("patterns", IntentType::PatternQuery),
    ("drill", IntentType::DrillsRequest),
    ("drills", IntentType::DrillsRequest),
    ("practice", IntentType::DrillsRequest),
    ("weather", IntentType::WeatherCheck),
    ("wind", IntentType::WeatherCheck),
    ("rain", IntentType::WeatherCheck),
    ("stats", IntentType::StatsLookup),
    ("statistics", IntentType::StatsLookup),
    ("average", IntentType::StatsLookup),
    ("handicap", IntentType::StatsLookup),
    ("equipment", IntentType::EquipmentInfo),
    ("bag", IntentType::EquipmentInfo),
    ("shaft", IntentType::EquipmentInfo),
    ("course", IntentType::CourseInfo),
    ("layout", IntentType::CourseInfo),
    ("hazard", IntentType::CourseInfo),
    ("pain", IntentType::RecoveryCheck),
    ("hurt", IntentType::RecoveryCheck),
    ("hurts", IntentType::RecoveryCheck),
    ("sore", IntentType::RecoveryCheck),
    ("tired", IntentType::RecoveryCheck),
    ("recovery", IntentType::RecoveryCheck),
    ("settings", IntentType::SettingsChange),
    ("units", IntentType::SettingsChange),
    ("feedback", IntentType::Feedback),
    ("bug", IntentType::Feedback),
    ("help", IntentType::Help),
    ("how do i", IntentType::Help),
];

/// Padding used when keyword matches run short.
const COMMON_INTENTS: &[IntentType] = &[
    IntentType::ShotRecommendation,
    IntentType::ClubAdjustment,
    IntentType::ScoreEntry,
    IntentType::PatternQuery,
    IntentType::Help,
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSuggestion {
    pub intent_type: IntentType,
    pub label: String,
    pub offline_available: bool,
    /// `false` for padding entries from the common-intents list.
    pub keyword_match: bool,
}

impl IntentSuggestion {
    fn new(intent_type: IntentType, keyword_match: bool) -> Self {
        Self {
            intent_type,
            label: intent_type.label().to_string(),
            offline_available: intent_type.offline_available(),
            keyword_match,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationResponse {
    pub message: String,
    pub suggestions: Vec<IntentSuggestion>,
    /// Set when the classifier failed and this response came from the
    /// degraded path.
    pub degraded: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClarificationFallback;

impl ClarificationFallback {
    pub fn new() -> Self {
        Self
    }

    /// Keyword matches first (table order, one entry per intent type), then
    /// common intents until `max` is reached. Offline filtering applies to
    /// both sources.
    pub fn suggestions(&self, input: &str, is_offline: bool, max: usize) -> Vec<IntentSuggestion> {
        let haystack = format!(" {} ", simplify(input));
        let allowed = |intent: &IntentType| !is_offline || intent.offline_available();

        let mut suggestions: Vec<IntentSuggestion> = Vec::new();
        let matched = KEYWORDS
            .iter()
            .filter(|(keyword, _)| haystack.contains(&format!(" {keyword} ")))
            .map(|(_, intent)| *intent);

        for intent in matched {
            if suggestions.len() >= max {
                return suggestions;
            }
            if allowed(&intent) && !contains(&suggestions, intent) {
                suggestions.push(IntentSuggestion::new(intent, true));
            }
        }

        for intent in COMMON_INTENTS.iter().copied() {
            if suggestions.len() >= max {
                break;
            }
            if allowed(&intent) && !contains(&suggestions, intent) {
                suggestions.push(IntentSuggestion::new(intent, false));
            }
        }

        suggestions
    }

    pub fn respond(
        &self,
        input: &str,
        is_offline: bool,
        max: usize,
        degraded: bool,
    ) -> ClarificationResponse {
        let suggestions = self.suggestions(input, is_offline, max);
        let message = match (degraded, is_offline) {
            (_, true) => "You're offline right now. Here's what I can still help with:",
            (true, false) => "I couldn't reach the caddie service. Here's what I can help with:",
            (false, false) => "I'm not sure what you meant. Did you want to:",
        };
        ClarificationResponse { message: message.to_string(), suggestions, degraded }
    }
}

fn contains(suggestions: &[IntentSuggestion], intent: IntentType) -> bool {
    suggestions.iter().any(|suggestion| suggestion.intent_type == intent)
}

fn simplify(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '-' { ch } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
