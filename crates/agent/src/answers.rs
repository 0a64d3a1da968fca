use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use caddie_core::domain::intent::{IntentType, ParsedIntent};
use caddie_core::domain::pattern::DecayedPattern;
use caddie_core::domain::shot::ClubId;

use crate::memory::MissPatternMemory;
use crate::router::AnswerSource;

/// Patterns mentioned in a pattern-query answer.
const PATTERNS_IN_ANSWER: usize = 3;

/// Answers pattern queries from miss-pattern memory and help or feedback
/// with fixed text.
pub struct MemoryAnswerSource {
    memory: Arc<MissPatternMemory>,
}

impl MemoryAnswerSource {
    pub fn new(memory: Arc<MissPatternMemory>) -> Self {
        Self { memory }
    }

    async fn pattern_answer(&self, club: Option<ClubId>) -> String {
        let patterns = match &club {
            Some(club) => self.memory.patterns_for_club(club).await,
            None => self.memory.patterns().await,
        };

        match patterns {
            Ok(patterns) => describe_patterns(club.as_ref(), &patterns),
            Err(error) => {
                warn!(
                    event_name = "agent.answers.pattern_read_failed",
                    error = %error,
                    "could not read miss patterns"
                );
                "I couldn't read your shot history right now.".to_string()
            }
        }
    }
}

#[async_trait]
impl AnswerSource for MemoryAnswerSource {
    async fn answer(&self, intent: &ParsedIntent) -> String {
        match intent.intent_type() {
            IntentType::PatternQuery => {
                let club = intent.entities().club.as_deref().map(ClubId::new);
                self.pattern_answer(club).await
            }
            IntentType::Feedback => "Thanks, your feedback has been noted.".to_string(),
            IntentType::Help => help_text(),
            other => other.label().to_string(),
        }
    }
}

fn describe_patterns(club: Option<&ClubId>, patterns: &[DecayedPattern]) -> String {
    let relevant = patterns
        .iter()
        .filter(|pattern| pattern.decayed_confidence > 0.0)
        .take(PATTERNS_IN_ANSWER)
        .collect::<Vec<_>>();

    let Some(first) = relevant.first() else {
        return match club {
            Some(club) => format!("No recent misses recorded with your {club}."),
            None => "No recent miss patterns yet. Log a few shots and ask again.".to_string(),
        };
    };

    let subject = match club {
        Some(club) => format!("With your {club}"),
        None => "Lately".to_string(),
    };
    let mut answer = format!(
        "{subject} you mostly miss {} ({:.0}% weight).",
        first.direction(),
        first.decayed_confidence * 100.0
    );
    for pattern in relevant.iter().skip(1) {
        let owner = pattern.club().map(|club| format!(" with {club}")).unwrap_or_default();
        answer.push_str(&format!(
            " Also {}{owner} ({:.0}%).",
            pattern.direction(),
            pattern.decayed_confidence * 100.0
        ));
    }
    answer
}

fn help_text() -> String {
    let things = IntentType::ALL
        .iter()
        .filter(|intent| intent.is_navigational())
        .map(|intent| intent.label().to_lowercase())
        .collect::<Vec<_>>();
    format!("I can help you {}. Ask about your misses any time.", things.join(", "))
}
