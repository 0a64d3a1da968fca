use caddie_core::config::LoadOptions;
use caddie_core::domain::shot::{ClubId, PressureContext};
use serde_json::json;

use crate::commands::{block_on, load_config, memory_failure, CommandResult, MemoryStore};

/// Decayed miss patterns, strongest first.
pub fn run(options: LoadOptions, club: Option<&str>) -> CommandResult {
    let config = match load_config("patterns", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let club = club.map(ClubId::new);

    let result = block_on("patterns", async {
        let store = MemoryStore::open(&config).await?;
        let patterns = match &club {
            Some(club) => store.memory.patterns_for_club(club).await,
            None => store.memory.patterns().await,
        };
        store.close().await;
        patterns.map_err(memory_failure)
    });

    let patterns = match result {
        Ok(patterns) => patterns,
        Err(result) => return result,
    };

    let message = match patterns.first() {
        Some(top) => format!(
            "{} pattern(s); strongest is {} at {:.2}",
            patterns.len(),
            top.direction(),
            top.decayed_confidence
        ),
        None => "no miss patterns recorded".to_string(),
    };
    let rows = patterns
        .iter()
        .map(|pattern| {
            json!({
                "club": pattern.club().map(ClubId::as_str),
                "direction": pattern.direction().as_str(),
                "frequency": pattern.pattern.frequency,
                "confidence": pattern.pattern.confidence,
                "decayed_confidence": pattern.decayed_confidence,
                "pressure_context": pattern.pattern.pressure_context.as_ref().map(PressureContext::as_str),
                "last_occurrence": pattern.pattern.last_occurrence.to_rfc3339(),
            })
        })
        .collect::<Vec<_>>();

    CommandResult::success_with_data("patterns", message, json!({ "patterns": rows }))
}
