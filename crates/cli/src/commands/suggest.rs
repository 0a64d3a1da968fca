use caddie_core::clarification::ClarificationFallback;
use caddie_core::config::LoadOptions;
use caddie_core::normalize::InputNormalizer;

use crate::commands::{load_config, CommandResult};

/// Keyword suggestions for `text`, as the classifier offers them when it
/// cannot read an intent.
pub fn run(options: LoadOptions, text: &str, offline: bool) -> CommandResult {
    let config = match load_config("suggest", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let normalized = InputNormalizer::default().normalize(text);
    let response = ClarificationFallback::new().respond(
        &normalized,
        offline,
        config.classifier.max_suggestions,
        false,
    );

    match serde_json::to_value(&response) {
        Ok(data) => CommandResult::success_with_data("suggest", response.message.clone(), data),
        Err(error) => CommandResult::failure("suggest", "serialization", error.to_string(), 1),
    }
}
