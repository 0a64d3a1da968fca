use caddie_core::normalize::InputNormalizer;
use serde_json::json;

use crate::commands::CommandResult;

pub fn run(text: &str) -> CommandResult {
    let normalized = InputNormalizer::default().normalize(text);
    CommandResult::success_with_data(
        "normalize",
        normalized.clone(),
        json!({ "input": text, "normalized": normalized }),
    )
}
