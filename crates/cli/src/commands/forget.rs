use caddie_core::config::LoadOptions;
use serde_json::json;

use crate::commands::{block_on, load_config, memory_failure, CommandResult, MemoryStore};

/// Clears shots, miss patterns, conversation history and the session.
pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("forget", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on("forget", async {
        let store = MemoryStore::open(&config).await?;
        let report = store.recorder.forget_everything().await;
        store.close().await;
        report.map_err(memory_failure)
    });

    match result {
        Ok(report) => CommandResult::success_with_data(
            "forget",
            format!(
                "cleared {} shot(s) and {} pattern(s)",
                report.shots_removed, report.patterns_removed
            ),
            json!({
                "shots_removed": report.shots_removed,
                "patterns_removed": report.patterns_removed,
            }),
        ),
        Err(result) => result,
    }
}
