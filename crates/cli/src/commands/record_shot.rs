use caddie_core::config::LoadOptions;
use caddie_core::domain::shot::{ClubId, Lie, MissDirection, PressureContext, Shot};
use chrono::Utc;
use serde_json::json;

use crate::commands::{block_on, load_config, memory_failure, CommandResult, MemoryStore};

#[derive(Clone, Debug)]
pub struct ShotArgs {
    pub club: String,
    pub lie: Lie,
    pub miss: Option<MissDirection>,
    pub pressure: PressureContext,
    pub hole: Option<u8>,
    pub notes: Option<String>,
}

impl ShotArgs {
    fn into_shot(self) -> Shot {
        let mut shot = Shot::new(ClubId::new(&self.club), self.lie, Utc::now())
            .with_pressure(self.pressure);
        if let Some(direction) = self.miss {
            shot = shot.with_miss(direction);
        }
        if let Some(hole) = self.hole {
            shot = shot.on_hole(hole);
        }
        if let Some(notes) = self.notes {
            shot = shot.with_notes(notes);
        }
        shot
    }
}

pub fn run(options: LoadOptions, args: ShotArgs) -> CommandResult {
    if args.club.trim().is_empty() {
        return CommandResult::failure("record-shot", "invalid_argument", "club must not be empty", 7);
    }
    let config = match load_config("record-shot", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let shot = args.into_shot();

    let result = block_on("record-shot", async {
        let store = MemoryStore::open(&config).await?;
        let recorded = async {
            store.recorder.record_shot(shot.clone()).await?;
            store.memory.patterns_for_club(&shot.club).await
        }
        .await;
        store.close().await;
        recorded.map_err(memory_failure)
    });

    let patterns = match result {
        Ok(patterns) => patterns,
        Err(result) => return result,
    };

    let message = match shot.miss_direction {
        Some(direction) => format!("recorded {} miss {direction}", shot.club),
        None => format!("recorded {} shot", shot.club),
    };
    let dominant = patterns.first().map(|top| {
        json!({ "direction": top.direction().as_str(), "decayed_confidence": top.decayed_confidence })
    });
    CommandResult::success_with_data(
        "record-shot",
        message,
        json!({ "shot_id": shot.id.0, "club": shot.club.as_str(), "dominant_miss": dominant }),
    )
}
