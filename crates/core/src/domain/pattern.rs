use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shot::{ClubId, MissDirection, PressureContext};
use crate::errors::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub String);

impl PatternId {
    pub fn generate() -> Self {
        Self(format!("pattern-{}", uuid::Uuid::new_v4()))
    }
}

/// Upsert key for miss patterns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternKey {
    pub club: ClubId,
    pub direction: MissDirection,
}

/// Persisted aggregate. `confidence` is the undecayed base value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissPattern {
    pub id: PatternId,
    pub direction: MissDirection,
    pub club: Option<ClubId>,
    pub frequency: u32,
    pub confidence: f64,
    pub pressure_context: Option<PressureContext>,
    pub last_occurrence: DateTime<Utc>,
}

impl MissPattern {
    pub fn new(
        club: Option<ClubId>,
        direction: MissDirection,
        confidence: f64,
        last_occurrence: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        validate_confidence(confidence)?;
        Ok(Self {
            id: PatternId::generate(),
            direction,
            club,
            frequency: 1,
            confidence,
            pressure_context: None,
            last_occurrence,
        })
    }

    pub fn key(&self) -> Option<PatternKey> {
        self.club.clone().map(|club| PatternKey { club, direction: self.direction })
    }

    pub fn matches(&self, key: &PatternKey) -> bool {
        self.direction == key.direction && self.club.as_ref() == Some(&key.club)
    }
}

/// Read-side view of a pattern with decay applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecayedPattern {
    pub pattern: MissPattern,
    pub decayed_confidence: f64,
}

impl DecayedPattern {
    pub fn direction(&self) -> MissDirection {
        self.pattern.direction
    }

    pub fn club(&self) -> Option<&ClubId> {
        self.pattern.club.as_ref()
    }
}

pub fn validate_confidence(value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::ConfidenceOutOfRange { value })
    }
}
