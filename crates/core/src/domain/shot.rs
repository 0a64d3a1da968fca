use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Highest hole number a shot may carry (two loops of eighteen).
pub const MAX_HOLE_NUMBER: u8 = 36;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShotId(pub String);

impl ShotId {
    pub fn generate() -> Self {
        Self(format!("shot-{}", uuid::Uuid::new_v4()))
    }
}

/// Canonical club name, e.g. `7-iron` or `driver`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClubId(pub String);

impl ClubId {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("invalid {} `{other}`", stringify!($name))),
                }
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissDirection {
    Left,
    Right,
    Short,
    Long,
    Fat,
    Thin,
}

string_enum!(MissDirection {
    Left => "left",
    Right => "right",
    Short => "short",
    Long => "long",
    Fat => "fat",
    Thin => "thin",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lie {
    Tee,
    Fairway,
    Rough,
    Bunker,
    Green,
    Recovery,
}

string_enum!(Lie {
    Tee => "tee",
    Fairway => "fairway",
    Rough => "rough",
    Bunker => "bunker",
    Green => "green",
    Recovery => "recovery",
});

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureContext {
    #[default]
    Normal,
    /// Tournament or match play.
    Competitive,
    /// A score-defining shot (birdie putt, closing holes).
    Scoring,
}

string_enum!(PressureContext {
    Normal => "normal",
    Competitive => "competitive",
    Scoring => "scoring",
});

impl PressureContext {
    pub fn is_pressure(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub id: ShotId,
    pub timestamp: DateTime<Utc>,
    pub club: ClubId,
    pub miss_direction: Option<MissDirection>,
    pub lie: Lie,
    pub pressure_context: PressureContext,
    pub hole_number: Option<u8>,
    pub notes: Option<String>,
}

impl Shot {
    pub fn new(club: ClubId, lie: Lie, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: ShotId::generate(),
            timestamp,
            club,
            miss_direction: None,
            lie,
            pressure_context: PressureContext::Normal,
            hole_number: None,
            notes: None,
        }
    }

    pub fn with_miss(mut self, direction: MissDirection) -> Self {
        self.miss_direction = Some(direction);
        self
    }

    pub fn with_pressure(mut self, pressure_context: PressureContext) -> Self {
        self.pressure_context = pressure_context;
        self
    }

    pub fn on_hole(mut self, hole_number: u8) -> Self {
        self.hole_number = Some(hole_number);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_miss(&self) -> bool {
        self.miss_direction.is_some()
    }

    /// Rejects shots dated after `now` and hole numbers outside
    /// `1..=MAX_HOLE_NUMBER`. Run before a shot is persisted.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.timestamp > now {
            return Err(ValidationError::FutureTimestamp { timestamp: self.timestamp, now });
        }
        match self.hole_number {
            Some(hole) if !(1..=MAX_HOLE_NUMBER).contains(&hole) => {
                Err(ValidationError::HoleOutOfRange { value: hole, max: MAX_HOLE_NUMBER })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{ClubId, Lie, MissDirection, PressureContext, Shot};
    use crate::errors::ValidationError;

    #[test]
    fn validate_rejects_future_shots_and_impossible_holes() {
        let now = Utc::now();
        let club = ClubId::new("driver");

        assert!(Shot::new(club.clone(), Lie::Tee, now).on_hole(18).validate(now).is_ok());
        assert!(Shot::new(club.clone(), Lie::Tee, now).on_hole(36).validate(now).is_ok());
        assert!(matches!(
            Shot::new(club.clone(), Lie::Tee, now + Duration::hours(2)).validate(now),
            Err(ValidationError::FutureTimestamp { .. })
        ));
        assert!(matches!(
            Shot::new(club.clone(), Lie::Tee, now).on_hole(0).validate(now),
            Err(ValidationError::HoleOutOfRange { value: 0, .. })
        ));
        assert!(matches!(
            Shot::new(club, Lie::Tee, now).on_hole(37).validate(now),
            Err(ValidationError::HoleOutOfRange { value: 37, .. })
        ));
    }

    #[test]
    fn shot_survives_json_persistence_representation() {
        let timestamp = Utc.with_ymd_and_hms(2026, 5, 2, 14, 30, 0).single().expect("timestamp");
        let shot = Shot::new(ClubId::new("7-iron"), Lie::Fairway, timestamp)
            .with_miss(MissDirection::Right)
            .with_pressure(PressureContext::Competitive)
            .on_hole(14)
            .with_notes("held the face open");

        let encoded = serde_json::to_string(&shot).expect("encode shot");
        let decoded: Shot = serde_json::from_str(&encoded).expect("decode shot");

        assert_eq!(decoded.id, shot.id);
        assert_eq!(decoded.club, shot.club);
        assert_eq!(decoded.miss_direction, Some(MissDirection::Right));
        assert_eq!(decoded.lie, Lie::Fairway);
        assert_eq!(decoded.hole_number, Some(14));
        assert_eq!(decoded.notes.as_deref(), Some("held the face open"));
        assert_eq!(decoded, shot);
    }

    #[test]
    fn club_ids_are_canonicalised() {
        assert_eq!(ClubId::new("  Driver "), ClubId::new("driver"));
    }

    #[test]
    fn enum_text_forms_parse_back() {
        for direction in MissDirection::ALL {
            assert_eq!(direction.as_str().parse::<MissDirection>(), Ok(*direction));
        }
        assert_eq!("Bunker".parse::<Lie>(), Ok(Lie::Bunker));
        assert!("sideways".parse::<MissDirection>().is_err());
        assert!(PressureContext::Scoring.is_pressure());
        assert!(!PressureContext::Normal.is_pressure());
    }
}
