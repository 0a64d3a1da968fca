//! Intent registry and parsed intents.
//!
//! The registry is closed: every intent the classifier may emit is a variant of
//! [`IntentType`], and each variant carries its routing metadata (default
//! destination, prerequisites, offline availability).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::routing::{AppModule, Prerequisite, RoutingTarget};

/// Caddy screen that answers non-navigational intents in place.
pub const CONVERSATION_SCREEN: &str = "conversation";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(pub String);

impl IntentId {
    pub fn generate() -> Self {
        Self(format!("intent-{}", uuid::Uuid::new_v4()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    ClubAdjustment,
    ShotRecommendation,
    ScoreEntry,
    RoundStart,
    RoundEnd,
    PatternQuery,
    DrillsRequest,
    WeatherCheck,
    StatsLookup,
    EquipmentInfo,
    CourseInfo,
    RecoveryCheck,
    SettingsChange,
    Feedback,
    Help,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownIntentType(pub String);

impl fmt::Display for UnknownIntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown intent type `{}`", self.0)
    }
}

impl std::error::Error for UnknownIntentType {}

impl IntentType {
    pub const ALL: [IntentType; 15] = [
        IntentType::ClubAdjustment,
        IntentType::ShotRecommendation,
        IntentType::ScoreEntry,
        IntentType::RoundStart,
        IntentType::RoundEnd,
        IntentType::PatternQuery,
        IntentType::DrillsRequest,
        IntentType::WeatherCheck,
        IntentType::StatsLookup,
        IntentType::EquipmentInfo,
        IntentType::CourseInfo,
        IntentType::RecoveryCheck,
        IntentType::SettingsChange,
        IntentType::Feedback,
        IntentType::Help,
    ];

    /// Registry key used on the wire by the classifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClubAdjustment => "CLUB_ADJUSTMENT",
            Self::ShotRecommendation => "SHOT_RECOMMENDATION",
            Self::ScoreEntry => "SCORE_ENTRY",
            Self::RoundStart => "ROUND_START",
            Self::RoundEnd => "ROUND_END",
            Self::PatternQuery => "PATTERN_QUERY",
            Self::DrillsRequest => "DRILLS_REQUEST",
            Self::WeatherCheck => "WEATHER_CHECK",
            Self::StatsLookup => "STATS_LOOKUP",
            Self::EquipmentInfo => "EQUIPMENT_INFO",
            Self::CourseInfo => "COURSE_INFO",
            Self::RecoveryCheck => "RECOVERY_CHECK",
            Self::SettingsChange => "SETTINGS_CHANGE",
            Self::Feedback => "FEEDBACK",
            Self::Help => "HELP",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ClubAdjustment => "Adjust club distances",
            Self::ShotRecommendation => "Get a shot recommendation",
            Self::ScoreEntry => "Enter a score",
            Self::RoundStart => "Start a round",
            Self::RoundEnd => "Finish the round",
            Self::PatternQuery => "Review miss patterns",
            Self::DrillsRequest => "Find practice drills",
            Self::WeatherCheck => "Check the weather",
            Self::StatsLookup => "Look up stats",
            Self::EquipmentInfo => "Equipment details",
            Self::CourseInfo => "Course information",
            Self::RecoveryCheck => "Recovery and readiness",
            Self::SettingsChange => "Change settings",
            Self::Feedback => "Send feedback",
            Self::Help => "Get help",
        }
    }

    /// Short phrase used in confirmation prompts ("Did you want to ...?").
    pub fn action_phrase(&self) -> &'static str {
        match self {
            Self::ClubAdjustment => "adjust your club distances",
            Self::ShotRecommendation => "get a recommendation for this shot",
            Self::ScoreEntry => "enter a score",
            Self::RoundStart => "start a new round",
            Self::RoundEnd => "finish your round",
            Self::PatternQuery => "review your miss patterns",
            Self::DrillsRequest => "see practice drills",
            Self::WeatherCheck => "check the weather",
            Self::StatsLookup => "look up your stats",
            Self::EquipmentInfo => "see your equipment",
            Self::CourseInfo => "see course information",
            Self::RecoveryCheck => "check your recovery",
            Self::SettingsChange => "change your settings",
            Self::Feedback => "send feedback",
            Self::Help => "get help",
        }
    }

    /// Default destination. `None` for non-navigational intents.
    pub fn default_target(&self) -> Option<RoutingTarget> {
        let (module, screen) = match self {
            Self::ClubAdjustment => (AppModule::Caddy, "club_adjustment"),
            Self::ShotRecommendation => (AppModule::Caddy, "shot_recommendation"),
            Self::ScoreEntry => (AppModule::Round, "score_entry"),
            Self::RoundStart => (AppModule::Round, "round_setup"),
            Self::RoundEnd => (AppModule::Round, "round_summary"),
            Self::DrillsRequest => (AppModule::Practice, "drill_library"),
            Self::WeatherCheck => (AppModule::Caddy, "conditions"),
            Self::StatsLookup => (AppModule::Stats, "overview"),
            Self::EquipmentInfo => (AppModule::Settings, "bag"),
            Self::CourseInfo => (AppModule::Course, "course_detail"),
            Self::RecoveryCheck => (AppModule::Health, "readiness"),
            Self::SettingsChange => (AppModule::Settings, "preferences"),
            Self::PatternQuery | Self::Feedback | Self::Help => return None,
        };
        Some(RoutingTarget::new(module, screen))
    }

    /// Where a routed intent lands: its default target, or the caddy
    /// conversation for intents answered without navigating.
    pub fn destination(&self) -> RoutingTarget {
        self.default_target()
            .unwrap_or_else(|| RoutingTarget::new(AppModule::Caddy, CONVERSATION_SCREEN))
    }

    pub fn is_navigational(&self) -> bool {
        !matches!(self, Self::PatternQuery | Self::Feedback | Self::Help)
    }

    /// Data that must be available before this intent's destination opens.
    pub fn prerequisites(&self) -> &'static [Prerequisite] {
        match self {
            Self::ClubAdjustment => &[Prerequisite::ClubDistances],
            Self::ShotRecommendation => &[Prerequisite::ActiveRound, Prerequisite::ClubDistances],
            Self::ScoreEntry | Self::RoundEnd => &[Prerequisite::ActiveRound],
            Self::WeatherCheck => &[Prerequisite::WeatherData],
            Self::StatsLookup => &[Prerequisite::RoundHistory],
            Self::CourseInfo => &[Prerequisite::CourseData],
            Self::RecoveryCheck => &[Prerequisite::HealthData],
            Self::RoundStart
            | Self::PatternQuery
            | Self::DrillsRequest
            | Self::EquipmentInfo
            | Self::SettingsChange
            | Self::Feedback
            | Self::Help => &[],
        }
    }

    /// Whether the destination works without network access.
    pub fn offline_available(&self) -> bool {
        !matches!(
            self,
            Self::ShotRecommendation
                | Self::WeatherCheck
                | Self::CourseInfo
                | Self::RecoveryCheck
                | Self::Feedback
        )
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentType {
    type Err = UnknownIntentType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|intent| intent.as_str() == key)
            .ok_or_else(|| UnknownIntentType(value.to_string()))
    }
}

/// Slots the classifier may fill. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub club: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub yardage: Option<u32>,
    #[serde(default)]
    pub lie: Option<String>,
    #[serde(default, alias = "wind")]
    pub wind_description: Option<String>,
    #[serde(default)]
    pub fatigue: Option<String>,
    #[serde(default)]
    pub pain: Option<String>,
    #[serde(default)]
    pub score_context: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub hole_number: Option<u8>,
}

/// Numeric slot as the model may phrase it: `150`, `150.0` or `"150 yards"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Whole(u64),
    Fractional(f64),
    Text(String),
}

/// Reads a non-negative count from any [`LooseNumber`] form. Values that are
/// negative, unparseable or out of range drop the slot instead of failing
/// the whole payload.
fn lenient_count<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let whole = match Option::<LooseNumber>::deserialize(deserializer)? {
        None => None,
        Some(LooseNumber::Whole(value)) => Some(value),
        Some(LooseNumber::Fractional(value)) => rounded(value),
        Some(LooseNumber::Text(text)) => {
            let trimmed = text.trim();
            let numeric_len = trimmed
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(trimmed.len());
            trimmed[..numeric_len].parse::<f64>().ok().and_then(rounded)
        }
    };
    Ok(whole.and_then(|value| T::try_from(value).ok()))
}

fn rounded(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0 && value <= u64::MAX as f64).then(|| value.round() as u64)
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Entities that become routing parameters on the destination screen.
    pub fn routing_parameters(&self) -> BTreeMap<String, String> {
        let mut parameters = BTreeMap::new();
        if let Some(club) = &self.club {
            parameters.insert("club".to_string(), club.clone());
        }
        if let Some(yardage) = self.yardage {
            parameters.insert("yardage".to_string(), yardage.to_string());
        }
        if let Some(hole_number) = self.hole_number {
            parameters.insert("hole".to_string(), hole_number.to_string());
        }
        if let Some(lie) = &self.lie {
            parameters.insert("lie".to_string(), lie.clone());
        }
        parameters
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    id: IntentId,
    intent_type: IntentType,
    confidence: f64,
    entities: ExtractedEntities,
    user_goal: Option<String>,
    routing_target: Option<RoutingTarget>,
}

impl ParsedIntent {
    /// Builds an intent, clamping confidence into `[0, 1]` and resolving the
    /// routing target from the registry.
    pub fn new(
        intent_type: IntentType,
        confidence: f64,
        entities: ExtractedEntities,
        user_goal: Option<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        let routing_target = intent_type
            .default_target()
            .map(|target| target.with_parameters(entities.routing_parameters()));

        Self {
            id: IntentId::generate(),
            intent_type,
            confidence,
            entities,
            user_goal: user_goal.filter(|goal| !goal.trim().is_empty()),
            routing_target,
        }
    }

    pub fn id(&self) -> &IntentId {
        &self.id
    }

    pub fn intent_type(&self) -> IntentType {
        self.intent_type
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn entities(&self) -> &ExtractedEntities {
        &self.entities
    }

    pub fn user_goal(&self) -> Option<&str> {
        self.user_goal.as_deref()
    }

    pub fn routing_target(&self) -> Option<&RoutingTarget> {
        self.routing_target.as_ref()
    }

    /// Resolved routing target with entity parameters, falling back to the
    /// registry's conversational destination.
    pub fn destination(&self) -> RoutingTarget {
        self.routing_target.clone().unwrap_or_else(|| self.intent_type.destination())
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtractedEntities, IntentType, ParsedIntent, CONVERSATION_SCREEN};
    use crate::domain::routing::AppModule;

    #[test]
    fn confidence_is_clamped_on_construction() {
        let high = ParsedIntent::new(IntentType::Help, 1.7, ExtractedEntities::default(), None);
        let low = ParsedIntent::new(IntentType::Help, -0.2, ExtractedEntities::default(), None);
        let nan = ParsedIntent::new(IntentType::Help, f64::NAN, ExtractedEntities::default(), None);

        assert_eq!(high.confidence(), 1.0);
        assert_eq!(low.confidence(), 0.0);
        assert_eq!(nan.confidence(), 0.0);
    }

    #[test]
    fn registry_keys_parse_case_insensitively() {
        assert_eq!("club_adjustment".parse::<IntentType>(), Ok(IntentType::ClubAdjustment));
        assert_eq!("PATTERN-QUERY".parse::<IntentType>(), Ok(IntentType::PatternQuery));
        assert!("TEE_TIME_BOOKING".parse::<IntentType>().is_err());
    }

    #[test]
    fn every_registry_key_round_trips() {
        for intent in IntentType::ALL {
            assert_eq!(intent.as_str().parse::<IntentType>(), Ok(intent));
        }
    }

    #[test]
    fn navigational_intents_have_targets_and_others_do_not() {
        for intent in IntentType::ALL {
            assert_eq!(intent.is_navigational(), intent.default_target().is_some(), "{intent}");
        }
    }

    #[test]
    fn answered_in_place_intents_land_on_the_conversation_screen() {
        for intent in [IntentType::PatternQuery, IntentType::Feedback, IntentType::Help] {
            let destination = intent.destination();
            assert_eq!(destination.module, AppModule::Caddy);
            assert_eq!(destination.screen, CONVERSATION_SCREEN);
        }
        let parsed = ParsedIntent::new(IntentType::Help, 0.9, ExtractedEntities::default(), None);
        assert_eq!(parsed.routing_target(), None);
        assert_eq!(parsed.destination(), IntentType::Help.destination());

        let weather = IntentType::WeatherCheck.destination();
        assert_eq!(Some(weather), IntentType::WeatherCheck.default_target());
    }

    #[test]
    fn numeric_slots_accept_floats_and_numeric_strings() {
        let parse = |raw: &str| serde_json::from_str::<ExtractedEntities>(raw).expect(raw);

        assert_eq!(parse(r#"{"yardage": 150}"#).yardage, Some(150));
        assert_eq!(parse(r#"{"yardage": 150.0}"#).yardage, Some(150));
        assert_eq!(parse(r#"{"yardage": "150"}"#).yardage, Some(150));
        assert_eq!(parse(r#"{"yardage": " 152 yards"}"#).yardage, Some(152));
        assert_eq!(parse(r#"{"yardage": null}"#).yardage, None);
        assert_eq!(parse(r#"{"yardage": "far"}"#).yardage, None);
        assert_eq!(parse(r#"{"yardage": -20}"#).yardage, None);
        assert_eq!(parse(r#"{"hole_number": "7"}"#).hole_number, Some(7));
        assert_eq!(parse(r#"{"hole_number": 300}"#).hole_number, None);
        assert_eq!(parse(r#"{"club": "7-iron"}"#).yardage, None);
    }

    #[test]
    fn routing_target_carries_entity_parameters() {
        let entities = ExtractedEntities {
            club: Some("7-iron".to_string()),
            yardage: Some(150),
            ..ExtractedEntities::default()
        };
        let intent = ParsedIntent::new(IntentType::ClubAdjustment, 0.9, entities, None);
        let target = intent.routing_target().expect("club adjustment is navigational");

        assert_eq!(target.screen, "club_adjustment");
        assert_eq!(target.parameters.get("club").map(String::as_str), Some("7-iron"));
        assert_eq!(target.parameters.get("yardage").map(String::as_str), Some("150"));
    }

    #[test]
    fn blank_user_goal_is_dropped() {
        let intent = ParsedIntent::new(
            IntentType::Help,
            0.8,
            ExtractedEntities::default(),
            Some("   ".to_string()),
        );
        assert_eq!(intent.user_goal(), None);
    }
}
