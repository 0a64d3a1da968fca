use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clarification::ClarificationResponse;
use crate::domain::intent::ParsedIntent;
use crate::errors::ValidationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppModule {
    Caddy,
    Round,
    Practice,
    Stats,
    Course,
    Health,
    Settings,
}

impl AppModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caddy => "caddy",
            Self::Round => "round",
            Self::Practice => "practice",
            Self::Stats => "stats",
            Self::Course => "course",
            Self::Health => "health",
            Self::Settings => "settings",
        }
    }
}

/// Destination descriptor resolved from the intent registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTarget {
    pub module: AppModule,
    pub screen: String,
    pub parameters: BTreeMap<String, String>,
}

impl RoutingTarget {
    pub fn new(module: AppModule, screen: impl Into<String>) -> Self {
        Self { module, screen: screen.into(), parameters: BTreeMap::new() }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.module.as_str(), self.screen)
    }
}

/// Named data precondition checked before navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prerequisite {
    ActiveRound,
    ClubDistances,
    RoundHistory,
    WeatherData,
    CourseData,
    HealthData,
}

impl Prerequisite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveRound => "active_round",
            Self::ClubDistances => "club_distances",
            Self::RoundHistory => "round_history",
            Self::WeatherData => "weather_data",
            Self::CourseData => "course_data",
            Self::HealthData => "health_data",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ActiveRound => "an active round",
            Self::ClubDistances => "your club distances",
            Self::RoundHistory => "at least one completed round",
            Self::WeatherData => "current weather conditions",
            Self::CourseData => "course data for this location",
            Self::HealthData => "synced health data",
        }
    }
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence-gated classifier decision.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassificationResult {
    Route { intent: ParsedIntent, target: RoutingTarget },
    Confirm { intent: ParsedIntent, message: String },
    Clarify { response: ClarificationResponse },
}

impl ClassificationResult {
    pub fn intent(&self) -> Option<&ParsedIntent> {
        match self {
            Self::Route { intent, .. } | Self::Confirm { intent, .. } => Some(intent),
            Self::Clarify { .. } => None,
        }
    }
}

/// Final outcome handed to the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub enum RoutingResult {
    Navigate { target: RoutingTarget, intent: ParsedIntent },
    NoNavigation { intent: ParsedIntent, response: String },
    PrerequisiteMissing { intent: ParsedIntent, missing: Vec<Prerequisite>, message: String },
    ConfirmationRequired { intent: ParsedIntent, message: String },
}

impl RoutingResult {
    /// Rejects an empty `missing` list; the variant always names at least one
    /// unmet prerequisite.
    pub fn prerequisite_missing(
        intent: ParsedIntent,
        missing: Vec<Prerequisite>,
        message: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if missing.is_empty() {
            return Err(ValidationError::EmptyList { field: "missing prerequisites" });
        }
        Ok(Self::PrerequisiteMissing { intent, missing, message: message.into() })
    }

    pub fn intent(&self) -> &ParsedIntent {
        match self {
            Self::Navigate { intent, .. }
            | Self::NoNavigation { intent, .. }
            | Self::PrerequisiteMissing { intent, .. }
            | Self::ConfirmationRequired { intent, .. } => intent,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::NoNavigation { .. } => "no_navigation",
            Self::PrerequisiteMissing { .. } => "prerequisite_missing",
            Self::ConfirmationRequired { .. } => "confirmation_required",
        }
    }

    /// Text shown to the player alongside (or instead of) navigation.
    pub fn reply_text(&self) -> String {
        match self {
            Self::Navigate { target, intent } => {
                format!("Opening {} ({}).", intent.intent_type().label(), target.path())
            }
            Self::NoNavigation { response, .. } => response.clone(),
            Self::PrerequisiteMissing { message, .. }
            | Self::ConfirmationRequired { message, .. } => message.clone(),
        }
    }
}
