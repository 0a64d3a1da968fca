use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use caddie_core::clarification::ClarificationResponse;
use caddie_core::domain::intent::ParsedIntent;
use caddie_core::domain::routing::{ClassificationResult, Prerequisite, RoutingResult, RoutingTarget};

#[derive(Debug, Error)]
pub enum PrerequisiteError {
    #[error("prerequisite source unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PrerequisiteChecker: Send + Sync {
    async fn check(&self, prerequisite: Prerequisite) -> Result<bool, PrerequisiteError>;
}

/// Fixed set of satisfied prerequisites.
#[derive(Clone, Debug, Default)]
pub struct StaticPrerequisites {
    available: BTreeSet<Prerequisite>,
}

impl StaticPrerequisites {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::with([
            Prerequisite::ActiveRound,
            Prerequisite::ClubDistances,
            Prerequisite::RoundHistory,
            Prerequisite::WeatherData,
            Prerequisite::CourseData,
            Prerequisite::HealthData,
        ])
    }

    pub fn with(available: impl IntoIterator<Item = Prerequisite>) -> Self {
        Self { available: available.into_iter().collect() }
    }
}

#[async_trait]
impl PrerequisiteChecker for StaticPrerequisites {
    async fn check(&self, prerequisite: Prerequisite) -> Result<bool, PrerequisiteError> {
        Ok(self.available.contains(&prerequisite))
    }
}

/// Produces the reply for intents that answer in place instead of navigating.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn answer(&self, intent: &ParsedIntent) -> String;
}

/// Routing outcome, or the clarification that short-circuited routing.
#[derive(Clone, Debug, PartialEq)]
pub enum RoutingDecision {
    Routed(RoutingResult),
    Clarification(ClarificationResponse),
}

impl RoutingDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Routed(result) => result.kind(),
            Self::Clarification(_) => "clarification",
        }
    }

    pub fn reply_text(&self) -> String {
        match self {
            Self::Routed(result) => result.reply_text(),
            Self::Clarification(response) => {
                let options = response
                    .suggestions
                    .iter()
                    .map(|suggestion| suggestion.label.as_str())
                    .collect::<Vec<_>>();
                if options.is_empty() {
                    response.message.clone()
                } else {
                    format!("{} {}", response.message, options.join(" / "))
                }
            }
        }
    }
}

pub struct RoutingOrchestrator {
    checker: Arc<dyn PrerequisiteChecker>,
    answers: Arc<dyn AnswerSource>,
}

impl RoutingOrchestrator {
    pub fn new(checker: Arc<dyn PrerequisiteChecker>, answers: Arc<dyn AnswerSource>) -> Self {
        Self { checker, answers }
    }

    pub async fn route(&self, classification: ClassificationResult) -> RoutingDecision {
        match classification {
            ClassificationResult::Route { intent, target } => {
                RoutingDecision::Routed(self.route_intent(intent, target).await)
            }
            ClassificationResult::Confirm { intent, message } => {
                RoutingDecision::Routed(RoutingResult::ConfirmationRequired { intent, message })
            }
            ClassificationResult::Clarify { response } => RoutingDecision::Clarification(response),
        }
    }

    /// Gates navigation on every prerequisite the intent declares. Checks run
    /// in registry order; a failed check counts as unmet.
    pub async fn route_intent(&self, intent: ParsedIntent, target: RoutingTarget) -> RoutingResult {
        let intent_type = intent.intent_type();
        if !intent_type.is_navigational() {
            let response = self.answers.answer(&intent).await;
            return RoutingResult::NoNavigation { intent, response };
        }

        let mut missing = Vec::new();
        for prerequisite in intent_type.prerequisites().iter().copied() {
            match self.checker.check(prerequisite).await {
                Ok(true) => {}
                Ok(false) => missing.push(prerequisite),
                Err(error) => {
                    warn!(
                        event_name = "agent.router.prerequisite_check_failed",
                        prerequisite = %prerequisite,
                        error = %error,
                        "treating prerequisite as unmet"
                    );
                    missing.push(prerequisite);
                }
            }
        }

        if missing.is_empty() {
            return RoutingResult::Navigate { target, intent };
        }

        info!(
            event_name = "agent.router.prerequisite_missing",
            intent_type = %intent_type,
            missing = ?missing,
            "navigation blocked by missing prerequisites"
        );
        let message = missing_message(&intent, &missing);
        RoutingResult::PrerequisiteMissing { intent, missing, message }
    }
}

fn missing_message(intent: &ParsedIntent, missing: &[Prerequisite]) -> String {
    let descriptions = missing.iter().map(Prerequisite::description).collect::<Vec<_>>();
    let needs = match descriptions.split_last() {
        Some((last, [])) => (*last).to_string(),
        Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
        None => String::new(),
    };
    format!("To {}, I need {needs} first.", intent.intent_type().action_phrase())
}
