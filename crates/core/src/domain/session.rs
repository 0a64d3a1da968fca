use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shot::Shot;

/// Upper bound on retained conversation turns.
pub const MAX_CONVERSATION_TURNS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("session-{}", uuid::Uuid::new_v4()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundId(pub String);

impl RoundId {
    pub fn generate() -> Self {
        Self(format!("round-{}", uuid::Uuid::new_v4()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: TurnId(format!("turn-{}", uuid::Uuid::new_v4())),
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content, Utc::now())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content, Utc::now())
    }
}

/// Conversational and round state. Updates return a new value; callers
/// holding an older value never observe the change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub current_round: Option<RoundId>,
    pub current_hole: Option<u8>,
    pub last_shot: Option<Shot>,
    pub last_recommendation: Option<String>,
    conversation_history: Vec<ConversationTurn>,
}

impl SessionContext {
    /// Canonical zero value used before any session is initialised.
    pub fn empty() -> Self {
        Self {
            session_id: SessionId(String::new()),
            current_round: None,
            current_hole: None,
            last_shot: None,
            last_recommendation: None,
            conversation_history: Vec::new(),
        }
    }

    pub fn new(session_id: SessionId) -> Self {
        Self { session_id, ..Self::empty() }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::empty()
    }

    /// Oldest first.
    pub fn conversation_history(&self) -> &[ConversationTurn] {
        &self.conversation_history
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.conversation_history = history;
        trim_history(&mut self.conversation_history);
        self
    }

    /// Appends `turn` then drops the oldest turns beyond the bound.
    pub fn adding_turn(&self, turn: ConversationTurn) -> Self {
        let mut next = self.clone();
        next.conversation_history.push(turn);
        trim_history(&mut next.conversation_history);
        next
    }

    pub fn with_shot(&self, shot: Shot) -> Self {
        let mut next = self.clone();
        if let Some(hole_number) = shot.hole_number {
            next.current_hole = Some(hole_number);
        }
        next.last_shot = Some(shot);
        next
    }

    pub fn with_round(&self, round: RoundId) -> Self {
        let mut next = self.clone();
        next.current_round = Some(round);
        next.current_hole = Some(1);
        next
    }

    pub fn with_hole(&self, hole_number: u8) -> Self {
        let mut next = self.clone();
        next.current_hole = Some(hole_number);
        next
    }

    pub fn with_recommendation(&self, recommendation: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.last_recommendation = Some(recommendation.into());
        next
    }

    pub fn without_history(&self) -> Self {
        let mut next = self.clone();
        next.conversation_history.clear();
        next
    }

    pub fn recent_turns(&self, count: usize) -> &[ConversationTurn] {
        let start = self.conversation_history.len().saturating_sub(count);
        &self.conversation_history[start..]
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::empty()
    }
}

fn trim_history(history: &mut Vec<ConversationTurn>) {
    if history.len() > MAX_CONVERSATION_TURNS {
        let overflow = history.len() - MAX_CONVERSATION_TURNS;
        history.drain(..overflow);
    }
}
