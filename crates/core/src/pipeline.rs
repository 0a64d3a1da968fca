use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// States an input passes through between classification and routing.
/// `Idle` is both the start and the end of every traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Normalizing,
    Classifying,
    Routing,
    Navigate,
    NoNavigation,
    PrerequisiteMissing,
    Confirming,
    Clarifying,
    Degraded,
}

impl PipelineState {
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, next),
            (Idle, Normalizing)
                | (Normalizing, Classifying)
                | (Classifying, Routing)
                | (Classifying, Confirming)
                | (Classifying, Clarifying)
                | (Classifying, Degraded)
                | (Degraded, Clarifying)
                | (Routing, Navigate)
                | (Routing, NoNavigation)
                | (Routing, PrerequisiteMissing)
                | (Navigate, Idle)
                | (NoNavigation, Idle)
                | (PrerequisiteMissing, Idle)
                | (Confirming, Idle)
                | (Clarifying, Idle)
        )
    }

    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            Self::Navigate
                | Self::NoNavigation
                | Self::PrerequisiteMissing
                | Self::Confirming
                | Self::Clarifying
        )
    }
}

/// Ordered record of the states one input visited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTrace {
    states: Vec<PipelineState>,
}

impl Default for PipelineTrace {
    fn default() -> Self {
        Self { states: vec![PipelineState::Idle] }
    }
}

impl PipelineTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<(), DomainError> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(DomainError::InvalidPipelineTransition { from: current, to: next });
        }
        self.states.push(next);
        Ok(())
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    /// The outcome state reached before returning to `Idle`, if any.
    pub fn outcome(&self) -> Option<PipelineState> {
        self.states.iter().rev().copied().find(PipelineState::is_outcome)
    }

    pub fn is_complete(&self) -> bool {
        self.states.len() > 1 && self.current() == PipelineState::Idle
    }
}
