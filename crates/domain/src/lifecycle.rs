//! Entity lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle of an aggregate, saga or view.
///
/// State transitions:
/// ```text
/// Active ──┬──► PendingDestruction ──► Destroyed
///          └──────────────────────────► Destroyed
/// ```
///
/// Only aggregates enter `PendingDestruction`; once there, the next handled
/// event must destroy the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Lifecycle {
    /// The entity accepts state changes.
    #[default]
    Active,

    /// The entity must be destroyed by the next handled event.
    PendingDestruction,

    /// The entity is gone (terminal state).
    Destroyed,
}

impl Lifecycle {
    /// Returns the state reached by moving to `next`, or `None` if the
    /// transition is illegal.
    pub fn transition(self, next: Lifecycle) -> Option<Lifecycle> {
        match (self, next) {
            (Lifecycle::Active, Lifecycle::PendingDestruction)
            | (Lifecycle::PendingDestruction, Lifecycle::PendingDestruction)
            | (Lifecycle::Active, Lifecycle::Destroyed)
            | (Lifecycle::PendingDestruction, Lifecycle::Destroyed) => Some(next),
            _ => None,
        }
    }

    /// Returns true if state may still change.
    pub fn can_mutate(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if destruction has been scheduled but not carried out.
    pub fn is_pending_destruction(&self) -> bool {
        matches!(self, Lifecycle::PendingDestruction)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Destroyed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Active => "Active",
            Lifecycle::PendingDestruction => "PendingDestruction",
            Lifecycle::Destroyed => "Destroyed",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
