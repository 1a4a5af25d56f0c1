/// Run state definitions for the crawl orchestrator
///
/// This module defines the lifecycle of a single crawl run and the legal
/// transitions between its states.
use super::lock;
use crate::TrawlError;
use std::fmt;
use std::sync::Mutex;

/// Represents the current state of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    // ===== Active States =====
    /// Seeds are being validated and per-run structures constructed
    Init,

    /// Workers are pulling entries from a non-empty frontier
    Running,

    /// The frontier is empty but some workers still hold in-flight work
    Draining,

    // ===== Terminal States =====
    /// The frontier is exhausted (or the run was cancelled) and no work remains
    Finished,

    /// The run hit an unrecoverable configuration error
    Failed,
}

impl RunState {
    /// Returns true if this is a terminal state (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Returns true if workers may still be doing work in this state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Draining)
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    ///
    /// Cancellation moves any non-terminal state straight to `Finished`, and a
    /// configuration error moves any non-terminal state to `Failed`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Self::Finished) | (_, Self::Failed) => true,
            (Self::Init, Self::Running) => true,
            (Self::Running, Self::Draining) => true,
            (Self::Draining, Self::Running) => true,
            _ => false,
        }
    }

    /// Returns the lowercase name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared holder for the current run state that validates every transition
#[derive(Debug)]
pub struct RunStateMachine {
    state: Mutex<RunState>,
}

impl RunStateMachine {
    /// Creates a machine in the `Init` state
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Init),
        }
    }

    /// Returns the current state
    pub fn current(&self) -> RunState {
        *lock(&self.state)
    }

    /// Moves to `next`, rejecting illegal transitions
    ///
    /// A transition to the current state is a no-op.
    pub fn transition(&self, next: RunState) -> Result<(), TrawlError> {
        let mut state = lock(&self.state);
        if *state == next {
            return Ok(());
        }
        if !state.can_transition_to(next) {
            return Err(TrawlError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        tracing::debug!("Run state {} -> {}", *state, next);
        *state = next;
        Ok(())
    }

    /// Toggles between `Running` and `Draining` based on frontier occupancy
    ///
    /// Does nothing once the run has left the active states.
    pub fn sync_activity(&self, frontier_empty: bool) {
        let mut state = lock(&self.state);
        let next = match (*state, frontier_empty) {
            (RunState::Running, true) => RunState::Draining,
            (RunState::Draining, false) => RunState::Running,
            _ => return,
        };
        tracing::trace!("Run state {} -> {}", *state, next);
        *state = next;
    }
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
