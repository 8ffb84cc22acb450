use crate::errors::StateError;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// States of a single class execution.
///
/// The happy path is `Idle → EnteringExtensions → RunningSetupHooks →
/// RunningTest → RunningTeardownHooks → ExitingExtensions → Done`. A
/// before-phase failure moves to `Failed`, from which only the unwind states
/// are reachable, and the run then ends in `Failed` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    EnteringExtensions,
    RunningSetupHooks,
    RunningTest,
    RunningTeardownHooks,
    ExitingExtensions,
    Done,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::EnteringExtensions => "entering_extensions",
            LifecycleState::RunningSetupHooks => "running_setup_hooks",
            LifecycleState::RunningTest => "running_test",
            LifecycleState::RunningTeardownHooks => "running_teardown_hooks",
            LifecycleState::ExitingExtensions => "exiting_extensions",
            LifecycleState::Done => "done",
            LifecycleState::Failed => "failed",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, EnteringExtensions)
                | (EnteringExtensions, RunningSetupHooks)
                | (EnteringExtensions, Failed)
                | (RunningSetupHooks, RunningTest)
                | (RunningSetupHooks, Failed)
                | (RunningTest, RunningTeardownHooks)
                | (Failed, RunningTeardownHooks)
                | (RunningTeardownHooks, ExitingExtensions)
                | (ExitingExtensions, Done)
                | (ExitingExtensions, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Done | LifecycleState::Failed)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks the current state and the trail of states visited.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: LifecycleState,
    trail: Vec<LifecycleState>,
    failed: bool,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: LifecycleState::Idle,
            trail: vec![LifecycleState::Idle],
            failed: false,
        }
    }

    pub fn current(&self) -> LifecycleState {
        self.current
    }

    /// Whether the run has entered `Failed` at any point.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn trail(&self) -> &[LifecycleState] {
        &self.trail
    }

    pub fn advance(&mut self, next: LifecycleState) -> Result<(), StateError> {
        if !self.current.can_transition_to(next) {
            return Err(StateError::IllegalTransition {
                from: self.current,
                to: next,
            });
        }
        trace!(from = %self.current, to = %next, "Lifecycle transition");
        if next == LifecycleState::Failed {
            self.failed = true;
        }
        self.current = next;
        self.trail.push(next);
        Ok(())
    }

    /// Move from `ExitingExtensions` to the terminal state: `Done` when the
    /// run succeeded, `Failed` otherwise.
    pub fn finish(&mut self, succeeded: bool) -> Result<LifecycleState, StateError> {
        let terminal = if succeeded && !self.failed {
            LifecycleState::Done
        } else {
            LifecycleState::Failed
        };
        self.advance(terminal)?;
        Ok(terminal)
    }

    pub fn into_trail(self) -> Vec<LifecycleState> {
        self.trail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut machine = StateMachine::new();
        for next in [
            EnteringExtensions,
            RunningSetupHooks,
            RunningTest,
            RunningTeardownHooks,
            ExitingExtensions,
        ] {
            machine.advance(next).unwrap();
        }
        assert_eq!(machine.finish(true).unwrap(), Done);
        assert_eq!(machine.trail().len(), 7);
        assert!(!machine.has_failed());
        assert!(machine.current().is_terminal());
    }

    #[test]
    fn test_failed_is_sticky() {
        let mut machine = StateMachine::new();
        machine.advance(EnteringExtensions).unwrap();
        machine.advance(RunningSetupHooks).unwrap();
        machine.advance(Failed).unwrap();
        machine.advance(RunningTeardownHooks).unwrap();
        machine.advance(ExitingExtensions).unwrap();
        // success reported by the caller does not clear an earlier failure
        assert_eq!(machine.finish(true).unwrap(), Failed);
        assert!(machine.has_failed());
    }

    #[test]
    fn test_failure_unreachable_from_test_or_unwind_states() {
        assert!(!RunningTest.can_transition_to(Failed));
        assert!(!RunningTeardownHooks.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(RunningTest));
        assert!(!Failed.can_transition_to(RunningSetupHooks));
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut machine = StateMachine::new();
        let err = machine.advance(RunningTest).unwrap_err();
        assert_eq!(
            err,
            StateError::IllegalTransition {
                from: Idle,
                to: RunningTest,
            }
        );
        assert_eq!(machine.current(), Idle);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RunningTeardownHooks.to_string(), "running_teardown_hooks");
        assert_eq!(
            serde_json::to_value(ExitingExtensions).unwrap(),
            "exiting_extensions"
        );
    }
}
