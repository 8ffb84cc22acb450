//! Typed error hierarchy for the lifecycle core.
//!
//! Three enums cover the three places things go wrong:
//! - `DiscoveryError`: the class hierarchy handed to the catalog is malformed
//! - `CallbackError`: a setup/teardown hook, extension or runner failed
//! - `StateError`: the orchestrator attempted an illegal state transition

use crate::orchestrator::LifecycleState;
use serde::Serialize;
use thiserror::Error;

/// Placeholder used in messages where a class has no declared parent.
pub const NO_PARENT: &str = "<none>";

/// Malformed hierarchy input from the discovery collaborator.
///
/// These are programmer errors on the discovery side; the catalog refuses to
/// build and no callback runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("Hierarchy contains no classes")]
    EmptyHierarchy,

    #[error("Class {name} is declared twice (levels {first} and {second})")]
    DuplicateLevel {
        name: String,
        first: usize,
        second: usize,
    },

    #[error("Cyclic inheritance: {class} extends {parent}, which is not one of its ancestors")]
    CyclicInheritance { class: String, parent: String },

    #[error("Class {class} at level {level} extends {parent}, expected {expected}")]
    BrokenChain {
        class: String,
        level: usize,
        parent: String,
        expected: String,
    },
}

/// Failure raised by a single callback invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallbackError {
    #[error("{message}")]
    Failed { message: String },

    #[error("Command exited with code {code}: {message}")]
    NonZeroExit { code: i32, message: String },

    #[error("Command timed out after {secs} seconds")]
    TimedOut { secs: u64 },

    #[error("Failed to spawn command: {message}")]
    Spawn { message: String },

    #[error("Execution cancelled before {callback}")]
    Cancelled { callback: String },
}

impl CallbackError {
    /// Plain failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Whether this is the synthetic failure injected on cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Illegal orchestrator state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Illegal lifecycle transition from {from} to {to}")]
    IllegalTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}
