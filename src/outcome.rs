//! Execution outcome and the recorder that builds it.
//!
//! The recorder is a pure observer: one `Invocation` per callback actually
//! invoked, appended in the order the orchestrator performs them, never
//! reordered or deduplicated. Failures are kept in the order they happened;
//! the first one becomes the primary status, later ones are suppressed.

use crate::callbacks::{CallbackContext, LifecyclePhase};
use crate::errors::CallbackError;
use crate::orchestrator::LifecycleState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// Which part of the lifecycle a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An extension `on_enter` or a setup hook raised, or the run was cancelled
    Setup,
    /// The runner failed
    Test,
    /// A teardown hook or an extension `on_exit` raised
    Teardown,
}

impl FailureKind {
    pub fn for_phase(phase: LifecyclePhase) -> Self {
        match phase {
            LifecyclePhase::ExtensionEnter | LifecyclePhase::Setup => FailureKind::Setup,
            LifecyclePhase::Test => FailureKind::Test,
            LifecyclePhase::Teardown | LifecyclePhase::ExtensionExit => FailureKind::Teardown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Setup => "setup",
            FailureKind::Test => "test",
            FailureKind::Teardown => "teardown",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded callback invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    /// Recorded label, e.g. `X.enter`, `s0`, `<test>`
    pub label: String,
    /// Identifier of the callback itself
    pub callback: String,
    pub phase: LifecyclePhase,
    pub level: Option<usize>,
    pub succeeded: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A failure attributed to the callback that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub callback: String,
    pub phase: LifecyclePhase,
    pub level: Option<usize>,
    pub error: CallbackError,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error in {}: {}", self.kind, self.callback, self.error)
    }
}

/// Terminal status of one class execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure(Failure),
}

/// The sole externally observable artifact of a class execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    run_id: Uuid,
    class_name: String,
    invocations: Vec<Invocation>,
    status: OutcomeStatus,
    suppressed: Vec<Failure>,
    states: Vec<LifecycleState>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl ExecutionOutcome {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The leaf class that was executed.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Every recorded label in chronological order.
    pub fn labels(&self) -> Vec<&str> {
        self.invocations.iter().map(|i| i.label.as_str()).collect()
    }

    /// Labels recorded in a single phase, in chronological order.
    pub fn labels_in(&self, phase: LifecyclePhase) -> Vec<&str> {
        self.invocations
            .iter()
            .filter(|i| i.phase == phase)
            .map(|i| i.label.as_str())
            .collect()
    }

    /// `<name>.enter` labels in invocation order.
    pub fn enter_labels(&self) -> Vec<&str> {
        self.labels_in(LifecyclePhase::ExtensionEnter)
    }

    /// `<name>.exit` labels in invocation order.
    pub fn exit_labels(&self) -> Vec<&str> {
        self.labels_in(LifecyclePhase::ExtensionExit)
    }

    /// Identifiers of the extensions whose `on_enter` was invoked.
    pub fn entered_extensions(&self) -> Vec<&str> {
        self.callbacks_in(LifecyclePhase::ExtensionEnter)
    }

    /// Identifiers of the extensions whose `on_exit` was invoked.
    pub fn exited_extensions(&self) -> Vec<&str> {
        self.callbacks_in(LifecyclePhase::ExtensionExit)
    }

    fn callbacks_in(&self, phase: LifecyclePhase) -> Vec<&str> {
        self.invocations
            .iter()
            .filter(|i| i.phase == phase)
            .map(|i| i.callback.as_str())
            .collect()
    }

    /// Labels of invocations that failed.
    pub fn failed_labels(&self) -> Vec<&str> {
        self.invocations
            .iter()
            .filter(|i| !i.succeeded)
            .map(|i| i.label.as_str())
            .collect()
    }

    pub fn status(&self) -> &OutcomeStatus {
        &self.status
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success)
    }

    /// The first failure chronologically, if any.
    pub fn primary_failure(&self) -> Option<&Failure> {
        match &self.status {
            OutcomeStatus::Success => None,
            OutcomeStatus::Failure(failure) => Some(failure),
        }
    }

    /// Failures after the primary one, in the order they happened.
    pub fn suppressed(&self) -> &[Failure] {
        &self.suppressed
    }

    /// Primary failure followed by the suppressed ones.
    pub fn all_failures(&self) -> impl Iterator<Item = &Failure> {
        self.primary_failure().into_iter().chain(self.suppressed.iter())
    }

    /// Whether the runner was invoked.
    pub fn test_executed(&self) -> bool {
        self.invocations
            .iter()
            .any(|i| i.phase == LifecyclePhase::Test)
    }

    /// Orchestrator states visited, ending in `Done` or `Failed`.
    pub fn states(&self) -> &[LifecycleState] {
        &self.states
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }
}

/// Builds an `ExecutionOutcome` as the orchestrator runs.
#[derive(Debug)]
pub(crate) struct Recorder {
    run_id: Uuid,
    class_name: String,
    invocations: Vec<Invocation>,
    failures: Vec<Failure>,
    started_at: DateTime<Utc>,
}

impl Recorder {
    pub(crate) fn new(class_name: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            class_name: class_name.to_string(),
            invocations: Vec::new(),
            failures: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Invoke `f`, record the invocation under `label`, and record its
    /// failure if it returned one. Returns whether the callback succeeded.
    pub(crate) fn invoke<F>(&mut self, context: &CallbackContext, label: String, f: F) -> bool
    where
        F: FnOnce() -> Result<(), CallbackError>,
    {
        debug!(
            callback = %context.callback,
            level = ?context.level,
            phase = %context.phase,
            "Invoking callback"
        );
        let started_at = Utc::now();
        let result = f();
        let finished_at = Utc::now();

        self.invocations.push(Invocation {
            label,
            callback: context.callback.clone(),
            phase: context.phase,
            level: context.level,
            succeeded: result.is_ok(),
            started_at,
            finished_at,
        });

        match result {
            Ok(()) => true,
            Err(error) => {
                self.fail(context, FailureKind::for_phase(context.phase), error);
                false
            }
        }
    }

    /// Record a failure that did not come from an invocation (cancellation).
    pub(crate) fn inject(
        &mut self,
        context: &CallbackContext,
        kind: FailureKind,
        error: CallbackError,
    ) {
        self.fail(context, kind, error);
    }

    fn fail(&mut self, context: &CallbackContext, kind: FailureKind, error: CallbackError) {
        let failure = Failure {
            kind,
            callback: context.callback.clone(),
            phase: context.phase,
            level: context.level,
            error,
        };
        if self.failures.is_empty() {
            warn!(class = %self.class_name, "{}", failure);
        } else {
            warn!(class = %self.class_name, "{} (suppressed)", failure);
        }
        self.failures.push(failure);
    }

    pub(crate) fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub(crate) fn finish(self, states: Vec<LifecycleState>) -> ExecutionOutcome {
        let mut failures = self.failures.into_iter();
        let status = match failures.next() {
            Some(primary) => OutcomeStatus::Failure(primary),
            None => OutcomeStatus::Success,
        };
        ExecutionOutcome {
            run_id: self.run_id,
            class_name: self.class_name,
            invocations: self.invocations,
            status,
            suppressed: failures.collect(),
            states,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
