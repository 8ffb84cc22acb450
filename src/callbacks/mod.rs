//! Callback capabilities driven by the orchestrator.
//!
//! Two independently-specified callback sources wrap a class execution:
//! - `HookMethod`: a declared, single-phase setup or teardown hook
//! - `ExtensionCallback`: a pluggable object with an enter and an exit side
//!
//! The test body itself is delegated to a `Runner`. Every callback receives
//! a `CallbackContext` describing where in the lifecycle it is being invoked.
//!
//! Closure adapters (`hook`, `extension`, `runner`) cover in-process use;
//! the `plan` module provides shell-command implementations.

use crate::errors::CallbackError;
use serde::{Deserialize, Serialize};

/// Label recorded for the test body when the runner does not name itself.
pub const DEFAULT_TEST_LABEL: &str = "<test>";

/// The point in the class lifecycle at which a callback is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Extension `on_enter`, root-to-leaf cumulative order
    ExtensionEnter,
    /// Declared setup hook, levels root-first
    Setup,
    /// The test body, via the runner
    Test,
    /// Declared teardown hook, levels leaf-first
    Teardown,
    /// Extension `on_exit`, reverse of enter order
    ExtensionExit,
}

impl LifecyclePhase {
    /// Returns all phases in execution order.
    pub fn all() -> &'static [LifecyclePhase] {
        &[
            LifecyclePhase::ExtensionEnter,
            LifecyclePhase::Setup,
            LifecyclePhase::Test,
            LifecyclePhase::Teardown,
            LifecyclePhase::ExtensionExit,
        ]
    }

    /// Returns the phase name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::ExtensionEnter => "extension_enter",
            LifecyclePhase::Setup => "setup",
            LifecyclePhase::Test => "test",
            LifecyclePhase::Teardown => "teardown",
            LifecyclePhase::ExtensionExit => "extension_exit",
        }
    }

    /// Whether this phase belongs to the before pass (enter, setup, test).
    pub fn is_before(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::ExtensionEnter | LifecyclePhase::Setup | LifecyclePhase::Test
        )
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LifecyclePhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extension_enter" | "enter" => Ok(LifecyclePhase::ExtensionEnter),
            "setup" => Ok(LifecyclePhase::Setup),
            "test" => Ok(LifecyclePhase::Test),
            "teardown" => Ok(LifecyclePhase::Teardown),
            "extension_exit" | "exit" => Ok(LifecyclePhase::ExtensionExit),
            _ => anyhow::bail!(
                "Invalid lifecycle phase '{}'. Valid values: extension_enter, setup, test, teardown, extension_exit",
                s
            ),
        }
    }
}

/// Context handed to every callback invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackContext {
    /// The concrete (leaf) class under execution
    pub class_name: String,
    /// Ordinal of the level that declared the callback; `None` for the runner
    pub level: Option<usize>,
    /// Name of the class that declared the callback; `None` for the runner
    pub declaring_class: Option<String>,
    /// Identifier of the callback being invoked
    pub callback: String,
    pub phase: LifecyclePhase,
}

impl CallbackContext {
    pub(crate) fn new(
        class_name: &str,
        level: Option<(usize, &str)>,
        callback: &str,
        phase: LifecyclePhase,
    ) -> Self {
        Self {
            class_name: class_name.to_string(),
            level: level.map(|(ordinal, _)| ordinal),
            declaring_class: level.map(|(_, name)| name.to_string()),
            callback: callback.to_string(),
            phase,
        }
    }
}

/// A declared once-per-class setup or teardown hook.
pub trait HookMethod: Send {
    /// Identifier recorded in the execution outcome.
    fn name(&self) -> &str;

    fn invoke(&self, context: &CallbackContext) -> Result<(), CallbackError>;
}

/// A pluggable enter/exit pair wrapping the whole class execution.
///
/// The orchestrator calls `on_exit` only if `on_enter` returned `Ok`, and
/// calls each side at most once per class execution.
pub trait ExtensionCallback: Send {
    /// Identifier recorded in the execution outcome.
    fn name(&self) -> &str;

    fn on_enter(&self, context: &CallbackContext) -> Result<(), CallbackError>;

    fn on_exit(&self, context: &CallbackContext) -> Result<(), CallbackError>;
}

/// Executes the test methods of the class. Invoked at most once per class
/// execution, and only when every before-phase callback succeeded.
pub trait Runner: Send {
    fn label(&self) -> &str {
        DEFAULT_TEST_LABEL
    }

    fn run(&mut self, context: &CallbackContext) -> Result<(), CallbackError>;
}

/// Closure-backed `HookMethod`.
pub struct FnHook<F> {
    name: String,
    f: F,
}

/// Create a hook method from a closure.
pub fn hook<F>(name: impl Into<String>, f: F) -> FnHook<F>
where
    F: Fn(&CallbackContext) -> Result<(), CallbackError> + Send,
{
    FnHook {
        name: name.into(),
        f,
    }
}

impl<F> HookMethod for FnHook<F>
where
    F: Fn(&CallbackContext) -> Result<(), CallbackError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, context: &CallbackContext) -> Result<(), CallbackError> {
        (self.f)(context)
    }
}

/// Closure-backed `ExtensionCallback`.
pub struct FnExtension<E, X> {
    name: String,
    enter: E,
    exit: X,
}

/// Create an extension from a pair of closures.
pub fn extension<E, X>(name: impl Into<String>, enter: E, exit: X) -> FnExtension<E, X>
where
    E: Fn(&CallbackContext) -> Result<(), CallbackError> + Send,
    X: Fn(&CallbackContext) -> Result<(), CallbackError> + Send,
{
    FnExtension {
        name: name.into(),
        enter,
        exit,
    }
}

impl<E, X> ExtensionCallback for FnExtension<E, X>
where
    E: Fn(&CallbackContext) -> Result<(), CallbackError> + Send,
    X: Fn(&CallbackContext) -> Result<(), CallbackError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_enter(&self, context: &CallbackContext) -> Result<(), CallbackError> {
        (self.enter)(context)
    }

    fn on_exit(&self, context: &CallbackContext) -> Result<(), CallbackError> {
        (self.exit)(context)
    }
}

/// Closure-backed `Runner`.
pub struct FnRunner<F> {
    label: String,
    f: F,
}

/// Create a runner from a closure, recorded under `label`.
pub fn runner<F>(label: impl Into<String>, f: F) -> FnRunner<F>
where
    F: FnMut(&CallbackContext) -> Result<(), CallbackError> + Send,
{
    FnRunner {
        label: label.into(),
        f,
    }
}

impl<F> Runner for FnRunner<F>
where
    F: FnMut(&CallbackContext) -> Result<(), CallbackError> + Send,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn run(&mut self, context: &CallbackContext) -> Result<(), CallbackError> {
        (self.f)(context)
    }
}
