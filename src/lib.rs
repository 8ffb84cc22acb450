pub mod callbacks;
pub mod catalog;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod outcome;
pub mod plan;
pub mod ui;

pub use callbacks::{CallbackContext, ExtensionCallback, HookMethod, LifecyclePhase, Runner};
pub use catalog::{ClassDeclaration, HierarchyLevel, HookCatalog};
pub use errors::{CallbackError, DiscoveryError};
pub use orchestrator::{FailedLevelTeardown, LifecycleOrchestrator, OrchestratorConfig};
pub use outcome::{ExecutionOutcome, Failure, FailureKind, OutcomeStatus};
