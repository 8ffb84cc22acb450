//! Class lifecycle orchestration.
//!
//! `LifecycleOrchestrator` walks a `HookCatalog` through the before pass
//! (extension enter, setup hooks, test) and the after pass (teardown hooks,
//! extension exit) with strict stack discipline. `state` holds the state
//! machine the run moves through.
//!
//! # Usage
//!
//! ```ignore
//! use lifecycle::catalog::{ClassDeclaration, HookCatalog};
//! use lifecycle::orchestrator::LifecycleOrchestrator;
//!
//! let catalog = HookCatalog::build(declarations)?;
//! let outcome = LifecycleOrchestrator::default().run(&catalog, &mut runner);
//!
//! if !outcome.is_success() {
//!     // report outcome.primary_failure() and outcome.suppressed()
//! }
//! ```

pub mod runner;
pub mod state;

pub use runner::{FailedLevelTeardown, LifecycleOrchestrator, OrchestratorConfig};
pub use state::{LifecycleState, StateMachine};
