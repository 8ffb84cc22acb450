//! Plan files: a class hierarchy described in TOML with shell-command
//! callbacks, turned into a `HookCatalog` and a `Runner`.

pub mod config;
pub mod executor;

pub use config::{
    ClassDefinition, CommandHookDefinition, ExtensionDefinition, PlanConfig, PlanSettings,
    TestDefinition,
};
pub use executor::{CommandExecutor, CommandExtension, CommandHook, CommandRunner, CommandSpec};

use crate::catalog::{ClassDeclaration, HookCatalog};
use crate::errors::DiscoveryError;
use crate::orchestrator::{FailedLevelTeardown, OrchestratorConfig};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;

/// A loaded plan together with the directory its commands run in.
#[derive(Debug, Clone)]
pub struct Plan {
    config: PlanConfig,
    base_dir: PathBuf,
}

impl Plan {
    /// Load a plan file. Commands run relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let config = PlanConfig::load(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self { config, base_dir })
    }

    pub fn from_config(config: PlanConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
        }
    }

    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn test_label(&self) -> &str {
        &self.config.test.label
    }

    /// Build an executor bound to `handle` using the plan's default timeout.
    pub fn executor(&self, handle: Handle) -> Arc<CommandExecutor> {
        Arc::new(CommandExecutor::new(
            &self.base_dir,
            handle,
            self.config.settings.timeout_secs,
        ))
    }

    /// One declaration per class, with disabled callbacks left out.
    pub fn declarations(&self, executor: &Arc<CommandExecutor>) -> Vec<ClassDeclaration> {
        self.config
            .classes
            .iter()
            .map(|class| {
                let mut decl = ClassDeclaration::new(&class.name);
                if let Some(parent) = &class.extends {
                    decl = decl.extends(parent);
                }
                for def in class.enabled_setup() {
                    decl = decl.with_setup(CommandHook::from_definition(def, executor.clone()));
                }
                for def in class.enabled_teardown() {
                    decl =
                        decl.with_teardown(CommandHook::from_definition(def, executor.clone()));
                }
                for def in class.enabled_extensions() {
                    decl = decl
                        .with_extension(CommandExtension::from_definition(def, executor.clone()));
                }
                decl
            })
            .collect()
    }

    pub fn catalog(&self, executor: &Arc<CommandExecutor>) -> Result<HookCatalog, DiscoveryError> {
        HookCatalog::build(self.declarations(executor))
    }

    pub fn runner(&self, executor: &Arc<CommandExecutor>) -> CommandRunner {
        CommandRunner::from_definition(&self.config.test, executor.clone())
    }

    /// Orchestrator configuration, with `policy` overriding the plan's setting.
    pub fn orchestrator_config(&self, policy: Option<FailedLevelTeardown>) -> OrchestratorConfig {
        OrchestratorConfig::default().with_failed_level_teardown(
            policy.unwrap_or(self.config.settings.failed_level_teardown),
        )
    }
}
