//! Plan file parsing and validation.
//!
//! A plan describes one class hierarchy, root first, with shell-command
//! callbacks:
//!
//! ```toml
//! [settings]
//! failed_level_teardown = "skip"
//! timeout_secs = 30
//!
//! [test]
//! command = "cargo test -q"
//!
//! [[classes]]
//! name = "Root"
//! setup = [{ name = "s0", command = "./db-up.sh" }]
//! teardown = [{ name = "t0", command = "./db-down.sh" }]
//! extensions = [{ name = "X", enter = "echo in", exit = "echo out" }]
//!
//! [[classes]]
//! name = "Leaf"
//! extends = "Root"
//! ```

use crate::callbacks::DEFAULT_TEST_LABEL;
use crate::orchestrator::FailedLevelTeardown;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_timeout() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

fn default_test_label() -> String {
    DEFAULT_TEST_LABEL.to_string()
}

/// A setup or teardown hook backed by a shell command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandHookDefinition {
    /// Identifier recorded in the outcome
    pub name: String,

    /// Command run through `sh -c`
    pub command: String,

    /// Working directory, relative to the plan file's directory
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Overrides `settings.timeout_secs`
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub description: Option<String>,
}

impl CommandHookDefinition {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            working_dir: None,
            timeout_secs: None,
            enabled: true,
            description: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn validate(&self, class: &str, kind: &str) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.name.trim().is_empty() {
            warnings.push(format!("Class '{}' has a {} hook with an empty name", class, kind));
        }
        if self.command.trim().is_empty() {
            warnings.push(format!(
                "{} hook '{}' in class '{}' has an empty command",
                kind, self.name, class
            ));
        }
        if self.timeout_secs == Some(0) {
            warnings.push(format!(
                "{} hook '{}' in class '{}' has timeout of 0 seconds",
                kind, self.name, class
            ));
        }
        warnings
    }
}

/// An extension whose enter and exit sides are shell commands.
///
/// A side without a command succeeds without doing anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionDefinition {
    pub name: String,

    #[serde(default)]
    pub enter: Option<String>,

    #[serde(default)]
    pub exit: Option<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub description: Option<String>,
}

impl ExtensionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enter: None,
            exit: None,
            working_dir: None,
            timeout_secs: None,
            enabled: true,
            description: None,
        }
    }

    pub fn with_enter(mut self, command: impl Into<String>) -> Self {
        self.enter = Some(command.into());
        self
    }

    pub fn with_exit(mut self, command: impl Into<String>) -> Self {
        self.exit = Some(command.into());
        self
    }

    fn validate(&self, class: &str) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.name.trim().is_empty() {
            warnings.push(format!("Class '{}' has an extension with an empty name", class));
        }
        if self.enter.is_none() && self.exit.is_none() {
            warnings.push(format!(
                "Extension '{}' in class '{}' has neither an enter nor an exit command",
                self.name, class
            ));
        }
        if self.timeout_secs == Some(0) {
            warnings.push(format!(
                "Extension '{}' in class '{}' has timeout of 0 seconds",
                self.name, class
            ));
        }
        warnings
    }
}

/// One class of the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub name: String,

    /// Direct superclass; must be the previous entry in `classes`
    #[serde(default)]
    pub extends: Option<String>,

    #[serde(default)]
    pub setup: Vec<CommandHookDefinition>,

    #[serde(default)]
    pub teardown: Vec<CommandHookDefinition>,

    #[serde(default)]
    pub extensions: Vec<ExtensionDefinition>,
}

impl ClassDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            setup: Vec::new(),
            teardown: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn enabled_setup(&self) -> impl Iterator<Item = &CommandHookDefinition> {
        self.setup.iter().filter(|h| h.enabled)
    }

    pub fn enabled_teardown(&self) -> impl Iterator<Item = &CommandHookDefinition> {
        self.teardown.iter().filter(|h| h.enabled)
    }

    pub fn enabled_extensions(&self) -> impl Iterator<Item = &ExtensionDefinition> {
        self.extensions.iter().filter(|e| e.enabled)
    }

    fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.name.trim().is_empty() {
            warnings.push("A class has an empty name".to_string());
        }
        for hook in &self.setup {
            warnings.extend(hook.validate(&self.name, "Setup"));
        }
        for hook in &self.teardown {
            warnings.extend(hook.validate(&self.name, "Teardown"));
        }
        for ext in &self.extensions {
            warnings.extend(ext.validate(&self.name));
        }
        warnings
    }
}

/// The test body executed between setup and teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    #[serde(default = "default_test_label")]
    pub label: String,

    /// When absent the test phase succeeds without running anything
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for TestDefinition {
    fn default() -> Self {
        Self {
            label: default_test_label(),
            command: None,
            working_dir: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSettings {
    #[serde(default)]
    pub failed_level_teardown: FailedLevelTeardown,

    /// Default timeout for every command
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            failed_level_teardown: FailedLevelTeardown::default(),
            timeout_secs: default_timeout(),
        }
    }
}

/// A parsed plan file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanConfig {
    #[serde(default)]
    pub settings: PlanSettings,

    #[serde(default)]
    pub test: TestDefinition,

    /// Root ancestor first, concrete class last
    #[serde(default)]
    pub classes: Vec<ClassDefinition>,
}

impl PlanConfig {
    /// Load a plan from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse plan file: {}", path.display()))
    }

    /// Parse a plan from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid plan TOML")
    }

    /// Return human-readable warnings. Structural problems with the
    /// hierarchy itself are reported when the catalog is built.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.classes.is_empty() {
            warnings.push("Plan declares no classes".to_string());
        }
        if self.settings.timeout_secs == 0 {
            warnings.push("settings.timeout_secs is 0 seconds".to_string());
        }
        if self.test.label.trim().is_empty() {
            warnings.push("test.label is empty".to_string());
        }
        if self.test.timeout_secs == Some(0) {
            warnings.push("test.timeout_secs is 0 seconds".to_string());
        }
        warnings.extend(self.classes.iter().flat_map(|c| c.validate()));
        warnings
    }

    /// The concrete class under execution.
    pub fn leaf(&self) -> Option<&ClassDefinition> {
        self.classes.last()
    }

    /// Total number of enabled hooks and extensions across all classes.
    pub fn enabled_callback_count(&self) -> usize {
        self.classes
            .iter()
            .map(|c| {
                c.enabled_setup().count()
                    + c.enabled_teardown().count()
                    + c.enabled_extensions().count()
            })
            .sum()
    }
}
