//! Shell-command callbacks.
//!
//! Every command runs through `sh -c` with the serialized `CallbackContext`
//! on stdin and the following environment:
//!
//! - `LIFECYCLE_CLASS`: concrete class under execution
//! - `LIFECYCLE_LEVEL`: ordinal of the declaring level (empty for the test)
//! - `LIFECYCLE_CALLBACK`: callback identifier
//! - `LIFECYCLE_PHASE`: `extension_enter`, `setup`, `test`, `teardown` or `extension_exit`
//!
//! Exit code 0 is success. Any other exit, a timeout, or a spawn failure
//! fails the callback.

use super::config::{CommandHookDefinition, ExtensionDefinition, TestDefinition};
use crate::callbacks::{CallbackContext, ExtensionCallback, HookMethod, Runner};
use crate::errors::CallbackError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::time::timeout;
use tracing::{debug, trace};

/// What to run for a single callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            timeout_secs: None,
        }
    }
}

/// Runs command callbacks on a tokio runtime from synchronous code.
///
/// Callers must not be on a runtime worker thread; the orchestrator is
/// driven from `spawn_blocking` or a plain thread.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    /// Directory relative working dirs resolve against
    base_dir: PathBuf,
    handle: Handle,
    default_timeout_secs: u64,
}

impl CommandExecutor {
    pub fn new(base_dir: impl AsRef<Path>, handle: Handle, default_timeout_secs: u64) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            handle,
            default_timeout_secs,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn working_dir(&self, spec: &CommandSpec) -> PathBuf {
        match &spec.working_dir {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => self.base_dir.join(p),
            None => self.base_dir.clone(),
        }
    }

    /// Run `spec` to completion for the callback described by `context`.
    pub fn execute(&self, spec: &CommandSpec, context: &CallbackContext) -> Result<(), CallbackError> {
        self.handle.block_on(self.execute_async(spec, context))
    }

    async fn execute_async(
        &self,
        spec: &CommandSpec,
        context: &CallbackContext,
    ) -> Result<(), CallbackError> {
        let secs = spec.timeout_secs.unwrap_or(self.default_timeout_secs);
        let context_json = serde_json::to_string(context).map_err(|e| CallbackError::Spawn {
            message: format!("failed to serialize callback context: {}", e),
        })?;

        debug!(
            command = %spec.command,
            callback = %context.callback,
            timeout_secs = secs,
            "Executing command"
        );

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&spec.command)
            .current_dir(self.working_dir(spec))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("LIFECYCLE_CLASS", &context.class_name)
            .env(
                "LIFECYCLE_LEVEL",
                context.level.map(|l| l.to_string()).unwrap_or_default(),
            )
            .env("LIFECYCLE_CALLBACK", &context.callback)
            .env("LIFECYCLE_PHASE", context.phase.as_str())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CallbackError::Spawn {
                message: format!("{}: {}", spec.command, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that never reads stdin may close it early
            if let Err(e) = stdin.write_all(context_json.as_bytes()).await {
                trace!(error = %e, "Command did not accept context on stdin");
            }
        }

        let output = match timeout(Duration::from_secs(secs), child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| CallbackError::Spawn {
                message: format!("failed to wait for {}: {}", spec.command, e),
            })?,
            Err(_) => return Err(CallbackError::TimedOut { secs }),
        };

        let code = output.status.code().unwrap_or(-1);
        debug!(exit_code = code, callback = %context.callback, "Command completed");

        if output.status.success() {
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if !stderr.trim().is_empty() {
            stderr.trim().to_string()
        } else if !stdout.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            format!("'{}' produced no output", spec.command)
        };
        Err(CallbackError::NonZeroExit { code, message })
    }
}

/// A setup or teardown hook that runs a shell command.
#[derive(Debug, Clone)]
pub struct CommandHook {
    name: String,
    spec: CommandSpec,
    executor: Arc<CommandExecutor>,
}

impl CommandHook {
    pub fn new(name: impl Into<String>, spec: CommandSpec, executor: Arc<CommandExecutor>) -> Self {
        Self {
            name: name.into(),
            spec,
            executor,
        }
    }

    pub fn from_definition(def: &CommandHookDefinition, executor: Arc<CommandExecutor>) -> Self {
        let spec = CommandSpec {
            command: def.command.clone(),
            working_dir: def.working_dir.clone(),
            timeout_secs: def.timeout_secs,
        };
        Self::new(def.name.clone(), spec, executor)
    }
}

impl HookMethod for CommandHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, context: &CallbackContext) -> Result<(), CallbackError> {
        self.executor.execute(&self.spec, context)
    }
}

/// An extension whose enter and exit sides are optional shell commands.
#[derive(Debug, Clone)]
pub struct CommandExtension {
    name: String,
    enter: Option<CommandSpec>,
    exit: Option<CommandSpec>,
    executor: Arc<CommandExecutor>,
}

impl CommandExtension {
    pub fn from_definition(def: &ExtensionDefinition, executor: Arc<CommandExecutor>) -> Self {
        let spec = |command: &String| CommandSpec {
            command: command.clone(),
            working_dir: def.working_dir.clone(),
            timeout_secs: def.timeout_secs,
        };
        Self {
            name: def.name.clone(),
            enter: def.enter.as_ref().map(spec),
            exit: def.exit.as_ref().map(spec),
            executor,
        }
    }

    fn run_side(
        &self,
        side: Option<&CommandSpec>,
        context: &CallbackContext,
    ) -> Result<(), CallbackError> {
        match side {
            Some(spec) => self.executor.execute(spec, context),
            None => Ok(()),
        }
    }
}

impl ExtensionCallback for CommandExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_enter(&self, context: &CallbackContext) -> Result<(), CallbackError> {
        self.run_side(self.enter.as_ref(), context)
    }

    fn on_exit(&self, context: &CallbackContext) -> Result<(), CallbackError> {
        self.run_side(self.exit.as_ref(), context)
    }
}

/// The test body. Without a command the test phase is a no-op success.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    label: String,
    spec: Option<CommandSpec>,
    executor: Arc<CommandExecutor>,
}

impl CommandRunner {
    pub fn from_definition(def: &TestDefinition, executor: Arc<CommandExecutor>) -> Self {
        Self {
            label: def.label.clone(),
            spec: def.command.as_ref().map(|command| CommandSpec {
                command: command.clone(),
                working_dir: def.working_dir.clone(),
                timeout_secs: def.timeout_secs,
            }),
            executor,
        }
    }
}

impl Runner for CommandRunner {
    fn label(&self) -> &str {
        &self.label
    }

    fn run(&mut self, context: &CallbackContext) -> Result<(), CallbackError> {
        match &self.spec {
            Some(spec) => self.executor.execute(spec, context),
            None => Ok(()),
        }
    }
}
