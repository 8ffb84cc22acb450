use crate::callbacks::{CallbackContext, LifecyclePhase, Runner};
use crate::catalog::{ClassDeclaration, ExtensionSlot, HookCatalog, enter_label, exit_label};
use crate::errors::{CallbackError, DiscoveryError};
use crate::orchestrator::state::{LifecycleState, StateMachine};
use crate::outcome::{ExecutionOutcome, FailureKind, Recorder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Whether the teardown hooks of the level whose setup failed still run.
///
/// Levels whose setup completed always get their teardown; levels never
/// reached never do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedLevelTeardown {
    /// Only levels whose setup hooks all completed are torn down
    #[default]
    Skip,
    /// The failing level is torn down as well
    Run,
}

impl FailedLevelTeardown {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailedLevelTeardown::Skip => "skip",
            FailedLevelTeardown::Run => "run",
        }
    }
}

impl std::fmt::Display for FailedLevelTeardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FailedLevelTeardown {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(FailedLevelTeardown::Skip),
            "run" => Ok(FailedLevelTeardown::Run),
            _ => anyhow::bail!(
                "Invalid failed-level teardown policy '{}'. Valid values: skip, run",
                s
            ),
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub failed_level_teardown: FailedLevelTeardown,
    /// Checked before every before-phase callback and before the runner
    pub cancellation: Option<CancellationToken>,
}

impl OrchestratorConfig {
    pub fn with_failed_level_teardown(mut self, policy: FailedLevelTeardown) -> Self {
        self.failed_level_teardown = policy;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// How far the setup pass got.
#[derive(Debug, Default)]
struct SetupProgress {
    /// Number of levels (root-first) whose setup hooks all completed
    completed_levels: usize,
    /// Ordinal of the level whose setup failed or was cancelled
    failed_level: Option<usize>,
    /// Whether any setup hook of `failed_level` was invoked
    failed_level_started: bool,
}

impl SetupProgress {
    /// Number of levels, counted from the root, whose teardown must run.
    fn teardown_depth(&self, policy: FailedLevelTeardown) -> usize {
        match (policy, self.failed_level) {
            (FailedLevelTeardown::Run, Some(level)) if self.failed_level_started => level + 1,
            _ => self.completed_levels,
        }
    }
}

/// Drives the before/after sequence of one class execution.
///
/// Extensions are entered in cumulative order, setup hooks run root-first,
/// the runner runs once, teardown hooks run leaf-first, and extensions exit
/// in reverse of the enter order. Teardown and exit cover exactly what was
/// entered, and every teardown/exit is attempted even when others fail.
#[derive(Debug, Default)]
pub struct LifecycleOrchestrator {
    config: OrchestratorConfig,
}

impl LifecycleOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Build the catalog from discovery output and run it.
    pub fn execute(
        &self,
        declarations: Vec<ClassDeclaration>,
        runner: &mut dyn Runner,
    ) -> Result<ExecutionOutcome, DiscoveryError> {
        let catalog = HookCatalog::build(declarations)?;
        Ok(self.run(&catalog, runner))
    }

    /// Run the full lifecycle of the catalog's leaf class.
    pub fn run(&self, catalog: &HookCatalog, runner: &mut dyn Runner) -> ExecutionOutcome {
        let class_name = catalog.leaf().name();
        let mut recorder = Recorder::new(class_name);
        let mut machine = StateMachine::new();

        info!(
            class = %class_name,
            levels = catalog.depth(),
            policy = %self.config.failed_level_teardown,
            "Starting class lifecycle"
        );

        let extensions = catalog.extension_order();
        self.transition(&mut machine, LifecycleState::EnteringExtensions);
        let entered = self.enter_extensions(class_name, &extensions, &mut recorder);

        let mut progress = SetupProgress::default();
        let mut before_ok = entered == extensions.len();

        if before_ok {
            self.transition(&mut machine, LifecycleState::RunningSetupHooks);
            progress = self.run_setup_hooks(catalog, &mut recorder);
            before_ok = progress.failed_level.is_none();
        }

        if before_ok {
            let label = runner.label().to_string();
            let context = CallbackContext::new(class_name, None, &label, LifecyclePhase::Test);
            if let Some(err) = self.cancellation(&label) {
                recorder.inject(&context, FailureKind::Setup, err);
                before_ok = false;
            } else {
                self.transition(&mut machine, LifecycleState::RunningTest);
                recorder.invoke(&context, label, || runner.run(&context));
            }
        }

        if !before_ok {
            self.transition(&mut machine, LifecycleState::Failed);
        }

        self.transition(&mut machine, LifecycleState::RunningTeardownHooks);
        let depth = progress.teardown_depth(self.config.failed_level_teardown);
        self.run_teardown_hooks(catalog, depth, &mut recorder);

        self.transition(&mut machine, LifecycleState::ExitingExtensions);
        self.exit_extensions(class_name, &extensions[..entered], &mut recorder);

        let succeeded = !recorder.has_failures();
        match machine.finish(succeeded) {
            Ok(terminal) => info!(class = %class_name, state = %terminal, "Finished class lifecycle"),
            Err(err) => error!(class = %class_name, %err, "Lifecycle state machine out of step"),
        }

        recorder.finish(machine.into_trail())
    }

    /// Invoke `on_enter` in cumulative order. Returns how many entered.
    fn enter_extensions(
        &self,
        class_name: &str,
        extensions: &[ExtensionSlot<'_>],
        recorder: &mut Recorder,
    ) -> usize {
        for (index, slot) in extensions.iter().enumerate() {
            let context = CallbackContext::new(
                class_name,
                Some((slot.level, slot.class_name)),
                slot.name(),
                LifecyclePhase::ExtensionEnter,
            );
            if let Some(err) = self.cancellation(slot.name()) {
                recorder.inject(&context, FailureKind::Setup, err);
                return index;
            }
            let label = enter_label(slot.name());
            if !recorder.invoke(&context, label, || slot.extension.on_enter(&context)) {
                return index;
            }
        }
        extensions.len()
    }

    /// Run setup hooks root-first, stopping at the first failure.
    fn run_setup_hooks(&self, catalog: &HookCatalog, recorder: &mut Recorder) -> SetupProgress {
        let class_name = catalog.leaf().name();
        let mut progress = SetupProgress::default();

        for level in catalog.levels() {
            for (index, hook) in level.setup_hooks().iter().enumerate() {
                let context = CallbackContext::new(
                    class_name,
                    Some((level.ordinal(), level.name())),
                    hook.name(),
                    LifecyclePhase::Setup,
                );
                if let Some(err) = self.cancellation(hook.name()) {
                    recorder.inject(&context, FailureKind::Setup, err);
                    progress.failed_level = Some(level.ordinal());
                    progress.failed_level_started = index > 0;
                    return progress;
                }
                if !recorder.invoke(&context, hook.name().to_string(), || hook.invoke(&context)) {
                    progress.failed_level = Some(level.ordinal());
                    progress.failed_level_started = true;
                    return progress;
                }
            }
            progress.completed_levels += 1;
        }

        progress
    }

    /// Run teardown hooks of the first `depth` levels, leaf-first. Hooks
    /// within a level keep declaration order.
    fn run_teardown_hooks(&self, catalog: &HookCatalog, depth: usize, recorder: &mut Recorder) {
        let class_name = catalog.leaf().name();
        for level in catalog.levels()[..depth].iter().rev() {
            for hook in level.teardown_hooks() {
                let context = CallbackContext::new(
                    class_name,
                    Some((level.ordinal(), level.name())),
                    hook.name(),
                    LifecyclePhase::Teardown,
                );
                recorder.invoke(&context, hook.name().to_string(), || hook.invoke(&context));
            }
        }
    }

    /// Invoke `on_exit` on the entered extensions, in reverse.
    fn exit_extensions(
        &self,
        class_name: &str,
        entered: &[ExtensionSlot<'_>],
        recorder: &mut Recorder,
    ) {
        for slot in entered.iter().rev() {
            let context = CallbackContext::new(
                class_name,
                Some((slot.level, slot.class_name)),
                slot.name(),
                LifecyclePhase::ExtensionExit,
            );
            let label = exit_label(slot.name());
            recorder.invoke(&context, label, || slot.extension.on_exit(&context));
        }
    }

    fn cancellation(&self, next_callback: &str) -> Option<CallbackError> {
        let token = self.config.cancellation.as_ref()?;
        if !token.is_cancelled() {
            return None;
        }
        warn!(callback = %next_callback, "Cancellation observed, unwinding");
        Some(CallbackError::Cancelled {
            callback: next_callback.to_string(),
        })
    }

    fn transition(&self, machine: &mut StateMachine, next: LifecycleState) {
        if let Err(err) = machine.advance(next) {
            error!(%err, "Lifecycle state machine out of step");
            debug_assert!(false, "{err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{ExtensionCallback, HookMethod, extension, hook, runner};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn logged_hook(log: &Log, name: &str) -> impl HookMethod + 'static {
        let log = Arc::clone(log);
        let label = name.to_string();
        hook(name, move |_| {
            log.lock().unwrap().push(label.clone());
            Ok(())
        })
    }

    fn failing_hook(log: &Log, name: &str) -> impl HookMethod + 'static {
        let log = Arc::clone(log);
        let label = name.to_string();
        hook(name, move |_| {
            log.lock().unwrap().push(label.clone());
            Err(CallbackError::failed(format!("{label} failed")))
        })
    }

    fn logged_ext(log: &Log, name: &str) -> impl ExtensionCallback + 'static {
        let enter_log = Arc::clone(log);
        let exit_log = Arc::clone(log);
        let enter = enter_label(name);
        let exit = exit_label(name);
        extension(
            name,
            move |_| {
                enter_log.lock().unwrap().push(enter.clone());
                Ok(())
            },
            move |_| {
                exit_log.lock().unwrap().push(exit.clone());
                Ok(())
            },
        )
    }

    /// Root/Mid/Leaf with s{n}/t{n} and extensions X (root), Y (mid).
    /// `fail_setup` names a setup hook that raises.
    fn three_levels(log: &Log, fail_setup: Option<&str>) -> HookCatalog {
        let setup = |name: &str| -> Box<dyn HookMethod> {
            if fail_setup == Some(name) {
                Box::new(failing_hook(log, name))
            } else {
                Box::new(logged_hook(log, name))
            }
        };
        HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_boxed_setup(setup("s0"))
                .with_teardown(logged_hook(log, "t0"))
                .with_extension(logged_ext(log, "X")),
            ClassDeclaration::new("Mid")
                .extends("Root")
                .with_boxed_setup(setup("s1"))
                .with_teardown(logged_hook(log, "t1"))
                .with_extension(logged_ext(log, "Y")),
            ClassDeclaration::new("Leaf")
                .extends("Mid")
                .with_boxed_setup(setup("s2"))
                .with_teardown(logged_hook(log, "t2")),
        ])
        .unwrap()
    }

    fn test_runner(log: &Log) -> impl Runner + 'static {
        let log = Arc::clone(log);
        runner("<test>", move |_| {
            log.lock().unwrap().push("<test>".into());
            Ok(())
        })
    }

    #[test]
    fn test_three_level_order() {
        let log = new_log();
        let catalog = three_levels(&log, None);
        let outcome = LifecycleOrchestrator::default().run(&catalog, &mut test_runner(&log));

        let expected = vec![
            "X.enter", "Y.enter", "s0", "s1", "s2", "<test>", "t2", "t1", "t0", "Y.exit", "X.exit",
        ];
        assert!(outcome.is_success());
        assert_eq!(outcome.labels(), expected);
        assert_eq!(*log.lock().unwrap(), expected);
        assert_eq!(outcome.labels(), catalog.default_planned_sequence());
        assert_eq!(outcome.states().last(), Some(&LifecycleState::Done));
    }

    #[test]
    fn test_setup_failure_skips_failing_level_teardown_by_default() {
        let log = new_log();
        let catalog = three_levels(&log, Some("s1"));
        let outcome = LifecycleOrchestrator::default().run(&catalog, &mut test_runner(&log));

        assert_eq!(
            outcome.labels(),
            vec!["X.enter", "Y.enter", "s0", "s1", "t0", "Y.exit", "X.exit"]
        );
        assert_eq!(outcome.failed_labels(), vec!["s1"]);
        assert!(!outcome.test_executed());

        let primary = outcome.primary_failure().unwrap();
        assert_eq!(primary.kind, FailureKind::Setup);
        assert_eq!(primary.callback, "s1");
        assert_eq!(primary.level, Some(1));
        assert!(outcome.suppressed().is_empty());
        assert!(outcome.states().contains(&LifecycleState::Failed));
        assert_eq!(outcome.states().last(), Some(&LifecycleState::Failed));
    }

    #[test]
    fn test_setup_failure_runs_failing_level_teardown_when_configured() {
        let log = new_log();
        let catalog = three_levels(&log, Some("s1"));
        let orchestrator = LifecycleOrchestrator::new(
            OrchestratorConfig::default().with_failed_level_teardown(FailedLevelTeardown::Run),
        );
        let outcome = orchestrator.run(&catalog, &mut test_runner(&log));

        assert_eq!(
            outcome.labels(),
            vec!["X.enter", "Y.enter", "s0", "s1", "t1", "t0", "Y.exit", "X.exit"]
        );
    }

    #[test]
    fn test_root_setup_failure_unwinds_only_extensions() {
        let log = new_log();
        let catalog = three_levels(&log, Some("s0"));
        let outcome = LifecycleOrchestrator::default().run(&catalog, &mut test_runner(&log));

        assert_eq!(
            outcome.labels(),
            vec!["X.enter", "Y.enter", "s0", "Y.exit", "X.exit"]
        );
    }

    #[test]
    fn test_extension_enter_failure_exits_only_entered_prefix() {
        let log = new_log();
        let exit_log = Arc::clone(&log);
        let broken = extension(
            "Y",
            |_| Err(CallbackError::failed("Y cannot enter")),
            move |_| {
                exit_log.lock().unwrap().push("Y.exit".into());
                Ok(())
            },
        );
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_setup(logged_hook(&log, "s0"))
                .with_teardown(logged_hook(&log, "t0"))
                .with_extension(logged_ext(&log, "X"))
                .with_extension(broken)
                .with_extension(logged_ext(&log, "Z")),
        ])
        .unwrap();

        let outcome = LifecycleOrchestrator::default().run(&catalog, &mut test_runner(&log));

        assert_eq!(outcome.labels(), vec!["X.enter", "Y.enter", "X.exit"]);
        assert_eq!(outcome.failed_labels(), vec!["Y.enter"]);
        assert_eq!(outcome.primary_failure().unwrap().callback, "Y");
        assert_eq!(
            outcome.states(),
            &[
                LifecycleState::Idle,
                LifecycleState::EnteringExtensions,
                LifecycleState::Failed,
                LifecycleState::RunningTeardownHooks,
                LifecycleState::ExitingExtensions,
                LifecycleState::Failed,
            ]
        );
    }

    #[test]
    fn test_runner_failure_still_tears_down_everything() {
        let log = new_log();
        let catalog = three_levels(&log, None);
        let mut failing = runner("<test>", |_| Err(CallbackError::failed("assertion failed")));
        let outcome = LifecycleOrchestrator::default().run(&catalog, &mut failing);

        assert_eq!(outcome.labels(), catalog.default_planned_sequence());
        let primary = outcome.primary_failure().unwrap();
        assert_eq!(primary.kind, FailureKind::Test);
        assert_eq!(primary.level, None);
        assert_eq!(outcome.states().last(), Some(&LifecycleState::Failed));
    }

    #[test]
    fn test_teardown_failures_are_collected_not_aborting() {
        let log = new_log();
        let exit_log = Arc::clone(&log);
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_setup(logged_hook(&log, "s0"))
                .with_teardown(failing_hook(&log, "t0a"))
                .with_teardown(logged_hook(&log, "t0b"))
                .with_extension(extension(
                    "X",
                    |_| Ok(()),
                    move |_| {
                        exit_log.lock().unwrap().push("X.exit".into());
                        Err(CallbackError::failed("X exit failed"))
                    },
                )),
            ClassDeclaration::new("Leaf")
                .extends("Root")
                .with_teardown(failing_hook(&log, "t1")),
        ])
        .unwrap();

        let outcome = LifecycleOrchestrator::default().run(&catalog, &mut test_runner(&log));

        assert_eq!(
            outcome.labels(),
            vec!["X.enter", "s0", "<test>", "t1", "t0a", "t0b", "X.exit"]
        );
        let primary = outcome.primary_failure().unwrap();
        assert_eq!(primary.callback, "t1");
        assert_eq!(primary.kind, FailureKind::Teardown);
        let suppressed: Vec<&str> = outcome
            .suppressed()
            .iter()
            .map(|f| f.callback.as_str())
            .collect();
        assert_eq!(suppressed, vec!["t0a", "X"]);
    }

    #[test]
    fn test_setup_failure_then_teardown_failure_keeps_setup_primary() {
        let log = new_log();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_setup(logged_hook(&log, "s0"))
                .with_teardown(failing_hook(&log, "t0")),
            ClassDeclaration::new("Leaf")
                .extends("Root")
                .with_setup(failing_hook(&log, "s1")),
        ])
        .unwrap();

        let outcome = LifecycleOrchestrator::default().run(&catalog, &mut test_runner(&log));

        assert_eq!(outcome.labels(), vec!["s0", "s1", "t0"]);
        assert_eq!(outcome.primary_failure().unwrap().callback, "s1");
        assert_eq!(outcome.suppressed()[0].callback, "t0");
    }

    #[test]
    fn test_single_class_without_extensions() {
        let log = new_log();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Only")
                .with_setup(logged_hook(&log, "s0"))
                .with_teardown(logged_hook(&log, "t0")),
        ])
        .unwrap();

        let outcome = LifecycleOrchestrator::default().run(&catalog, &mut test_runner(&log));
        assert_eq!(outcome.labels(), vec!["s0", "<test>", "t0"]);
        assert!(outcome.entered_extensions().is_empty());
    }

    #[test]
    fn test_teardown_within_level_keeps_declaration_order() {
        let log = new_log();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_setup(logged_hook(&log, "s0a"))
                .with_setup(logged_hook(&log, "s0b"))
                .with_teardown(logged_hook(&log, "t0a"))
                .with_teardown(logged_hook(&log, "t0b")),
            ClassDeclaration::new("Leaf")
                .extends("Root")
                .with_setup(logged_hook(&log, "s1a"))
                .with_setup(logged_hook(&log, "s1b"))
                .with_teardown(logged_hook(&log, "t1a"))
                .with_teardown(logged_hook(&log, "t1b")),
        ])
        .unwrap();

        let outcome = LifecycleOrchestrator::default().run(&catalog, &mut test_runner(&log));
        assert_eq!(
            outcome.labels(),
            vec!["s0a", "s0b", "s1a", "s1b", "<test>", "t1a", "t1b", "t0a", "t0b"]
        );
    }

    #[test]
    fn test_cancellation_before_setup_unwinds_entered_extensions() {
        let log = new_log();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_extension(extension(
                    "X",
                    move |_| {
                        cancel.cancel();
                        Ok(())
                    },
                    |_| Ok(()),
                ))
                .with_setup(logged_hook(&log, "s0"))
                .with_teardown(logged_hook(&log, "t0")),
        ])
        .unwrap();

        let orchestrator =
            LifecycleOrchestrator::new(OrchestratorConfig::default().with_cancellation(token));
        let outcome = orchestrator.run(&catalog, &mut test_runner(&log));

        assert_eq!(outcome.labels(), vec!["X.enter", "X.exit"]);
        let primary = outcome.primary_failure().unwrap();
        assert!(primary.error.is_cancellation());
        assert_eq!(primary.callback, "s0");
        assert_eq!(primary.kind, FailureKind::Setup);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancellation_before_level_setup_never_tears_that_level_down() {
        let log = new_log();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_setup(hook("s0", move |_| {
                    cancel.cancel();
                    Ok(())
                }))
                .with_teardown(logged_hook(&log, "t0")),
            ClassDeclaration::new("Leaf")
                .extends("Root")
                .with_setup(logged_hook(&log, "s1"))
                .with_teardown(logged_hook(&log, "t1")),
        ])
        .unwrap();

        let config = OrchestratorConfig::default()
            .with_failed_level_teardown(FailedLevelTeardown::Run)
            .with_cancellation(token);
        let outcome = LifecycleOrchestrator::new(config).run(&catalog, &mut test_runner(&log));

        assert_eq!(outcome.labels(), vec!["s0", "t0"]);
        let primary = outcome.primary_failure().unwrap();
        assert!(primary.error.is_cancellation());
        assert_eq!(primary.callback, "s1");
        assert_eq!(primary.level, Some(1));
    }

    #[test]
    fn test_cancellation_before_root_setup_runs_no_teardown() {
        let log = new_log();
        let token = CancellationToken::new();
        token.cancel();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_setup(logged_hook(&log, "s0"))
                .with_teardown(logged_hook(&log, "t0")),
        ])
        .unwrap();

        let config = OrchestratorConfig::default()
            .with_failed_level_teardown(FailedLevelTeardown::Run)
            .with_cancellation(token);
        let outcome = LifecycleOrchestrator::new(config).run(&catalog, &mut test_runner(&log));

        assert!(outcome.labels().is_empty());
        assert_eq!(outcome.primary_failure().unwrap().callback, "s0");
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancellation_mid_level_tears_down_failing_level_when_configured() {
        let log = new_log();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_setup(hook("s0a", move |_| {
                    cancel.cancel();
                    Ok(())
                }))
                .with_setup(logged_hook(&log, "s0b"))
                .with_teardown(logged_hook(&log, "t0")),
        ])
        .unwrap();

        let config = OrchestratorConfig::default()
            .with_failed_level_teardown(FailedLevelTeardown::Run)
            .with_cancellation(token);
        let outcome = LifecycleOrchestrator::new(config).run(&catalog, &mut test_runner(&log));

        assert_eq!(outcome.labels(), vec!["s0a", "t0"]);
        assert_eq!(outcome.primary_failure().unwrap().callback, "s0b");
    }

    #[test]
    fn test_cancelled_before_run_enters_nothing() {
        let log = new_log();
        let token = CancellationToken::new();
        token.cancel();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_extension(logged_ext(&log, "X"))
                .with_extension(logged_ext(&log, "Z"))
                .with_setup(logged_hook(&log, "s0"))
                .with_teardown(logged_hook(&log, "t0")),
        ])
        .unwrap();

        let orchestrator =
            LifecycleOrchestrator::new(OrchestratorConfig::default().with_cancellation(token));
        let outcome = orchestrator.run(&catalog, &mut test_runner(&log));

        assert!(outcome.labels().is_empty());
        assert!(outcome.exited_extensions().is_empty());
        let primary = outcome.primary_failure().unwrap();
        assert!(primary.error.is_cancellation());
        assert_eq!(primary.callback, "X");
        assert_eq!(primary.phase, LifecyclePhase::ExtensionEnter);
        assert_eq!(primary.kind, FailureKind::Setup);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancellation_between_extension_enters() {
        let log = new_log();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_extension(extension(
                    "X",
                    move |_| {
                        cancel.cancel();
                        Ok(())
                    },
                    |_| Ok(()),
                ))
                .with_extension(logged_ext(&log, "Z"))
                .with_setup(logged_hook(&log, "s0"))
                .with_teardown(logged_hook(&log, "t0")),
        ])
        .unwrap();

        let orchestrator =
            LifecycleOrchestrator::new(OrchestratorConfig::default().with_cancellation(token));
        let outcome = orchestrator.run(&catalog, &mut test_runner(&log));

        assert_eq!(outcome.labels(), vec!["X.enter", "X.exit"]);
        let primary = outcome.primary_failure().unwrap();
        assert!(primary.error.is_cancellation());
        assert_eq!(primary.callback, "Z");
        assert!(outcome.suppressed().is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancellation_after_setup_skips_runner_but_tears_down() {
        let log = new_log();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_setup(hook("s0", move |_| {
                    cancel.cancel();
                    Ok(())
                }))
                .with_teardown(logged_hook(&log, "t0")),
        ])
        .unwrap();

        let orchestrator =
            LifecycleOrchestrator::new(OrchestratorConfig::default().with_cancellation(token));
        let outcome = orchestrator.run(&catalog, &mut test_runner(&log));

        assert_eq!(outcome.labels(), vec!["s0", "t0"]);
        assert!(!outcome.test_executed());
        assert_eq!(outcome.primary_failure().unwrap().callback, "<test>");
        assert_eq!(outcome.primary_failure().unwrap().kind, FailureKind::Setup);
    }

    #[test]
    fn test_cancellation_does_not_skip_teardown() {
        let log = new_log();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let catalog = HookCatalog::build(vec![
            ClassDeclaration::new("Root")
                .with_setup(logged_hook(&log, "s0"))
                .with_teardown(logged_hook(&log, "t0")),
        ])
        .unwrap();
        let mut body = runner("<test>", move |_| {
            cancel.cancel();
            Ok(())
        });

        let orchestrator =
            LifecycleOrchestrator::new(OrchestratorConfig::default().with_cancellation(token));
        let outcome = orchestrator.run(&catalog, &mut body);

        assert!(outcome.is_success());
        assert_eq!(outcome.labels(), vec!["s0", "<test>", "t0"]);
    }

    #[test]
    fn test_execute_rejects_malformed_hierarchy_before_any_callback() {
        let log = new_log();
        let declarations = vec![
            ClassDeclaration::new("A").with_setup(logged_hook(&log, "s0")),
            ClassDeclaration::new("A").extends("A"),
        ];
        let err = LifecycleOrchestrator::default()
            .execute(declarations, &mut test_runner(&log))
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::DuplicateLevel { .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_enter_exit_symmetry_across_shapes() {
        for depth in 1..=4usize {
            for per_level in 0..=3usize {
                let log = new_log();
                let declarations: Vec<ClassDeclaration> = (0..depth)
                    .map(|level| {
                        let mut decl = ClassDeclaration::new(format!("C{level}"))
                            .with_setup(logged_hook(&log, &format!("s{level}")))
                            .with_teardown(logged_hook(&log, &format!("t{level}")));
                        if level > 0 {
                            decl = decl.extends(format!("C{}", level - 1));
                        }
                        for e in 0..per_level {
                            decl = decl.with_extension(logged_ext(&log, &format!("E{level}_{e}")));
                        }
                        decl
                    })
                    .collect();

                let outcome = LifecycleOrchestrator::default()
                    .execute(declarations, &mut test_runner(&log))
                    .unwrap();
                assert!(outcome.is_success());

                let mut exits = outcome.exited_extensions();
                exits.reverse();
                assert_eq!(outcome.entered_extensions(), exits);
                assert_eq!(outcome.entered_extensions().len(), depth * per_level);

                let setups: Vec<String> = (0..depth).map(|l| format!("s{l}")).collect();
                let teardowns: Vec<String> = (0..depth).rev().map(|l| format!("t{l}")).collect();
                assert_eq!(outcome.labels_in(LifecyclePhase::Setup), setups);
                assert_eq!(outcome.labels_in(LifecyclePhase::Teardown), teardowns);
            }
        }
    }

    #[test]
    fn test_failed_level_teardown_parse() {
        assert_eq!(
            "run".parse::<FailedLevelTeardown>().unwrap(),
            FailedLevelTeardown::Run
        );
        assert_eq!(
            "SKIP".parse::<FailedLevelTeardown>().unwrap(),
            FailedLevelTeardown::Skip
        );
        assert!("maybe".parse::<FailedLevelTeardown>().is_err());
        assert_eq!(FailedLevelTeardown::default(), FailedLevelTeardown::Skip);
    }
}
