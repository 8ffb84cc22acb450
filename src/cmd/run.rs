//! Class lifecycle execution: `lifecycle run`.

use anyhow::{Context, Result, bail};
use lifecycle::orchestrator::{FailedLevelTeardown, LifecycleOrchestrator};
use lifecycle::plan::Plan;
use lifecycle::ui::render_outcome;
use std::path::Path;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Exit code used when a second Ctrl-C aborts the process.
const ABORT_EXIT_CODE: i32 = 130;

/// First Ctrl-C cancels the remaining setup. A second one exits right away,
/// skipping any teardown still pending.
async fn watch_interrupts(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("Interrupted, cancelling remaining setup (Ctrl-C again to abort)");
    token.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        error!("Interrupted again, aborting without teardown");
        std::process::exit(ABORT_EXIT_CODE);
    }
}

/// Run the plan's class lifecycle. Ctrl-C cancels the remaining setup;
/// teardown of whatever was set up still runs.
pub async fn cmd_run(
    plan_path: &Path,
    json: bool,
    policy: Option<FailedLevelTeardown>,
) -> Result<()> {
    let plan = Plan::load(plan_path)?;
    let executor = plan.executor(Handle::current());

    let token = CancellationToken::new();
    let orchestrator =
        LifecycleOrchestrator::new(plan.orchestrator_config(policy).with_cancellation(token.clone()));
    let declarations = plan.declarations(&executor);
    let mut runner = plan.runner(&executor);

    let interrupt = tokio::spawn(watch_interrupts(token.clone()));

    // Command callbacks block on the runtime, so keep them off the workers
    let result =
        tokio::task::spawn_blocking(move || orchestrator.execute(declarations, &mut runner))
            .await
            .context("Lifecycle task panicked")?;
    interrupt.abort();

    let outcome =
        result.with_context(|| format!("Invalid class hierarchy in {}", plan_path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
        );
    } else {
        for line in render_outcome(&outcome) {
            println!("{}", line);
        }
    }

    if let Some(failure) = outcome.primary_failure() {
        bail!("{} failed: {}", outcome.class_name(), failure);
    }
    Ok(())
}
