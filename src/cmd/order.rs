//! Planned callback order: `lifecycle order`.

use anyhow::{Context, Result};
use lifecycle::plan::Plan;
use lifecycle::ui::render_order;
use std::path::Path;
use tokio::runtime::Handle;

pub fn cmd_order(plan_path: &Path) -> Result<()> {
    let plan = Plan::load(plan_path)?;
    let executor = plan.executor(Handle::current());
    let catalog = plan
        .catalog(&executor)
        .with_context(|| format!("Invalid class hierarchy in {}", plan_path.display()))?;

    for line in render_order(&catalog, plan.test_label()) {
        println!("{}", line);
    }
    Ok(())
}
