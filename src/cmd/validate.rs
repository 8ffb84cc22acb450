//! Plan validation: `lifecycle validate`.

use anyhow::{Context, Result};
use lifecycle::plan::Plan;
use lifecycle::ui::render_warnings;
use std::path::Path;
use tokio::runtime::Handle;

/// Print plan warnings and fail if the hierarchy itself is invalid.
pub fn cmd_validate(plan_path: &Path) -> Result<()> {
    let plan = Plan::load(plan_path)?;
    let executor = plan.executor(Handle::current());
    let catalog = plan
        .catalog(&executor)
        .with_context(|| format!("Invalid class hierarchy in {}", plan_path.display()))?;

    for line in render_warnings(&plan.config().validate()) {
        println!("{}", line);
    }
    println!(
        "{} levels, {} extensions, {} callbacks",
        catalog.depth(),
        catalog.extension_order().len(),
        plan.config().enabled_callback_count()
    );
    Ok(())
}
