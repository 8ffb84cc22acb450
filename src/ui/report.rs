//! Plain-text rendering of planned and executed lifecycles.
//!
//! Lines are indented by nesting depth: every entered extension and every
//! hierarchy level opens one more level of indentation.

use super::icons::{CHECK, CLOCK, CROSS, ENTER, EXIT, HOOK, TEST, WARNING};
use crate::callbacks::LifecyclePhase;
use crate::catalog::{HookCatalog, enter_label, exit_label};
use crate::outcome::{ExecutionOutcome, Failure};
use console::{Emoji, style};

const INDENT: &str = "  ";

fn icon(phase: LifecyclePhase) -> &'static Emoji<'static, 'static> {
    match phase {
        LifecyclePhase::ExtensionEnter => &ENTER,
        LifecyclePhase::ExtensionExit => &EXIT,
        LifecyclePhase::Setup | LifecyclePhase::Teardown => &HOOK,
        LifecyclePhase::Test => &TEST,
    }
}

fn line(depth: usize, phase: LifecyclePhase, label: &str, detail: Option<String>) -> String {
    let label = match phase {
        LifecyclePhase::Test => style(label).bold().to_string(),
        p if p.is_before() => style(label).cyan().to_string(),
        _ => style(label).yellow().to_string(),
    };
    let mut out = format!("{}{}{}", INDENT.repeat(depth), icon(phase), label);
    if let Some(detail) = detail {
        out.push_str(&format!(" {}", style(detail).dim()));
    }
    out
}

/// Render the sequence a fully successful run of `catalog` would follow.
pub fn render_order(catalog: &HookCatalog, test_label: &str) -> Vec<String> {
    let extensions = catalog.extension_order();
    let base = extensions.len();
    let mut lines = Vec::new();

    for (depth, slot) in extensions.iter().enumerate() {
        lines.push(line(
            depth,
            LifecyclePhase::ExtensionEnter,
            &enter_label(slot.name()),
            Some(format!("({})", slot.class_name)),
        ));
    }
    for level in catalog.levels() {
        for hook in level.setup_hooks() {
            lines.push(line(
                base + level.ordinal(),
                LifecyclePhase::Setup,
                hook.name(),
                Some(format!("({})", level.name())),
            ));
        }
    }
    lines.push(line(
        base + catalog.depth(),
        LifecyclePhase::Test,
        test_label,
        Some(format!("({})", catalog.leaf().name())),
    ));
    for level in catalog.levels().iter().rev() {
        for hook in level.teardown_hooks() {
            lines.push(line(
                base + level.ordinal(),
                LifecyclePhase::Teardown,
                hook.name(),
                Some(format!("({})", level.name())),
            ));
        }
    }
    for (depth, slot) in extensions.iter().enumerate().rev() {
        lines.push(line(
            depth,
            LifecyclePhase::ExtensionExit,
            &exit_label(slot.name()),
            Some(format!("({})", slot.class_name)),
        ));
    }
    lines
}

fn failure_line(failure: &Failure) -> String {
    let level = failure
        .level
        .map(|l| format!(" at level {}", l))
        .unwrap_or_default();
    format!(
        "{} {}{}: {}",
        style(failure.kind).red().bold(),
        style(&failure.callback).bold(),
        level,
        failure.error
    )
}

/// Render the recorded invocations followed by a status summary.
pub fn render_outcome(outcome: &ExecutionOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    let mut open_extensions = 0usize;
    let mut levels_set_up = 0usize;

    for inv in outcome.invocations() {
        let depth = match inv.phase {
            LifecyclePhase::ExtensionEnter => {
                let depth = open_extensions;
                if inv.succeeded {
                    open_extensions += 1;
                }
                depth
            }
            LifecyclePhase::ExtensionExit => {
                open_extensions = open_extensions.saturating_sub(1);
                open_extensions
            }
            LifecyclePhase::Setup => {
                let level = inv.level.unwrap_or(0);
                levels_set_up = levels_set_up.max(level + 1);
                open_extensions + level
            }
            LifecyclePhase::Teardown => open_extensions + inv.level.unwrap_or(0),
            LifecyclePhase::Test => open_extensions + levels_set_up,
        };
        let mark = if inv.succeeded {
            style("ok").green().to_string()
        } else {
            style("FAILED").red().bold().to_string()
        };
        lines.push(format!("{} {}", line(depth, inv.phase, &inv.label, None), mark));
    }

    lines.push(String::new());
    let elapsed = outcome.finished_at() - outcome.started_at();
    match outcome.primary_failure() {
        None => lines.push(format!(
            "{}{} {}",
            CHECK,
            style(outcome.class_name()).bold(),
            style("passed").green()
        )),
        Some(primary) => {
            lines.push(format!(
                "{}{} {}",
                CROSS,
                style(outcome.class_name()).bold(),
                style("failed").red()
            ));
            lines.push(format!("{}{}", INDENT, failure_line(primary)));
            for suppressed in outcome.suppressed() {
                lines.push(format!(
                    "{}{}{} {}",
                    INDENT,
                    WARNING,
                    style("suppressed").dim(),
                    failure_line(suppressed)
                ));
            }
        }
    }
    lines.push(format!(
        "{}{} ms {}",
        CLOCK,
        elapsed.num_milliseconds(),
        style(format!("(run {})", outcome.run_id())).dim()
    ));
    lines
}

/// Render validation warnings, or a success line when there are none.
pub fn render_warnings(warnings: &[String]) -> Vec<String> {
    if warnings.is_empty() {
        return vec![format!("{}{}", CHECK, style("Plan is valid").green())];
    }
    warnings
        .iter()
        .map(|w| format!("{}{}", WARNING, style(w).yellow()))
        .collect()
}
