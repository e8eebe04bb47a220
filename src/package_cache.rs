//! Package manager cache cleanup before a snapshot.

use anyhow::Result;

use crate::distro::dispatch::package_cache_cleanup_plan;
use crate::distro::Family;
use crate::process::CommandRunner;

/// Outcome of a cleanup run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub executed: usize,
    /// Command lines of tolerated steps that failed.
    pub tolerated_failures: Vec<String>,
}

/// Run the cleanup plan for `family`.
///
/// A step marked tolerant only logs a warning when it fails; any other
/// failure stops the plan and is returned.
pub fn clean_package_cache(family: &Family, runner: &dyn CommandRunner) -> Result<CleanupReport> {
    let plan = package_cache_cleanup_plan(family);
    let mut report = CleanupReport::default();
    if plan.is_empty() {
        return Ok(report);
    }

    tracing::info!("cleaning package cache for {}", family);
    for step in plan {
        let line = step.cmd.command_line();
        if step.tolerate_failure {
            let result = step.cmd.allow_fail().run_with(runner)?;
            if !result.success() {
                tracing::warn!("'{}' exited with {}, continuing", line, result.code);
                report.tolerated_failures.push(line);
            }
        } else {
            step.cmd.run_with(runner)?;
        }
        report.executed += 1;
    }
    Ok(report)
}
