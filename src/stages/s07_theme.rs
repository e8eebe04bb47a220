//! Theme: overlay branding assets onto the ISO tree.

use anyhow::Result;

use crate::artifact::filesystem::rsync_overlay;
use crate::pipeline::BuildContext;
use crate::process::CommandRunner;

/// Returns whether a theme was applied. A missing theme only warns.
pub fn run(ctx: &BuildContext, runner: &dyn CommandRunner) -> Result<bool> {
    let theme = &ctx.settings.theme_dir;
    if !theme.is_dir() {
        tracing::warn!(
            "theme {} not found, the ISO keeps the bare bootloader files",
            theme.display()
        );
        return Ok(false);
    }
    rsync_overlay(runner, theme, &ctx.paths.iso_work)?;
    tracing::info!("theme applied from {}", theme.display());
    Ok(true)
}
