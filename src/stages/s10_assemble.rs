//! Assemble: the hybrid ISO and its checksum.

use anyhow::Result;
use std::path::PathBuf;

use crate::artifact::iso::{build_iso, write_iso_checksum, xorriso_command, IsoRequest};
use crate::artifact::write_replay_script;
use crate::pipeline::BuildContext;
use crate::process::CommandRunner;

pub const REPLAY_SCRIPT: &str = "mkisofs.sh";

/// Returns the ISO path. In script-only runs the path is where the image
/// would have been written.
pub fn run(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<PathBuf> {
    let output = ctx.iso_output();
    let luks = ctx.paths.luks_image();
    let appended = if !ctx.options.fullcrypt {
        None
    } else if luks.is_file() {
        Some(luks.as_path())
    } else {
        tracing::warn!("fullcrypt requested but {} is missing", luks.display());
        None
    };

    let request = IsoRequest {
        iso_root: &ctx.paths.iso_work,
        output: &output,
        volume_id: &ctx.volume_id,
        appended_partition: appended,
        mode: ctx.output_mode(),
    };
    write_replay_script(
        &ctx.paths.work_dir.join(REPLAY_SCRIPT),
        &xorriso_command(&request),
    )?;

    if ctx.options.script_only {
        tracing::info!("script-only run, xorriso not started");
        return Ok(output);
    }

    build_iso(runner, &request)?;
    write_iso_checksum(&output)?;
    tracing::info!("ISO ready: {}", output.display());
    ctx.iso_path = Some(output.clone());
    Ok(output)
}
