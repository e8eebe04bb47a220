//! Squash: compile exclusions and compress the snapshot view.

use anyhow::Result;

use crate::artifact::squashfs::{build_squashfs, mksquashfs_command, SquashfsOptions};
use crate::artifact::write_replay_script;
use crate::exclusion::{self, ExclusionRequest};
use crate::pipeline::BuildContext;
use crate::process::CommandRunner;

pub const REPLAY_SCRIPT: &str = "mksquashfs.sh";

pub fn run(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let master_list = ctx.settings.exclude_list();
    let kept_home = (!ctx.options.keeps_accounts()).then_some(ctx.settings.live_user.as_str());
    let request = ExclusionRequest {
        family: &ctx.family,
        snapshot_source: &ctx.paths.snapshot_source,
        work_dir: &ctx.paths.work_dir,
        include_root_home: ctx.options.include_root_home,
        ship_home: ctx.options.ships_home(),
        kept_home,
        master_list: &master_list,
    };
    let exclusions = exclusion::compile(&request)?;

    let compression = ctx.options.compression(ctx.settings.compression);
    let options = SquashfsOptions {
        compression,
        master_list: Some(&master_list),
        exclusions: &exclusions,
        output: ctx.output_mode(),
    };
    let output = ctx.paths.squashfs();
    let command = mksquashfs_command(&ctx.paths.snapshot_source, &output, &options);
    write_replay_script(&ctx.paths.work_dir.join(REPLAY_SCRIPT), &command)?;

    if ctx.options.script_only {
        tracing::info!("script-only run, mksquashfs not started");
    } else {
        build_squashfs(runner, &ctx.paths.snapshot_source, &output, &options)?;
    }
    ctx.exclusions = exclusions;
    Ok(())
}
