use anyhow::Result;

use super::InitrdRequest;
use crate::process::{Cmd, CommandRunner};

pub(super) fn generate(request: &InitrdRequest<'_>, runner: &dyn CommandRunner) -> Result<()> {
    let conf = request.settings.install_prefix.join("mkinitfs/live.conf");
    Cmd::new("mkinitfs")
        .arg("-c")
        .arg_path(&conf)
        .arg("-o")
        .arg_path(&request.destination())
        .arg(request.kernel_version)
        .log_to(&request.log_file("mkinitfs"))
        .error_msg("mkinitfs failed")
        .run_with(runner)?;
    Ok(())
}
