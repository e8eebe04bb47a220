//! BootloaderInject: copy BIOS and UEFI bootloader files into the ISO tree.

use anyhow::Result;

use crate::artifact::filesystem::rsync_overlay;
use crate::distro::dispatch::bootloader_binary_base;
use crate::pipeline::BuildContext;
use crate::process::CommandRunner;

/// (source under the bootloader base, destination under the ISO tree)
pub const INJECT_TARGETS: &[(&str, &str)] = &[
    ("ISOLINUX", "isolinux"),
    ("syslinux/modules/bios", "isolinux/modules"),
    ("grub", "boot/grub"),
];

/// Returns how many targets were copied. Missing sources only warn.
pub fn run(ctx: &BuildContext, runner: &dyn CommandRunner) -> Result<usize> {
    let base = bootloader_binary_base(&ctx.family, &ctx.settings);
    tracing::info!("bootloader base for {}: {}", ctx.family, base.display());

    let mut injected = 0;
    for (src, dest) in INJECT_TARGETS {
        let source = base.join(src);
        if !source.is_dir() {
            tracing::warn!("{} missing, boot may fail", source.display());
            continue;
        }
        rsync_overlay(runner, &source, &ctx.paths.iso_work.join(dest))?;
        injected += 1;
    }
    Ok(injected)
}
