//! BootloaderConfigure: syslinux binaries, boot menus and the EFI image.
//!
//! Boot-menu templates live in `<theme>/livecd/`. `isolinux.main.cfg` and
//! `grub.main.cfg` are required; splash and theme files are optional.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::artifact::efi::{build_efi_image, EfiImageRequest};
use crate::distro::dispatch::{bootloader_binary_base, kernel_boot_parameters};
use crate::error::BuildError;
use crate::pipeline::collaborators::{render_file, TemplateRenderer};
use crate::pipeline::BuildContext;
use crate::process::CommandRunner;

/// (directory under the bootloader base, file name)
pub const SYSLINUX_FILES: &[(&str, &str)] = &[
    ("syslinux/modules/bios", "chain.c32"),
    ("ISOLINUX", "isohdpfx.bin"),
    ("ISOLINUX", "isolinux.bin"),
    ("syslinux/modules/bios", "ldlinux.c32"),
    ("syslinux/modules/bios", "libcom32.c32"),
    ("syslinux/modules/bios", "libutil.c32"),
    ("syslinux/modules/bios", "vesamenu.c32"),
];

pub const ISOLINUX_TEMPLATE: &str = "isolinux.main.cfg";
pub const GRUB_TEMPLATE: &str = "grub.main.cfg";

pub const LIVE_KERNEL: &str = "/live/vmlinuz";
pub const LIVE_INITRD: &str = "/live/initrd.img";

pub fn run(
    ctx: &BuildContext,
    runner: &dyn CommandRunner,
    renderer: &dyn TemplateRenderer,
) -> Result<()> {
    let isolinux = ctx.paths.iso_work.join("isolinux");
    let grub = ctx.paths.iso_work.join("boot/grub");
    for dir in [&isolinux, &grub] {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let base = bootloader_binary_base(&ctx.family, &ctx.settings);
    for (dir, name) in SYSLINUX_FILES {
        let source = base.join(dir).join(name);
        if source.is_file() {
            fs::copy(&source, isolinux.join(name))
                .with_context(|| format!("copying {}", source.display()))?;
        } else {
            tracing::warn!("syslinux binary missing: {}", source.display());
        }
    }

    let livecd = ctx.settings.theme_dir.join("livecd");
    copy_optional(&livecd.join("splash.png"), &isolinux.join("splash.png"))?;
    copy_optional(
        &livecd.join("isolinux.theme.cfg"),
        &isolinux.join("isolinux.theme.cfg"),
    )?;
    if !copy_optional(&livecd.join("theme.cfg"), &grub.join("theme.cfg"))? {
        tracing::warn!("no grub theme.cfg in {}", livecd.display());
    }

    let kernel_parameters = kernel_boot_parameters(
        &ctx.family,
        &ctx.volume_id,
        &ctx.settings.locale(),
        ctx.options.fullcrypt,
    );
    let values = [
        ("fullname", ctx.full_name()),
        ("initrdImg", LIVE_INITRD.to_string()),
        ("vmlinuz", LIVE_KERNEL.to_string()),
        ("kernel_parameters", kernel_parameters.clone()),
        ("kernel", ctx.kernel_version.clone().unwrap_or_default()),
    ];
    render_menu(renderer, &livecd, ISOLINUX_TEMPLATE, &isolinux.join("isolinux.cfg"), &values)?;
    render_menu(renderer, &livecd, GRUB_TEMPLATE, &grub.join("grub.cfg"), &values)?;
    tracing::info!("kernel parameters: {}", kernel_parameters);

    build_efi_image(
        runner,
        &EfiImageRequest {
            scratch: &ctx.paths.efi_scratch(),
            output: &ctx.paths.efi_image(),
            volume_id: &ctx.volume_id,
        },
    )?;
    Ok(())
}

fn render_menu(
    renderer: &dyn TemplateRenderer,
    livecd: &Path,
    template: &str,
    dest: &Path,
    values: &[(&str, String)],
) -> Result<()> {
    let source = livecd.join(template);
    if !source.is_file() {
        return Err(BuildError::configuration(format!(
            "boot menu template missing: {}",
            source.display()
        ))
        .into());
    }
    render_file(renderer, &source, dest, values)
}

fn copy_optional(src: &Path, dest: &Path) -> Result<bool> {
    if !src.is_file() {
        return Ok(false);
    }
    fs::copy(src, dest).with_context(|| format!("copying {}", src.display()))?;
    Ok(true)
}
