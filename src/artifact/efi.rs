//! FAT EFI boot image.
//!
//! grub-mkimage builds a standalone `BOOTX64.EFI` with `/boot/grub` as its
//! prefix; mtools places it in a small FAT image next to a stub grub.cfg
//! that finds the ISO by volume label and chains to its real grub.cfg.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::process::{Cmd, CommandRunner};

/// GRUB modules built into the EFI binary.
pub const GRUB_EFI_MODULES: &[&str] = &[
    "part_gpt", "part_msdos", "fat", "iso9660", "udf", "ext2", "btrfs", "normal", "boot",
    "linux", "configfile", "loopback", "chain", "search", "search_label", "search_fs_uuid",
    "search_fs_file", "ls", "test", "echo", "efi_gop", "efi_uga", "all_video", "gfxterm",
    "gfxterm_background", "gfxmenu", "png", "font",
];

const MIB: u64 = 1024 * 1024;
const MIN_IMAGE_MB: u64 = 4;

#[derive(Debug, Clone)]
pub struct EfiImageRequest<'a> {
    /// Scratch directory for the EFI binary and stub config.
    pub scratch: &'a Path,
    /// Final image, normally `<iso>/EFI/efiboot.img`.
    pub output: &'a Path,
    pub volume_id: &'a str,
}

/// Build the EFI boot image. Returns its path.
pub fn build_efi_image(runner: &dyn CommandRunner, request: &EfiImageRequest) -> Result<PathBuf> {
    fs::create_dir_all(request.scratch)
        .with_context(|| format!("creating {}", request.scratch.display()))?;
    if let Some(parent) = request.output.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let efi_binary = request.scratch.join("bootx64.efi");
    Cmd::new("grub-mkimage")
        .arg("-o")
        .arg_path(&efi_binary)
        .args(["-O", "x86_64-efi", "-p", "/boot/grub"])
        .args(GRUB_EFI_MODULES)
        .error_msg("grub-mkimage failed. Install grub EFI modules.")
        .run_with(runner)?;

    let binary_len = fs::metadata(&efi_binary).map(|m| m.len()).unwrap_or(0);
    let size_mb = image_size_mb(binary_len);
    create_sparse_file(request.output, size_mb * MIB)?;

    Cmd::new("mformat")
        .arg("-i")
        .arg_path(request.output)
        .args(["-t", &size_mb.to_string(), "-h", "64", "-s", "32", "::"])
        .error_msg("mformat failed. Install mtools.")
        .run_with(runner)?;

    for dir in ["::EFI", "::EFI/BOOT", "::boot", "::boot/grub"] {
        mtools_mkdir(runner, request.output, dir)?;
    }
    mtools_copy(runner, request.output, &efi_binary, "::EFI/BOOT/BOOTX64.EFI")?;

    let stub = request.scratch.join("grub.cfg");
    fs::write(&stub, stub_grub_cfg(request.volume_id))
        .with_context(|| format!("writing {}", stub.display()))?;
    mtools_copy(runner, request.output, &stub, "::boot/grub/grub.cfg")?;

    tracing::info!("EFI image: {} ({} MiB)", request.output.display(), size_mb);
    Ok(request.output.to_path_buf())
}

/// Image size for an EFI binary of `binary_len` bytes, with FAT overhead.
pub fn image_size_mb(binary_len: u64) -> u64 {
    (binary_len.div_ceil(MIB) + 2).max(MIN_IMAGE_MB)
}

pub fn stub_grub_cfg(volume_id: &str) -> String {
    format!(
        "search --no-floppy --set=root --label {volume_id}\n\
         set prefix=($root)/boot/grub\n\
         configfile ($root)/boot/grub/grub.cfg\n"
    )
}

fn create_sparse_file(path: &Path, len: u64) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.set_len(len)
        .with_context(|| format!("sizing {} to {} bytes", path.display(), len))
}

/// Create a directory in a FAT image using mmd.
fn mtools_mkdir(runner: &dyn CommandRunner, image: &Path, dir: &str) -> Result<()> {
    Cmd::new("mmd")
        .arg("-i")
        .arg_path(image)
        .arg(dir)
        .error_msg(format!("mmd failed to create {dir}"))
        .run_with(runner)?;
    Ok(())
}

/// Copy a file into a FAT image using mcopy.
fn mtools_copy(runner: &dyn CommandRunner, image: &Path, src: &Path, dest: &str) -> Result<()> {
    Cmd::new("mcopy")
        .arg("-i")
        .arg_path(image)
        .arg_path(src)
        .arg(dest)
        .error_msg(format!("mcopy failed: {} -> {}", src.display(), dest))
        .run_with(runner)?;
    Ok(())
}
