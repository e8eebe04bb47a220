//! Wrappers around the image-building tools.
//!
//! - [`filesystem`] - directory copies, rsync overlays, ownership
//! - [`squashfs`] - the compressed live root (mksquashfs)
//! - [`efi`] - the FAT EFI boot image (grub-mkimage + mtools)
//! - [`iso`] - the hybrid ISO (xorriso) and its checksum
//!
//! Long-running tools also leave a replay script in the work directory so
//! the exact invocation can be rerun by hand.

pub mod efi;
pub mod filesystem;
pub mod iso;
pub mod squashfs;

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::process::Cmd;

/// Write `cmd` as an executable shell script.
pub fn write_replay_script(path: &Path, cmd: &Cmd) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, format!("#!/bin/sh\n{}\n", cmd.command_line()))
        .with_context(|| format!("writing {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {}", path.display()))?;
    tracing::info!("replay script: {}", path.display());
    Ok(())
}
