//! Live initrd generation.
//!
//! [`generate`] dispatches on the [`InitrdStrategy`] chosen for the host
//! family. Every generator writes `<live>/initrd.img` and logs to
//! `<iso_work>/<prefix><tool>.log.txt`.

mod alpine;
mod arch;
mod debian;
mod dracut;

pub use arch::HookGuard;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::distro::dispatch::InitrdStrategy;
use crate::process::CommandRunner;

/// File name of the generated image inside the live directory.
pub const INITRD_NAME: &str = "initrd.img";

/// Everything a generator needs.
#[derive(Debug, Clone)]
pub struct InitrdRequest<'a> {
    pub kernel_version: &'a str,
    /// `<iso_work>/live`.
    pub live_dir: &'a Path,
    /// `<iso_work>`; log files land here.
    pub iso_work: &'a Path,
    /// Root of the snapshot view, used as chroot for Debian.
    pub snapshot_source: &'a Path,
    pub settings: &'a Settings,
}

impl InitrdRequest<'_> {
    pub fn destination(&self) -> PathBuf {
        self.live_dir.join(INITRD_NAME)
    }

    pub fn log_file(&self, tool: &str) -> PathBuf {
        self.iso_work.join(format!(
            "{}{}.log.txt",
            self.settings.snapshot_prefix, tool
        ))
    }
}

/// Produce `<live>/initrd.img`. Returns its path.
pub fn generate(
    strategy: InitrdStrategy,
    request: &InitrdRequest<'_>,
    runner: &dyn CommandRunner,
) -> Result<PathBuf> {
    fs::create_dir_all(request.live_dir)
        .with_context(|| format!("creating {}", request.live_dir.display()))?;
    tracing::info!(
        "generating {} with {} for kernel {}",
        INITRD_NAME,
        strategy.tool(),
        request.kernel_version
    );

    match strategy {
        InitrdStrategy::Alpine => alpine::generate(request, runner)?,
        InitrdStrategy::Arch(variant) => arch::generate(variant, request, runner)?,
        InitrdStrategy::DebianChroot => debian::generate(request, runner)?,
        InitrdStrategy::Dracut => dracut::generate(request, runner)?,
    }
    Ok(request.destination())
}
