//! Host validation before a production run.
//!
//! Checks that the tools the run will invoke are installed and that the
//! work directory has room for the image. This prevents cryptic errors
//! halfway through a multi-gigabyte compression.
//!
//! # Example
//!
//! ```rust,ignore
//! use live_remaster::preflight::{check_required_tools, required_tools};
//!
//! let tools = required_tools(InitrdStrategy::Dracut);
//! if let Err(e) = check_required_tools(&tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::distro::dispatch::InitrdStrategy;
use crate::process;

/// Tools every run needs. Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("mksquashfs", "squashfs-tools"),
    ("xorriso", "xorriso"),
    ("rsync", "rsync"),
    ("grub-mkimage", "grub"),
    ("mformat", "mtools"),
    ("mmd", "mtools"),
    ("mcopy", "mtools"),
    ("uname", "coreutils"),
];

/// Space below which a run is refused.
pub const MIN_FREE_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    process::exists(cmd)
}

/// [`REQUIRED_TOOLS`] plus the initrd generator of `strategy`.
pub fn required_tools(strategy: InitrdStrategy) -> Vec<(&'static str, &'static str)> {
    let generator = match strategy {
        InitrdStrategy::Alpine => ("mkinitfs", "mkinitfs"),
        InitrdStrategy::Arch(_) => ("mkinitcpio", "mkinitcpio"),
        InitrdStrategy::DebianChroot => ("chroot", "coreutils"),
        InitrdStrategy::Dracut => ("dracut", "dracut"),
    };
    let mut tools = REQUIRED_TOOLS.to_vec();
    tools.push(generator);
    tools
}

/// Check that specific tools are available.
///
/// Returns an error listing every missing tool with its package.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        bail!("Missing required host tools:\n{}", missing.join("\n"));
    }
    Ok(())
}

/// Fail when the filesystem holding `dir` has less than `min_bytes` free.
/// `dir` need not exist yet; its closest existing ancestor is measured.
pub fn check_free_space(dir: &Path, min_bytes: u64) -> Result<u64> {
    let probe = dir
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("/"));
    let available = fs2::available_space(probe)
        .with_context(|| format!("querying free space on {}", probe.display()))?;
    if available < min_bytes {
        bail!(
            "only {} MiB free on {}, need at least {} MiB",
            available / (1024 * 1024),
            probe.display(),
            min_bytes / (1024 * 1024)
        );
    }
    Ok(available)
}

/// Every host check before a run.
pub fn check_host(strategy: InitrdStrategy, work_dir: &Path) -> Result<()> {
    check_required_tools(&required_tools(strategy))?;
    let free = check_free_space(work_dir, MIN_FREE_BYTES)?;
    tracing::info!(
        "host check passed: {} GiB free under {}",
        free / (1024 * 1024 * 1024),
        work_dir.display()
    );
    Ok(())
}
