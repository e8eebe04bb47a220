//! Per-family decision tables.
//!
//! Each table is one exhaustive `match` on [`Family`]. The `Unknown` arm is
//! the documented default: it logs a warning and returns a degenerate
//! value instead of failing the run.

use std::path::PathBuf;

use super::{ArchVariant, Family};
use crate::config::Settings;
use crate::process::Cmd;

/// One command of a package-cache cleanup plan.
#[derive(Debug, Clone)]
pub struct CleanupStep {
    pub cmd: Cmd,
    /// A non-zero exit is logged and the plan continues.
    pub tolerate_failure: bool,
}

impl CleanupStep {
    fn required(cmd: Cmd) -> Self {
        Self {
            cmd,
            tolerate_failure: false,
        }
    }

    fn tolerated(cmd: Cmd) -> Self {
        Self {
            cmd,
            tolerate_failure: true,
        }
    }
}

/// Commands that empty the package manager caches of the snapshot source.
pub fn package_cache_cleanup_plan(family: &Family) -> Vec<CleanupStep> {
    match family {
        Family::Debian => vec![
            CleanupStep::required(Cmd::new("apt-get").arg("clean")),
            CleanupStep::required(Cmd::new("apt-get").arg("autoclean")),
            CleanupStep::required(Cmd::new("rm").args(["-f", "/var/lib/apt/lists/lock"])),
        ],
        Family::Arch(_) => vec![CleanupStep::required(Cmd::shell("yes | pacman -Scc"))],
        Family::Fedora | Family::OpenMamba => vec![
            CleanupStep::tolerated(
                Cmd::new("bash")
                    .arg("-c")
                    .arg("dnf remove $(dnf repoquery --installonly --latest-limit=-1 -q) -y"),
            ),
            CleanupStep::required(Cmd::new("dnf").args(["clean", "all"])),
        ],
        Family::Alpine => vec![
            CleanupStep::required(Cmd::new("apk").args(["cache", "clean"])),
            CleanupStep::required(Cmd::new("apk").args(["cache", "purge"])),
        ],
        Family::Opensuse => vec![CleanupStep::required(Cmd::new("zypper").arg("clean"))],
        Family::Void => vec![CleanupStep::required(Cmd::new("xbps-remove").arg("-O"))],
        Family::Unknown(id) => {
            tracing::warn!("no package cache cleanup known for family '{}'", id);
            Vec::new()
        }
    }
}

/// Kernel command line for the live image.
pub fn kernel_boot_parameters(
    family: &Family,
    volume_id: &str,
    locale: &str,
    full_disk_encryption: bool,
) -> String {
    let rpm_live = format!(
        "root=live:CDLABEL={volume_id} rd.live.image rd.live.dir=/live rd.live.squashimg=filesystem.squashfs"
    );
    match family {
        Family::Alpine => format!(
            "alpinelivelabel={volume_id} alpinelivesquashfs=/mnt/live/filesystem.squashfs"
        ),
        Family::Arch(_) => format!(
            "boot=live components locales={locale} archisobasedir=arch archisolabel={volume_id}"
        ),
        Family::Debian => {
            let mut params = format!("boot=live components locales={locale} cow_spacesize=2G");
            if full_disk_encryption {
                params.push_str(" live-media=/run/live/medium");
            }
            params
        }
        Family::Fedora | Family::OpenMamba => format!("{rpm_live} enforcing=0"),
        Family::Opensuse => format!("{rpm_live} apparmor=0"),
        Family::Void => format!("{rpm_live} rd.debug"),
        Family::Unknown(id) => {
            tracing::warn!("no kernel parameters known for family '{}', using minimal set", id);
            format!("boot=live components locales={locale}")
        }
    }
}

/// Directory holding `ISOLINUX/`, `syslinux/` and `grub/` bootloader files.
pub fn bootloader_binary_base(family: &Family, settings: &Settings) -> PathBuf {
    match family {
        Family::Debian => settings.host_path("/usr/lib"),
        Family::Arch(_)
        | Family::Fedora
        | Family::OpenMamba
        | Family::Opensuse
        | Family::Alpine
        | Family::Void
        | Family::Unknown(_) => {
            if settings.local_bootloaders.is_dir() {
                settings.local_bootloaders.clone()
            } else {
                settings.install_prefix.join("bootloaders")
            }
        }
    }
}

/// How the live initrd is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitrdStrategy {
    Alpine,
    Arch(ArchVariant),
    DebianChroot,
    Dracut,
}

impl InitrdStrategy {
    /// Name of the generator binary, used for log file names and host checks.
    pub fn tool(self) -> &'static str {
        match self {
            InitrdStrategy::Alpine => "mkinitfs",
            InitrdStrategy::Arch(_) => "mkinitcpio",
            InitrdStrategy::DebianChroot => "mkinitramfs",
            InitrdStrategy::Dracut => "dracut",
        }
    }
}

pub fn initrd_strategy(family: &Family) -> InitrdStrategy {
    match family {
        Family::Alpine => InitrdStrategy::Alpine,
        Family::Arch(variant) => InitrdStrategy::Arch(*variant),
        Family::Debian => InitrdStrategy::DebianChroot,
        Family::Fedora
        | Family::OpenMamba
        | Family::Opensuse
        | Family::Void
        | Family::Unknown(_) => InitrdStrategy::Dracut,
    }
}
