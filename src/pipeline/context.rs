//! Run-scoped state shared by the stages.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Compression, Settings};
use crate::distro::{DistroProfile, Family};
use crate::exclusion::ExclusionList;
use crate::process::OutputMode;

/// Longest volume label the ISO tools accept.
pub const VOLUME_ID_MAX: usize = 30;

/// Caller-resolved switches for one production run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Keep host accounts and ship user data.
    pub clone: bool,
    /// Keep host accounts; home data travels encrypted.
    pub homecrypt: bool,
    /// Keep host accounts; root travels as an appended encrypted partition.
    pub fullcrypt: bool,
    pub fast: bool,
    pub max: bool,
    pub verbose: bool,
    /// Write `mksquashfs.sh` and `mkisofs.sh` instead of running the tools.
    pub script_only: bool,
    pub include_root_home: bool,
}

impl PipelineOptions {
    /// Host accounts survive; no live user is created. Only `clone` does this.
    pub fn keeps_accounts(&self) -> bool {
        self.clone
    }

    /// `/home` contents go into the image.
    pub fn ships_home(&self) -> bool {
        self.clone
    }

    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_verbose(self.verbose)
    }

    /// `fast` wins over `max`; both override the configured algorithm.
    pub fn compression(&self, configured: Compression) -> Compression {
        if self.fast {
            Compression::Gzip
        } else if self.max {
            Compression::Zstd
        } else {
            configured
        }
    }
}

/// Directory layout under the work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPaths {
    pub work_dir: PathBuf,
    /// Unified view of the host that gets snapshotted.
    pub snapshot_source: PathBuf,
    /// Tree that becomes the ISO root.
    pub iso_work: PathBuf,
    /// `<iso_work>/live`: kernel, initrd, squashfs.
    pub live_dir: PathBuf,
}

impl WorkPaths {
    pub fn new(work_dir: &Path) -> Self {
        let iso_work = work_dir.join("iso");
        Self {
            work_dir: work_dir.to_path_buf(),
            snapshot_source: work_dir.join(".mnt"),
            live_dir: iso_work.join("live"),
            iso_work,
        }
    }

    pub fn overlay_dir(&self) -> PathBuf {
        self.work_dir.join(".overlay")
    }

    pub fn kernel(&self) -> PathBuf {
        self.live_dir.join("vmlinuz")
    }

    pub fn squashfs(&self) -> PathBuf {
        self.live_dir.join("filesystem.squashfs")
    }

    pub fn efi_scratch(&self) -> PathBuf {
        self.work_dir.join("efi")
    }

    pub fn efi_image(&self) -> PathBuf {
        self.iso_work.join("EFI").join("efiboot.img")
    }

    /// Pre-built encrypted root, appended when running `fullcrypt`.
    pub fn luks_image(&self) -> PathBuf {
        self.work_dir.join("luks.img")
    }
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Identify,
    Bind,
    PreFlight,
    Incubator,
    Squash,
    BootloaderInject,
    Theme,
    BootloaderConfigure,
    CleanIsoRoot,
    Assemble,
    Unbind,
}

impl Stage {
    pub const ALL: [Stage; 11] = [
        Stage::Identify,
        Stage::Bind,
        Stage::PreFlight,
        Stage::Incubator,
        Stage::Squash,
        Stage::BootloaderInject,
        Stage::Theme,
        Stage::BootloaderConfigure,
        Stage::CleanIsoRoot,
        Stage::Assemble,
        Stage::Unbind,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Identify => "identify",
            Stage::Bind => "bind",
            Stage::PreFlight => "preflight",
            Stage::Incubator => "incubator",
            Stage::Squash => "squash",
            Stage::BootloaderInject => "bootloader-inject",
            Stage::Theme => "theme",
            Stage::BootloaderConfigure => "bootloader-configure",
            Stage::CleanIsoRoot => "clean-iso-root",
            Stage::Assemble => "assemble",
            Stage::Unbind => "unbind",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutable state of one run. Owned by the orchestrator and lent to each
/// stage in turn.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub profile: DistroProfile,
    pub family: Family,
    pub settings: Settings,
    pub options: PipelineOptions,
    pub paths: WorkPaths,
    pub volume_id: String,
    /// Set by PreFlight.
    pub kernel_version: Option<String>,
    /// Set by Squash.
    pub exclusions: ExclusionList,
    /// Set by Assemble.
    pub iso_path: Option<PathBuf>,
    pub completed: Vec<Stage>,
}

impl BuildContext {
    pub fn new(profile: DistroProfile, settings: Settings, options: PipelineOptions) -> Self {
        let family = profile.family();
        let paths = WorkPaths::new(&settings.work_dir);
        let volume_id = volume_id(
            &settings.snapshot_prefix,
            &profile.display_name,
            &profile.codename,
        );
        Self {
            profile,
            family,
            settings,
            options,
            paths,
            volume_id,
            kernel_version: None,
            exclusions: ExclusionList::new(),
            iso_path: None,
            completed: Vec::new(),
        }
    }

    pub fn output_mode(&self) -> OutputMode {
        self.options.output_mode()
    }

    /// `<prefix>_<id>_<codename>_<arch>.iso` in the work directory.
    pub fn iso_output(&self) -> PathBuf {
        self.paths.work_dir.join(iso_filename(
            &self.settings.snapshot_prefix,
            &self.profile.id,
            &self.profile.codename,
            std::env::consts::ARCH,
        ))
    }

    /// Boot-menu title.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.profile.display_name, self.profile.codename).to_uppercase()
    }
}

/// Volume label: prefix, display name and codename joined by `_`, upper
/// case, restricted to `[A-Z0-9_]` and cut to [`VOLUME_ID_MAX`].
pub fn volume_id(prefix: &str, display_name: &str, codename: &str) -> String {
    [prefix, display_name, codename]
        .iter()
        .map(|part| part.replace(char::is_whitespace, "_"))
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(VOLUME_ID_MAX)
        .collect()
}

pub fn iso_filename(prefix: &str, id: &str, codename: &str, arch: &str) -> String {
    let part = |s: &str| s.replace(char::is_whitespace, "_").replace('/', "-");
    format!(
        "{}_{}_{}_{}.iso",
        part(prefix),
        part(id),
        part(codename),
        part(arch)
    )
}
