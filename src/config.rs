//! Run settings.
//!
//! Every fixed path the pipeline touches comes from [`Settings`], so a run
//! can be pointed at a temporary root in tests. Settings are read from a
//! TOML file; absent keys take the defaults below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BuildError;

/// Squashfs compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    /// mksquashfs arguments for this algorithm.
    pub fn mksquashfs_args(self) -> Vec<&'static str> {
        match self {
            Compression::Gzip => vec!["-comp", "gzip"],
            Compression::Xz => vec!["-comp", "xz", "-b", "1M"],
            Compression::Zstd => vec!["-comp", "zstd", "-Xcompression-level", "15"],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Leading part of the volume id and ISO filename.
    pub snapshot_prefix: String,
    pub compression: Compression,
    /// Working directory: snapshot mountpoint, ISO tree and outputs.
    pub work_dir: PathBuf,
    /// Holds the master `exclude.list`.
    pub config_dir: PathBuf,
    /// Installation prefix: initrd generator configs and bundled bootloaders.
    pub install_prefix: PathBuf,
    /// Preferred bootloader directory for non-Debian families.
    pub local_bootloaders: PathBuf,
    /// Branding and boot-menu templates (`livecd/` subdirectory).
    pub theme_dir: PathBuf,
    /// Root of the running system (kernel images, initcpio hooks).
    pub host_root: PathBuf,
    /// Where original hook files are parked while patched.
    pub hook_backup_dir: PathBuf,
    pub live_user: String,
    pub live_user_fullname: String,
    pub live_password: String,
    pub root_password: String,
    /// Kernel `locales=` value; `LANG` when unset.
    pub locale: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            snapshot_prefix: "egg-of".to_string(),
            compression: Compression::Gzip,
            work_dir: PathBuf::from("/home/eggs"),
            config_dir: PathBuf::from("/etc/live-remaster.d"),
            install_prefix: PathBuf::from("/usr/lib/live-remaster"),
            local_bootloaders: PathBuf::from("bootloaders"),
            theme_dir: PathBuf::from("/usr/lib/live-remaster/theme"),
            host_root: PathBuf::from("/"),
            hook_backup_dir: PathBuf::from("/tmp"),
            live_user: "live".to_string(),
            live_user_fullname: "Live User".to_string(),
            live_password: "evolution".to_string(),
            root_password: "evolution".to_string(),
            locale: None,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading settings '{}'", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing settings '{}'", path.display()))
    }

    /// Load settings from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            tracing::info!("no settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.snapshot_prefix.trim().is_empty() {
            return Err(BuildError::configuration("snapshot_prefix must not be empty").into());
        }
        if self.live_user.trim().is_empty() || self.live_user.contains(':') {
            return Err(BuildError::configuration(format!(
                "invalid live_user '{}'",
                self.live_user
            ))
            .into());
        }
        Ok(())
    }

    /// Resolve an absolute host path (`/boot/...`) under [`Settings::host_root`].
    pub fn host_path(&self, absolute: &str) -> PathBuf {
        self.host_root.join(absolute.trim_start_matches('/'))
    }

    /// The master exclusion file.
    pub fn exclude_list(&self) -> PathBuf {
        self.config_dir.join("exclude.list")
    }

    pub fn locale(&self) -> String {
        self.locale
            .clone()
            .or_else(|| std::env::var("LANG").ok())
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or_else(|| "en_US.UTF-8".to_string())
    }
}
