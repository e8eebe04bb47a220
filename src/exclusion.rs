//! Exclusion list for the filesystem snapshot.
//!
//! Patterns are relative to the snapshot source and handed to mksquashfs
//! with `-wildcards -e`. Nothing here runs the compressor.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::distro::Family;

/// Always excluded, whatever the host.
pub const STATIC_EXCLUSIONS: &[&str] = &[
    "/boot/efi/EFI",
    "/boot/loader/entries/",
    "/etc/fstab",
    "/etc/mtab",
    "/var/lib/containers/",
    "/var/lib/docker/",
    "/etc/udev/rules.d/70-persistent-cd.rules",
    "/etc/udev/rules.d/70-persistent-net.rules",
    "/root/.bash_history",
    "/var/tmp/*",
];

const RUNLEVEL_DIRS: &[&str] = &[
    "rc0.d", "rc1.d", "rc2.d", "rc3.d", "rc4.d", "rc5.d", "rc6.d", "rcS.d",
];

const CRYPT_SERVICE_MARKER: &str = "cryptdisks";

/// Ordered, deduplicated, normalized patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    patterns: Vec<String>,
}

impl ExclusionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `pattern` and append it unless already present.
    pub fn push(&mut self, pattern: &str) {
        let normalized = normalize(pattern);
        if normalized.is_empty() || self.contains(normalized) {
            return;
        }
        self.patterns.push(normalized.to_string());
    }

    pub fn extend<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.push(pattern.as_ref());
        }
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns.iter().any(|p| p == pattern)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for ExclusionList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

/// Strip any mix of leading `/` and `./`.
pub fn normalize(pattern: &str) -> &str {
    let mut rest = pattern;
    loop {
        if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else {
            return rest;
        }
    }
}

/// Inputs for one compilation.
#[derive(Debug, Clone)]
pub struct ExclusionRequest<'a> {
    pub family: &'a Family,
    /// Root of the view being snapshotted.
    pub snapshot_source: &'a Path,
    /// The run's own work directory, as seen on the host.
    pub work_dir: &'a Path,
    pub include_root_home: bool,
    /// Ship `/home` contents (plain clone).
    pub ship_home: bool,
    /// `/home` entry to keep when home contents are not shipped.
    pub kept_home: Option<&'a str>,
    /// User-editable master list; absent is fine.
    pub master_list: &'a Path,
}

/// Build the exclusion list: static seed, family scan, safety net, master
/// file, in that order.
pub fn compile(request: &ExclusionRequest<'_>) -> Result<ExclusionList> {
    let mut list: ExclusionList = STATIC_EXCLUSIONS.iter().collect();

    if *request.family == Family::Debian {
        list.extend(crypt_runlevel_entries(request.snapshot_source)?);
    }

    let work = request
        .work_dir
        .strip_prefix(request.snapshot_source)
        .unwrap_or(request.work_dir)
        .to_string_lossy()
        .into_owned();
    if !normalize(&work).is_empty() {
        list.push(&work);
        list.push(&format!("{}/*", normalize(&work)));
    }

    if !request.include_root_home {
        list.push("root/*");
        list.push("root/.*");
    }

    if !request.ship_home {
        list.extend(home_exclusions(request.snapshot_source, request.kept_home)?);
    }

    if request.master_list.is_file() {
        let content = fs::read_to_string(request.master_list)
            .with_context(|| format!("reading {}", request.master_list.display()))?;
        list.extend(
            content
                .lines()
                .filter(|line| !line.trim().is_empty() && !line.starts_with('#')),
        );
    }

    tracing::debug!("{} exclusion patterns", list.len());
    Ok(list)
}

fn crypt_runlevel_entries(source: &Path) -> Result<Vec<String>> {
    let mut found = Vec::new();
    for dir in RUNLEVEL_DIRS {
        let path = source.join("etc").join(dir);
        if !path.is_dir() {
            continue;
        }
        let mut names: Vec<String> = fs::read_dir(&path)
            .with_context(|| format!("scanning {}", path.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(CRYPT_SERVICE_MARKER))
            .collect();
        names.sort();
        found.extend(names.into_iter().map(|name| format!("etc/{dir}/{name}")));
    }
    Ok(found)
}

fn home_exclusions(source: &Path, kept_home: Option<&str>) -> Result<Vec<String>> {
    let home = source.join("home");
    let Some(kept) = kept_home.filter(|_| home.is_dir()) else {
        return Ok(vec!["home/*".to_string()]);
    };

    let mut names: Vec<String> = fs::read_dir(&home)
        .with_context(|| format!("scanning {}", home.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != kept)
        .collect();
    names.sort();
    Ok(names.into_iter().map(|name| format!("home/{name}")).collect())
}
