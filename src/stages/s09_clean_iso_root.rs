//! CleanIsoRoot: drop stray top-level entries left by the theme overlay.

use anyhow::{Context, Result};
use std::fs;

use crate::pipeline::BuildContext;

/// Entries that must not appear at the ISO root.
pub const ISO_ROOT_TRASH: &[&str] = &[
    "applications",
    "artwork",
    "calamares",
    "catfish.desktop",
    "eggs.desktop",
    "livecd",
    "vmlinuz",
    "vmlinuz.old",
    "initrd.img",
    "initrd.img.old",
];

/// Returns the names that were removed.
pub fn run(ctx: &BuildContext) -> Result<Vec<&'static str>> {
    let mut removed = Vec::new();
    for name in ISO_ROOT_TRASH {
        let path = ctx.paths.iso_work.join(name);
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        let result = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.with_context(|| format!("removing {}", path.display()))?;
        removed.push(*name);
    }
    if !removed.is_empty() {
        tracing::info!("removed from ISO root: {}", removed.join(", "));
    }

    if !ctx.paths.kernel().is_file() {
        tracing::warn!(
            "kernel missing at {}, the image will not boot",
            ctx.paths.kernel().display()
        );
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use tempfile::TempDir;

    #[test]
    fn stray_entries_removed_live_tree_kept() {
        let temp = TempDir::new().unwrap();
        let settings = Settings {
            work_dir: temp.path().to_path_buf(),
            ..Settings::default()
        };
        let ctx = BuildContext::new(Default::default(), settings, Default::default());
        let iso = &ctx.paths.iso_work;
        fs::create_dir_all(iso.join("livecd/nested")).unwrap();
        fs::create_dir_all(iso.join("live")).unwrap();
        fs::write(iso.join("vmlinuz"), "k").unwrap();
        fs::write(iso.join("live/vmlinuz"), "k").unwrap();
        std::os::unix::fs::symlink("/nonexistent", iso.join("initrd.img")).unwrap();

        let removed = run(&ctx).unwrap();
        assert_eq!(removed, ["livecd", "vmlinuz", "initrd.img"]);
        assert!(!iso.join("livecd").exists());
        assert!(iso.join("live/vmlinuz").is_file());
    }
}
