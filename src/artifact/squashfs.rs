//! Squashfs image builder.
//!
//! Provides a wrapper around `mksquashfs` for creating the compressed live
//! root filesystem.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::Compression;
use crate::exclusion::ExclusionList;
use crate::process::{Cmd, CommandRunner, OutputMode};

/// Options for building a squashfs image.
#[derive(Debug, Clone)]
pub struct SquashfsOptions<'a> {
    pub compression: Compression,
    /// Passed with `-ef` when present on disk.
    pub master_list: Option<&'a Path>,
    /// Passed with `-e`.
    pub exclusions: &'a ExclusionList,
    pub output: OutputMode,
}

/// Describe the mksquashfs invocation without running it.
pub fn mksquashfs_command(source_dir: &Path, output: &Path, options: &SquashfsOptions) -> Cmd {
    let mut cmd = Cmd::new("mksquashfs")
        .arg_path(source_dir)
        .arg_path(output)
        .args(options.compression.mksquashfs_args())
        .args(["-no-xattrs", "-wildcards"]);

    if let Some(master) = options.master_list.filter(|path| path.is_file()) {
        cmd = cmd.arg("-ef").arg_path(master);
    }
    if !options.exclusions.is_empty() {
        cmd = cmd.arg("-e").args(options.exclusions.patterns());
    }
    cmd.output(options.output)
        .error_msg("mksquashfs failed. Install squashfs-tools.")
}

/// Build a squashfs image from a directory. An existing image at `output`
/// is replaced.
pub fn build_squashfs(
    runner: &dyn CommandRunner,
    source_dir: &Path,
    output: &Path,
    options: &SquashfsOptions,
) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    if output.exists() {
        fs::remove_file(output)
            .with_context(|| format!("removing stale {}", output.display()))?;
    }

    tracing::info!(
        "compressing {} -> {} ({} exclusions)",
        source_dir.display(),
        output.display(),
        options.exclusions.len()
    );
    mksquashfs_command(source_dir, output, options).run_with(runner)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;
    use tempfile::TempDir;

    #[test]
    fn command_layout() {
        let temp = TempDir::new().unwrap();
        let master = temp.path().join("exclude.list");
        fs::write(&master, "var/cache/*\n").unwrap();
        let exclusions: ExclusionList = ["/etc/fstab", "home/*"].into_iter().collect();

        let options = SquashfsOptions {
            compression: Compression::Xz,
            master_list: Some(&master),
            exclusions: &exclusions,
            output: OutputMode::Captured,
        };
        let cmd = mksquashfs_command(Path::new("/mnt"), Path::new("/iso/live/fs.sq"), &options);

        assert_eq!(
            cmd.command_line(),
            format!(
                "mksquashfs /mnt /iso/live/fs.sq -comp xz -b 1M -no-xattrs -wildcards -ef {} -e etc/fstab 'home/*'",
                master.display()
            )
        );
    }

    #[test]
    fn missing_master_list_is_skipped() {
        let exclusions = ExclusionList::new();
        let options = SquashfsOptions {
            compression: Compression::Gzip,
            master_list: Some(Path::new("/nonexistent/exclude.list")),
            exclusions: &exclusions,
            output: OutputMode::Streamed,
        };
        let cmd = mksquashfs_command(Path::new("/mnt"), Path::new("/out"), &options);
        assert_eq!(
            cmd.command_line(),
            "mksquashfs /mnt /out -comp gzip -no-xattrs -wildcards"
        );
        assert_eq!(cmd.output_mode(), OutputMode::Streamed);
    }

    #[test]
    fn stale_image_is_removed_before_run() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("live/filesystem.squashfs");
        fs::create_dir_all(output.parent().unwrap()).unwrap();
        fs::write(&output, "stale").unwrap();

        let exclusions = ExclusionList::new();
        let options = SquashfsOptions {
            compression: Compression::Zstd,
            master_list: None,
            exclusions: &exclusions,
            output: OutputMode::Captured,
        };
        let runner = RecordingRunner::new();
        build_squashfs(&runner, temp.path(), &output, &options).unwrap();

        assert!(!output.exists());
        assert!(runner.invoked("mksquashfs"));
    }
}
