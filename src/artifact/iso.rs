//! Hybrid BIOS+UEFI ISO creation and checksum.

use anyhow::{Context, Result};
use sha2::{Digest, Sha512};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::BuildError;
use crate::process::{Cmd, CommandRunner, OutputMode};

/// xorriso's "finished with warnings" exit code.
const XORRISO_WARNINGS: i32 = 32;

/// Separator between hash and file name, as `sha512sum -c` expects.
const SHA512_SEPARATOR: &str = "  ";

#[derive(Debug, Clone)]
pub struct IsoRequest<'a> {
    /// Directory that becomes the ISO root.
    pub iso_root: &'a Path,
    pub output: &'a Path,
    /// Volume label, at most 30 characters.
    pub volume_id: &'a str,
    /// Pre-built encrypted root appended as partition 2.
    pub appended_partition: Option<&'a Path>,
    pub mode: OutputMode,
}

/// Describe the xorriso invocation without running it.
pub fn xorriso_command(request: &IsoRequest) -> Cmd {
    let mut cmd = Cmd::new("xorriso")
        .args(["-as", "mkisofs", "-iso-level", "3", "-full-iso9660-filenames"])
        .args(["-volid", request.volume_id])
        .arg("-output")
        .arg_path(request.output)
        // BIOS El-Torito
        .args(["-b", "isolinux/isolinux.bin", "-c", "isolinux/boot.cat"])
        .args(["-no-emul-boot", "-boot-load-size", "4", "-boot-info-table"])
        // UEFI alternate boot
        .args(["-eltorito-alt-boot", "-e", "EFI/efiboot.img", "-no-emul-boot"])
        .arg("-isohybrid-gpt-basdat");

    if let Some(partition) = request.appended_partition {
        cmd = cmd
            .args(["-append_partition", "2", "0x83"])
            .arg_path(partition);
    }
    cmd.arg_path(request.iso_root)
        .output(request.mode)
        .allow_fail()
}

/// Run xorriso. Exit code 32 (warnings) is accepted when the image exists.
pub fn build_iso(runner: &dyn CommandRunner, request: &IsoRequest) -> Result<PathBuf> {
    if let Some(parent) = request.output.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let result = xorriso_command(request).run_with(runner)?;
    match result.code {
        0 => {}
        XORRISO_WARNINGS if request.output.is_file() => {
            tracing::warn!("xorriso finished with warnings, image was written");
        }
        code => {
            return Err(BuildError::ExternalTool {
                program: "xorriso".to_string(),
                context: "xorriso failed to assemble the ISO".to_string(),
                code,
                stderr: result.stderr,
            }
            .into())
        }
    }
    Ok(request.output.to_path_buf())
}

/// Write `<iso>.sha512` in `sha512sum -c` format, naming only the file so
/// it verifies from the output directory. Returns the checksum path.
pub fn write_iso_checksum(iso_path: &Path) -> Result<PathBuf> {
    let hash = sha512_file(iso_path)?;
    let filename = iso_path
        .file_name()
        .context("Could not get ISO filename")?
        .to_string_lossy();

    let sum_file = checksum_path(iso_path);
    fs::write(
        &sum_file,
        format!("{}{}{}\n", hash, SHA512_SEPARATOR, filename),
    )
    .with_context(|| format!("writing {}", sum_file.display()))?;

    tracing::info!("SHA512: {}...{}", &hash[..8], &hash[hash.len() - 8..]);
    Ok(sum_file)
}

/// `<iso>.sha512`, next to the image.
pub fn checksum_path(iso_path: &Path) -> PathBuf {
    let mut name = iso_path.as_os_str().to_owned();
    name.push(".sha512");
    PathBuf::from(name)
}

fn sha512_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("reading {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
