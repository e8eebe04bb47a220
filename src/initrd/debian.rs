//! mkinitramfs inside a chroot of the snapshot source, so live-boot and the
//! overlay modules of the live system are picked up instead of the host's.

use anyhow::Result;

use super::{InitrdRequest, INITRD_NAME};
use crate::artifact::filesystem::atomic_move;
use crate::error::BuildError;
use crate::process::{Cmd, CommandRunner};

pub(super) fn generate(request: &InitrdRequest<'_>, runner: &dyn CommandRunner) -> Result<()> {
    let inside = format!("/tmp/{INITRD_NAME}");
    let on_host = request.snapshot_source.join("tmp").join(INITRD_NAME);
    let log = request.log_file("mkinitramfs");

    Cmd::new("chroot")
        .arg_path(request.snapshot_source)
        .args(["mkinitramfs", "-o", &inside, request.kernel_version])
        .log_to(&log)
        .error_msg("mkinitramfs failed inside chroot")
        .run_with(runner)?;

    if !on_host.is_file() {
        return Err(BuildError::filesystem(
            &on_host,
            format!("initrd not produced (see {})", log.display()),
        )
        .into());
    }
    atomic_move(&on_host, &request.destination())?;
    tracing::debug!("initrd moved to {}", request.destination().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::process::RecordingRunner;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn artifact_is_moved_into_live_tree() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("mnt");
        let live = temp.path().join("iso/live");
        fs::create_dir_all(source.join("tmp")).unwrap();
        fs::create_dir_all(&live).unwrap();

        let settings = Settings::default();
        let request = InitrdRequest {
            kernel_version: "6.1.0-18-amd64",
            live_dir: &live,
            iso_work: &temp.path().join("iso"),
            snapshot_source: &source,
            settings: &settings,
        };

        let produced = source.join("tmp/initrd.img");
        let runner = RecordingRunner::new().on_run("chroot", move |_| fs::write(&produced, "img"));
        generate(&request, &runner).unwrap();

        assert_eq!(fs::read_to_string(live.join("initrd.img")).unwrap(), "img");
        assert!(!source.join("tmp/initrd.img").exists());
        let args = runner.calls_to("chroot")[0].arguments().to_vec();
        assert_eq!(
            args[1..],
            ["mkinitramfs", "-o", "/tmp/initrd.img", "6.1.0-18-amd64"]
        );
    }

    #[test]
    fn missing_artifact_names_path_and_log() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("mnt");
        let iso = temp.path().join("iso");
        let live = iso.join("live");
        fs::create_dir_all(&live).unwrap();

        let settings = Settings::default();
        let request = InitrdRequest {
            kernel_version: "6.1.0-18-amd64",
            live_dir: &live,
            iso_work: &iso,
            snapshot_source: &source,
            settings: &settings,
        };
        let err = generate(&request, &RecordingRunner::new()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("tmp/initrd.img"));
        assert!(msg.contains("egg-ofmkinitramfs.log.txt"));
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::Filesystem { .. })
        ));
    }
}
