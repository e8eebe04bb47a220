use anyhow::Result;

use super::InitrdRequest;
use crate::process::{Cmd, CommandRunner};

pub(super) fn generate(request: &InitrdRequest<'_>, runner: &dyn CommandRunner) -> Result<()> {
    let confdir = request
        .settings
        .install_prefix
        .join("dracut/dracut.conf.d");
    Cmd::new("dracut")
        .args(["--force", "-v", "--confdir"])
        .arg_path(&confdir)
        .arg("--kmoddir")
        .arg(format!("/lib/modules/{}", request.kernel_version))
        .arg_path(&request.destination())
        .arg(request.kernel_version)
        .log_to(&request.log_file("dracut"))
        .error_msg("dracut failed")
        .run_with(runner)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::process::RecordingRunner;
    use std::path::Path;

    #[test]
    fn dracut_writes_straight_to_live_tree() {
        let settings = Settings::default();
        let request = InitrdRequest {
            kernel_version: "6.5.6-300.fc39.x86_64",
            live_dir: Path::new("/home/eggs/iso/live"),
            iso_work: Path::new("/home/eggs/iso"),
            snapshot_source: Path::new("/home/eggs/.mnt"),
            settings: &settings,
        };
        let runner = RecordingRunner::new();
        generate(&request, &runner).unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "dracut --force -v --confdir /usr/lib/live-remaster/dracut/dracut.conf.d \
                 --kmoddir /lib/modules/6.5.6-300.fc39.x86_64 /home/eggs/iso/live/initrd.img \
                 6.5.6-300.fc39.x86_64"
            ]
        );
    }
}
