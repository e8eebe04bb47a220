//! mkinitcpio with a temporarily patched PXE hook.
//!
//! The live image must not copy the squashfs to RAM, so the hook's
//! `copytoram="y"` line is commented out for the duration of the run. The
//! hook lives in host configuration: [`HookGuard`] puts it back exactly as
//! it was, whatever happens to mkinitcpio.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::InitrdRequest;
use crate::distro::ArchVariant;
use crate::error::BuildError;
use crate::process::{Cmd, CommandRunner};

struct HookPlan {
    source: PathBuf,
    destination: PathBuf,
    directive: &'static str,
    conf_dir: &'static str,
}

fn plan(variant: ArchVariant, request: &InitrdRequest<'_>) -> HookPlan {
    let settings = request.settings;
    match variant {
        ArchVariant::Arch => HookPlan {
            source: settings.host_path("/usr/lib/initcpio/hooks/archiso_pxe_http"),
            destination: settings.host_path("/etc/initcpio/hooks/archiso_pxe_http"),
            directive: "export copytoram=\"y\"",
            conf_dir: "arch",
        },
        ArchVariant::Manjaro | ArchVariant::BigLinux => {
            let hook = settings.host_path("/etc/initcpio/hooks/miso_pxe_http");
            HookPlan {
                source: hook.clone(),
                destination: hook,
                directive: "copytoram=\"y\"",
                conf_dir: if variant == ArchVariant::BigLinux {
                    "biglinux"
                } else {
                    "manjaro"
                },
            }
        }
    }
}

pub(super) fn generate(
    variant: ArchVariant,
    request: &InitrdRequest<'_>,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let plan = plan(variant, request);
    let conf = request
        .settings
        .install_prefix
        .join("mkinitcpio")
        .join(plan.conf_dir)
        .join("live.conf");

    let guard = HookGuard::arm(&plan.destination, &request.settings.hook_backup_dir)?;
    let generated = install_and_run(&plan, &conf, request, runner);
    let restored = guard.restore();

    match (generated, restored) {
        (generated, Ok(())) => generated,
        (Ok(()), Err(restore_err)) => Err(restore_err),
        (Err(gen_err), Err(restore_err)) => {
            tracing::error!("mkinitcpio failed before the hook restore failed: {:#}", gen_err);
            Err(restore_err)
        }
    }
}

fn install_and_run(
    plan: &HookPlan,
    conf: &Path,
    request: &InitrdRequest<'_>,
    runner: &dyn CommandRunner,
) -> Result<()> {
    if plan.source != plan.destination {
        if let Some(parent) = plan.destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::copy(&plan.source, &plan.destination).map_err(|err| {
            BuildError::filesystem(&plan.source, format!("cannot install hook ({err})"))
        })?;
    }

    let hook = fs::read_to_string(&plan.destination)
        .map_err(|err| BuildError::filesystem(&plan.destination, format!("cannot read hook ({err})")))?;
    let patched = hook.replace(plan.directive, &format!("# {}", plan.directive));
    fs::write(&plan.destination, patched)
        .with_context(|| format!("patching {}", plan.destination.display()))?;

    Cmd::new("mkinitcpio")
        .arg("-c")
        .arg_path(conf)
        .arg("-g")
        .arg_path(&request.destination())
        .arg("-k")
        .arg(request.kernel_version)
        .log_to(&request.log_file("mkinitcpio"))
        .error_msg("mkinitcpio failed")
        .run_with(runner)?;
    Ok(())
}

/// Restores a host file to its pre-run state.
///
/// Arming records whether the file exists and, if so, parks a copy in the
/// backup directory. [`HookGuard::restore`] deletes whatever is at the
/// path, puts the parked copy back only if the file existed, and removes
/// the copy. Dropping an unrestored guard runs the same restore.
#[derive(Debug)]
pub struct HookGuard {
    path: PathBuf,
    backup: PathBuf,
    existed: bool,
    done: bool,
}

impl HookGuard {
    pub fn arm(path: &Path, backup_dir: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .ok_or_else(|| BuildError::filesystem(path, "hook path has no file name"))?;
        let backup = backup_dir.join(name);
        let existed = path.exists();
        if existed {
            fs::create_dir_all(backup_dir)
                .with_context(|| format!("creating {}", backup_dir.display()))?;
            fs::copy(path, &backup).with_context(|| {
                format!("backing up {} to {}", path.display(), backup.display())
            })?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            backup,
            existed,
            done: false,
        })
    }

    pub fn existed(&self) -> bool {
        self.existed
    }

    /// Put the file back. Failures are [`BuildError::StateRestore`] and are
    /// logged at error level before being returned.
    pub fn restore(mut self) -> Result<()> {
        self.done = true;
        self.put_back().map_err(|err| {
            tracing::error!("{}", err);
            err.into()
        })
    }

    fn put_back(&self) -> std::result::Result<(), BuildError> {
        let restore_err = |reason: String| BuildError::StateRestore {
            path: self.path.clone(),
            reason,
        };

        if self.path.exists() || self.path.is_symlink() {
            fs::remove_file(&self.path)
                .map_err(|e| restore_err(format!("removing patched hook: {e}")))?;
        }
        if self.existed {
            fs::copy(&self.backup, &self.path)
                .map_err(|e| restore_err(format!("copying back {}: {e}", self.backup.display())))?;
            fs::remove_file(&self.backup)
                .map_err(|e| restore_err(format!("removing {}: {e}", self.backup.display())))?;
        }
        Ok(())
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        if !self.done {
            if let Err(err) = self.put_back() {
                tracing::error!("{}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::process::RecordingRunner;
    use tempfile::TempDir;

    const ARCHISO_HOOK: &str = "run_hook() {\n    export copytoram=\"y\"\n}\n";

    struct Host {
        temp: TempDir,
        settings: Settings,
    }

    impl Host {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let settings = Settings {
                host_root: temp.path().join("host"),
                hook_backup_dir: temp.path().join("backup"),
                install_prefix: temp.path().join("prefix"),
                ..Settings::default()
            };
            fs::create_dir_all(settings.host_path("/usr/lib/initcpio/hooks")).unwrap();
            fs::create_dir_all(settings.host_path("/etc/initcpio/hooks")).unwrap();
            fs::write(
                settings.host_path("/usr/lib/initcpio/hooks/archiso_pxe_http"),
                ARCHISO_HOOK,
            )
            .unwrap();
            Self { temp, settings }
        }

        fn request(&self) -> InitrdRequest<'_> {
            InitrdRequest {
                kernel_version: "6.7.4-arch1-1",
                live_dir: self.settings.host_root.parent().unwrap(),
                iso_work: self.temp.path(),
                snapshot_source: self.temp.path(),
                settings: &self.settings,
            }
        }

        fn hook(&self) -> PathBuf {
            self.settings.host_path("/etc/initcpio/hooks/archiso_pxe_http")
        }
    }

    #[test]
    fn hook_is_patched_while_mkinitcpio_runs() {
        let host = Host::new();
        let hook = host.hook();
        let seen = hook.clone();
        let runner = RecordingRunner::new().on_run("mkinitcpio", move |_| {
            let content = fs::read_to_string(&seen)?;
            assert!(content.contains("# export copytoram=\"y\""));
            Ok(())
        });

        generate(ArchVariant::Arch, &host.request(), &runner).unwrap();

        assert!(!hook.exists(), "hook absent before the run must be absent after");
        let args = runner.calls_to("mkinitcpio")[0].arguments().to_vec();
        assert!(args[1].ends_with("mkinitcpio/arch/live.conf"));
        assert_eq!(args[5], "6.7.4-arch1-1");
    }

    #[test]
    fn generator_failure_leaves_existing_hook_identical() {
        let host = Host::new();
        let hook = host.hook();
        let original = b"custom hook\nexport copytoram=\"y\"\n\x00binary".to_vec();
        fs::write(&hook, &original).unwrap();

        let runner = RecordingRunner::new().fail("mkinitcpio", 1, "boom");
        let err = generate(ArchVariant::Arch, &host.request(), &runner).unwrap_err();

        assert!(err.to_string().contains("mkinitcpio failed"));
        assert_eq!(fs::read(&hook).unwrap(), original);
        assert!(!host.settings.hook_backup_dir.join("archiso_pxe_http").exists());
    }

    #[test]
    fn generator_failure_leaves_absent_hook_absent() {
        let host = Host::new();
        let runner = RecordingRunner::new().fail("mkinitcpio", 1, "boom");
        assert!(generate(ArchVariant::Arch, &host.request(), &runner).is_err());
        assert!(!host.hook().exists());
    }

    #[test]
    fn manjaro_patches_in_place_and_restores() {
        let host = Host::new();
        let hook = host.settings.host_path("/etc/initcpio/hooks/miso_pxe_http");
        fs::write(&hook, "copytoram=\"y\"\n").unwrap();

        let seen = hook.clone();
        let runner = RecordingRunner::new().on_run("mkinitcpio", move |_| {
            assert_eq!(fs::read_to_string(&seen)?, "# copytoram=\"y\"\n");
            Ok(())
        });
        generate(ArchVariant::BigLinux, &host.request(), &runner).unwrap();

        assert_eq!(fs::read_to_string(&hook).unwrap(), "copytoram=\"y\"\n");
        let args = runner.calls_to("mkinitcpio")[0].arguments().to_vec();
        assert!(args[1].ends_with("mkinitcpio/biglinux/live.conf"));
    }

    #[test]
    fn dropped_guard_restores() {
        let host = Host::new();
        let hook = host.hook();
        fs::write(&hook, "before").unwrap();
        {
            let guard = HookGuard::arm(&hook, &host.settings.hook_backup_dir).unwrap();
            assert!(guard.existed());
            fs::write(&hook, "after").unwrap();
        }
        assert_eq!(fs::read_to_string(&hook).unwrap(), "before");
    }

    #[test]
    fn failed_restore_is_state_restore_error() {
        let host = Host::new();
        let hook = host.hook();
        fs::write(&hook, "before").unwrap();
        let guard = HookGuard::arm(&hook, &host.settings.hook_backup_dir).unwrap();
        fs::remove_file(host.settings.hook_backup_dir.join("archiso_pxe_http")).unwrap();

        let err = guard.restore().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::StateRestore { .. })
        ));
    }
}
