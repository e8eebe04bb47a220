//! Seams to the parts of a run this crate does not own: the filesystem
//! view being snapshotted, installer configuration and boot-menu text.
//!
//! Each trait has a default implementation used by the binary.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use super::context::{BuildContext, WorkPaths};
use crate::config::Settings;
use crate::process::{Cmd, CommandRunner};

/// Builds and tears down the unified view at `paths.snapshot_source`.
pub trait Binder {
    fn bind(&self, paths: &WorkPaths, settings: &Settings, runner: &dyn CommandRunner)
        -> Result<()>;
    fn unbind(&self, paths: &WorkPaths, runner: &dyn CommandRunner) -> Result<()>;
}

/// Mounts a writable overlay over the host root so live-account changes
/// never reach the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlayBinder;

impl Binder for OverlayBinder {
    fn bind(
        &self,
        paths: &WorkPaths,
        settings: &Settings,
        runner: &dyn CommandRunner,
    ) -> Result<()> {
        let overlay = paths.overlay_dir();
        let upper = overlay.join("upper");
        let work = overlay.join("work");
        for dir in [&upper, &work, &paths.snapshot_source] {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }

        let options = format!(
            "lowerdir={},upperdir={},workdir={}",
            settings.host_root.display(),
            upper.display(),
            work.display()
        );
        Cmd::new("mount")
            .args(["-t", "overlay", "overlay", "-o", &options])
            .arg_path(&paths.snapshot_source)
            .error_msg("mounting the snapshot overlay failed")
            .run_with(runner)?;
        tracing::info!("snapshot view mounted at {}", paths.snapshot_source.display());
        Ok(())
    }

    fn unbind(&self, paths: &WorkPaths, runner: &dyn CommandRunner) -> Result<()> {
        Cmd::new("umount")
            .arg("-l")
            .arg_path(&paths.snapshot_source)
            .error_msg("unmounting the snapshot overlay failed")
            .run_with(runner)?;
        let overlay = paths.overlay_dir();
        if overlay.exists() {
            fs::remove_dir_all(&overlay)
                .with_context(|| format!("removing {}", overlay.display()))?;
        }
        Ok(())
    }
}

/// Materializes installer configuration inside the snapshot view.
pub trait Incubator {
    fn configure(&self, ctx: &BuildContext) -> Result<()>;
}

/// Installer directory inside the snapshot view.
pub const INSTALLER_DIR: &str = "etc/calamares";

#[derive(Debug, Serialize)]
struct KrillConfig<'a> {
    distro_target: &'a str,
    installer_version: &'a str,
    use_efi: bool,
    swap_file: bool,
}

/// Writes `krill.json` for the text-mode installer.
#[derive(Debug, Default, Clone, Copy)]
pub struct KrillIncubator;

impl Incubator for KrillIncubator {
    fn configure(&self, ctx: &BuildContext) -> Result<()> {
        let dest = ctx.paths.snapshot_source.join(INSTALLER_DIR);
        fs::create_dir_all(&dest).with_context(|| format!("creating {}", dest.display()))?;

        let config = KrillConfig {
            distro_target: &ctx.profile.id,
            installer_version: env!("CARGO_PKG_VERSION"),
            use_efi: ctx.settings.host_path("/sys/firmware/efi").is_dir(),
            swap_file: true,
        };
        let path = dest.join("krill.json");
        let payload = serde_json::to_vec_pretty(&config).context("serializing krill.json")?;
        fs::write(&path, payload).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("installer configuration: {}", path.display());
        Ok(())
    }
}

/// Turns a boot-menu template into final text.
pub trait TemplateRenderer {
    fn render(&self, template: &str, values: &[(&str, String)]) -> Result<String>;
}

/// `{{key}}` substitution. Unknown keys render as empty text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, values: &[(&str, String)]) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let key = after[..end].trim();
            match values.iter().find(|(name, _)| *name == key) {
                Some((_, value)) => out.push_str(value),
                None => tracing::debug!("template key '{}' has no value", key),
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Render the template file at `template` into `dest`.
pub fn render_file(
    renderer: &dyn TemplateRenderer,
    template: &Path,
    dest: &Path,
    values: &[(&str, String)],
) -> Result<()> {
    let text = fs::read_to_string(template)
        .with_context(|| format!("reading template {}", template.display()))?;
    let rendered = renderer.render(&text, values)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(dest, rendered).with_context(|| format!("writing {}", dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;
    use tempfile::TempDir;

    fn values() -> Vec<(&'static str, String)> {
        vec![
            ("vmlinuz", "/live/vmlinuz".to_string()),
            ("kernel_parameters", "boot=live".to_string()),
        ]
    }

    #[test]
    fn placeholders_are_substituted() {
        let out = PlaceholderRenderer
            .render("linux {{vmlinuz}} {{ kernel_parameters }}\n", &values())
            .unwrap();
        assert_eq!(out, "linux /live/vmlinuz boot=live\n");
    }

    #[test]
    fn unknown_and_unterminated_placeholders() {
        let out = PlaceholderRenderer
            .render("a{{missing}}b {{vmlinuz", &values())
            .unwrap();
        assert_eq!(out, "ab {{vmlinuz");
    }

    #[test]
    fn overlay_bind_and_unbind_commands() {
        let temp = TempDir::new().unwrap();
        let paths = WorkPaths::new(temp.path());
        let settings = Settings::default();
        let runner = RecordingRunner::new();

        OverlayBinder.bind(&paths, &settings, &runner).unwrap();
        assert!(paths.snapshot_source.is_dir());
        assert!(paths.overlay_dir().join("upper").is_dir());

        OverlayBinder.unbind(&paths, &runner).unwrap();
        assert!(!paths.overlay_dir().exists());

        let lines = runner.command_lines();
        assert!(lines[0].starts_with("mount -t overlay overlay -o lowerdir=/,upperdir="));
        assert_eq!(
            lines[1],
            format!("umount -l {}", paths.snapshot_source.display())
        );
    }

    #[test]
    fn krill_config_lands_in_snapshot_view() {
        let temp = TempDir::new().unwrap();
        let settings = Settings {
            work_dir: temp.path().join("work"),
            host_root: temp.path().join("host"),
            ..Settings::default()
        };
        let profile = crate::distro::classify("ID=debian\n");
        let ctx = BuildContext::new(profile, settings, Default::default());

        KrillIncubator.configure(&ctx).unwrap();
        let raw = fs::read_to_string(
            ctx.paths
                .snapshot_source
                .join(INSTALLER_DIR)
                .join("krill.json"),
        )
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["distro_target"], "debian");
        assert_eq!(parsed["use_efi"], false);
        assert_eq!(parsed["swap_file"], true);
    }
}
