//! PreFlight: kernel, initrd and the live account.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::accounts::{AccountDatabase, PasswdEntry, FIRST_REGULAR_UID};
use crate::artifact::filesystem::{chown_tree, copy_dir_recursive, running_as_root};
use crate::config::Settings;
use crate::distro::dispatch::initrd_strategy;
use crate::distro::{ArchVariant, Family};
use crate::error::BuildError;
use crate::initrd::{self, InitrdRequest};
use crate::pipeline::BuildContext;
use crate::process::{Cmd, CommandRunner};

/// Login shells probed for the live account, best first.
pub const SHELL_CANDIDATES: &[&str] = &[
    "/bin/bash",
    "/usr/bin/bash",
    "/bin/zsh",
    "/usr/bin/zsh",
    "/bin/ash",
    "/bin/sh",
];

/// Groups the live account joins when they exist.
pub const SUPPLEMENTARY_GROUPS: &[&str] = &[
    "cdrom", "floppy", "audio", "dip", "video", "plugdev", "netdev", "lpadmin", "scanner",
    "bluetooth", "autologin",
];

/// Regular-range account that survives the purge.
pub const PRESERVED_ACCOUNT: &str = "nobody";

pub const LIVE_UID: u32 = 1000;
pub const LIVE_GID: u32 = 1000;

pub fn run(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    for dir in [&ctx.paths.snapshot_source, &ctx.paths.iso_work, &ctx.paths.live_dir] {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let kernel_version = running_kernel(runner)?;
    let source = find_kernel(&ctx.settings, &ctx.family, &kernel_version)?;
    fs::copy(&source, ctx.paths.kernel()).with_context(|| {
        format!(
            "copying kernel {} to {}",
            source.display(),
            ctx.paths.kernel().display()
        )
    })?;
    tracing::info!("kernel {} from {}", kernel_version, source.display());

    let request = InitrdRequest {
        kernel_version: &kernel_version,
        live_dir: &ctx.paths.live_dir,
        iso_work: &ctx.paths.iso_work,
        snapshot_source: &ctx.paths.snapshot_source,
        settings: &ctx.settings,
    };
    initrd::generate(initrd_strategy(&ctx.family), &request, runner)?;
    ctx.kernel_version = Some(kernel_version);

    if ctx.options.keeps_accounts() {
        tracing::info!("keeping host accounts");
    } else {
        prepare_live_accounts(
            &ctx.paths.snapshot_source,
            &ctx.family,
            &ctx.settings,
            runner,
        )?;
    }
    Ok(())
}

fn running_kernel(runner: &dyn CommandRunner) -> Result<String> {
    let result = Cmd::new("uname")
        .arg("-r")
        .error_msg("cannot determine the running kernel")
        .run_with(runner)?;
    let version = result.stdout_trimmed();
    if version.is_empty() {
        return Err(BuildError::configuration("uname -r printed nothing").into());
    }
    Ok(version.to_string())
}

/// Host kernel image paths for `kernel_version`, most specific first.
pub fn kernel_candidates(family: &Family, kernel_version: &str) -> Vec<String> {
    let mut candidates = vec![format!("/boot/vmlinuz-{kernel_version}")];
    match family {
        Family::Arch(ArchVariant::Arch) => candidates.push("/boot/vmlinuz-linux".to_string()),
        Family::Arch(_) => {
            let mut parts = kernel_version.split('.');
            if let (Some(major), Some(minor)) = (parts.next(), parts.next()) {
                candidates.push(format!("/boot/vmlinuz-{major}.{minor}-x86_64"));
            }
        }
        Family::Alpine => {
            candidates.push("/boot/vmlinuz-lts".to_string());
            candidates.push("/boot/vmlinuz-virt".to_string());
        }
        Family::Fedora | Family::OpenMamba | Family::Opensuse => {
            candidates.push(format!("/usr/lib/modules/{kernel_version}/vmlinuz"));
        }
        Family::Debian | Family::Void | Family::Unknown(_) => {}
    }
    candidates.push("/boot/vmlinuz".to_string());
    candidates
}

fn find_kernel(settings: &Settings, family: &Family, kernel_version: &str) -> Result<PathBuf> {
    let candidates = kernel_candidates(family, kernel_version);
    candidates
        .iter()
        .map(|candidate| settings.host_path(candidate))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            BuildError::filesystem(
                settings.host_path(&candidates[0]),
                format!("no kernel image for {kernel_version} (tried {})", candidates.join(", ")),
            )
            .into()
        })
}

/// Replace the regular accounts under `root` with a single live account.
pub fn prepare_live_accounts(
    root: &Path,
    family: &Family,
    settings: &Settings,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let mut db = AccountDatabase::load(root)?;

    for username in db.regular_usernames(FIRST_REGULAR_UID) {
        if username != PRESERVED_ACCOUNT {
            tracing::debug!("removing account '{}'", username);
            db.remove_user(&username);
        }
    }

    let user = settings.live_user.as_str();
    let home = format!("/home/{user}");
    let shell = login_shell(root);
    db.add_user(
        PasswdEntry {
            username: user.to_string(),
            password_placeholder: "x".to_string(),
            uid: LIVE_UID,
            gid: LIVE_GID,
            comment: settings.live_user_fullname.clone(),
            home: home.clone(),
            shell: shell.to_string(),
        },
        &settings.live_password,
    )?;

    let admin = family.admin_group();
    if !db.add_user_to_group(user, admin) {
        tracing::warn!("administrative group '{}' missing, live user has no admin rights", admin);
    }
    for group in SUPPLEMENTARY_GROUPS {
        db.add_user_to_group(user, group);
    }
    if !db.set_password("root", &settings.root_password)? {
        tracing::warn!("root has no shadow entry, root password unchanged");
    }
    db.save(family, runner)?;

    create_home(root, &home)?;
    tracing::info!("live account '{}' ({}) prepared", user, shell);
    Ok(())
}

/// First shell of [`SHELL_CANDIDATES`] present under `root`.
pub fn login_shell(root: &Path) -> &'static str {
    SHELL_CANDIDATES
        .iter()
        .copied()
        .find(|shell| root.join(shell.trim_start_matches('/')).exists())
        .unwrap_or("/bin/sh")
}

fn create_home(root: &Path, home: &str) -> Result<()> {
    let home_dir = root.join(home.trim_start_matches('/'));
    if home_dir.exists() {
        fs::remove_dir_all(&home_dir)
            .with_context(|| format!("removing stale {}", home_dir.display()))?;
    }

    let skel = root.join("etc/skel");
    if skel.is_dir() {
        copy_dir_recursive(&skel, &home_dir)?;
    } else {
        tracing::warn!("{} missing, live home starts empty", skel.display());
        fs::create_dir_all(&home_dir)
            .with_context(|| format!("creating {}", home_dir.display()))?;
    }
    fs::set_permissions(&home_dir, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("chmod {}", home_dir.display()))?;

    if running_as_root() {
        chown_tree(&home_dir, LIVE_UID, LIVE_GID)?;
    } else {
        tracing::warn!("not running as root, {} keeps the current owner", home_dir.display());
    }
    Ok(())
}
