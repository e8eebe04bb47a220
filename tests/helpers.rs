//! Shared fixtures for pipeline tests.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use live_remaster::artifact::filesystem::copy_dir_recursive;
use live_remaster::pipeline::{Binder, WorkPaths};
use live_remaster::process::{Cmd, CommandRunner, RecordingRunner};
use live_remaster::Settings;
use tempfile::TempDir;

pub const KERNEL_VERSION: &str = "6.1.0-18-amd64";

/// A fake Debian host plus theme and work directories under one temp dir.
pub struct TestEnv {
    pub _temp_dir: TempDir,
    pub host: PathBuf,
    pub settings: Settings,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let host = base.join("host");
        create_debian_host(&host);
        create_theme(&base.join("theme"));

        let settings = Settings {
            work_dir: base.join("work"),
            config_dir: base.join("config"),
            install_prefix: base.join("prefix"),
            local_bootloaders: base.join("bootloaders"),
            theme_dir: base.join("theme"),
            host_root: host.clone(),
            hook_backup_dir: base.join("backup"),
            locale: Some("en_US.UTF-8".to_string()),
            ..Settings::default()
        };

        Self {
            _temp_dir: temp_dir,
            host,
            settings,
        }
    }

    pub fn os_release(&self) -> PathBuf {
        self.settings.host_path("/etc/os-release")
    }

    pub fn snapshot(&self) -> PathBuf {
        WorkPaths::new(&self.settings.work_dir).snapshot_source
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn create_debian_host(host: &Path) {
    write(
        &host.join("etc/os-release"),
        "PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\nNAME=\"Debian GNU/Linux\"\n\
         VERSION_ID=\"12\"\nVERSION_CODENAME=bookworm\nID=debian\n",
    );
    write(
        &host.join("etc/passwd"),
        "root:x:0:0:root:/root:/bin/bash\n\
         alice:x:1000:1000:Alice,,,:/home/alice:/bin/bash\n\
         nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin\n",
    );
    write(
        &host.join("etc/shadow"),
        "root:$6$old$hash:19000:0:99999:7:::\nalice:$6$a$b:19000:0:99999:7:::\nnobody:*:19000:0:99999:7:::\n",
    );
    write(
        &host.join("etc/group"),
        "root:x:0:\nsudo:x:27:alice\ncdrom:x:24:alice\nalice:x:1000:\nnogroup:x:65534:\n",
    );
    write(&host.join("etc/gshadow"), "root:*::\nsudo:*::alice\nalice:!::\n");
    write(&host.join("etc/subuid"), "alice:100000:65536\n");
    write(&host.join("etc/subgid"), "alice:100000:65536\n");
    write(&host.join("etc/skel/.bashrc"), "# live\n");
    write(&host.join("etc/rc0.d/K01cryptdisks"), "");
    write(&host.join("bin/bash"), "");
    write(&host.join("home/alice/secret.txt"), "private");
    write(&host.join(format!("boot/vmlinuz-{KERNEL_VERSION}")), "kernel");
    write(&host.join("usr/lib/ISOLINUX/isolinux.bin"), "isolinux");
    write(&host.join("usr/lib/syslinux/modules/bios/ldlinux.c32"), "ldlinux");
    fs::create_dir_all(host.join("usr/lib/grub")).unwrap();
    fs::create_dir_all(host.join("tmp")).unwrap();
}

fn create_theme(theme: &Path) {
    write(
        &theme.join("livecd/isolinux.main.cfg"),
        "MENU TITLE {{fullname}}\nLABEL live\n  KERNEL {{vmlinuz}}\n  APPEND initrd={{initrdImg}} {{kernel_parameters}}\n",
    );
    write(
        &theme.join("livecd/grub.main.cfg"),
        "menuentry \"{{fullname}}\" {\n  linux {{vmlinuz}} {{kernel_parameters}}\n  initrd {{initrdImg}}\n}\n",
    );
    write(&theme.join("livecd/splash.png"), "png");
}

/// Runner answering the tools a Debian run needs: `uname`, the chroot
/// initrd build and xorriso's output file.
pub fn debian_runner() -> RecordingRunner {
    RecordingRunner::new()
        .respond("uname", &format!("{KERNEL_VERSION}\n"))
        .on_run("chroot", |cmd| {
            let root = Path::new(&cmd.arguments()[0]);
            fs::write(root.join("tmp/initrd.img"), "initrd")
        })
        .on_run("xorriso", write_xorriso_output)
}

fn write_xorriso_output(cmd: &Cmd) -> std::io::Result<()> {
    let args = cmd.arguments();
    match args.iter().position(|a| a == "-output") {
        Some(at) => fs::write(&args[at + 1], "iso9660"),
        None => Ok(()),
    }
}

/// Binder that copies the fake host into the snapshot view.
#[derive(Default)]
pub struct FixtureBinder {
    pub host: PathBuf,
    pub fail_bind: bool,
    pub fail_unbind: bool,
    pub unbinds: Cell<usize>,
}

impl FixtureBinder {
    pub fn new(host: &Path) -> Self {
        Self {
            host: host.to_path_buf(),
            ..Self::default()
        }
    }
}

impl Binder for FixtureBinder {
    fn bind(&self, paths: &WorkPaths, _: &Settings, _: &dyn CommandRunner) -> Result<()> {
        if self.fail_bind {
            bail!("overlay mount refused");
        }
        copy_dir_recursive(&self.host, &paths.snapshot_source)
    }

    fn unbind(&self, _: &WorkPaths, _: &dyn CommandRunner) -> Result<()> {
        self.unbinds.set(self.unbinds.get() + 1);
        if self.fail_unbind {
            bail!("target is busy");
        }
        Ok(())
    }
}
