//! End-to-end pipeline runs against a fake Debian host.
//!
//! External tools are recorded, never run; the snapshot view is a plain
//! copy of the fake host.

mod helpers;

use std::fs;
use std::panic::{self, AssertUnwindSafe};

use helpers::{debian_runner, FixtureBinder, TestEnv};
use live_remaster::accounts::AccountDatabase;
use live_remaster::artifact::iso::checksum_path;
use live_remaster::pipeline::{
    BuildContext, Collaborators, Incubator, KrillIncubator, Orchestrator, PipelineOptions,
    PlaceholderRenderer, Stage,
};
use live_remaster::process::RecordingRunner;
use live_remaster::run_manifest::{load_run_manifest, RunStatus};
use live_remaster::{BuildError, DistroProfile};

fn run_pipeline(
    env: &TestEnv,
    options: PipelineOptions,
    runner: &RecordingRunner,
    binder: &FixtureBinder,
) -> anyhow::Result<std::path::PathBuf> {
    let profile = DistroProfile::detect(&env.os_release());
    let with = Collaborators {
        runner,
        binder,
        incubator: &KrillIncubator,
        renderer: &PlaceholderRenderer,
    };
    Orchestrator::new(profile, env.settings.clone(), options, with).run()
}

fn stage_names(stages: &[Stage]) -> Vec<String> {
    stages.iter().map(|s| s.name().to_string()).collect()
}

#[test]
fn test_full_run_produces_iso() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);

    let iso = run_pipeline(&env, PipelineOptions::default(), &runner, &binder).unwrap();

    assert!(iso.is_file());
    assert!(checksum_path(&iso).is_file());
    assert!(iso
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("egg-of_debian_bookworm_"));
    assert_eq!(binder.unbinds.get(), 1);

    let manifest = load_run_manifest(&env.settings.work_dir).unwrap().unwrap();
    assert_eq!(manifest.status, RunStatus::Success);
    assert_eq!(manifest.completed_stages, stage_names(&Stage::ALL));
    assert_eq!(
        manifest.volume_id.as_deref(),
        Some("EGG_OF_DEBIAN_GNU_LINUX_BOOKWO")
    );
}

#[test]
fn test_tools_run_in_stage_order() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);
    run_pipeline(&env, PipelineOptions::default(), &runner, &binder).unwrap();

    let programs: Vec<String> = runner
        .command_lines()
        .iter()
        .map(|line| line.split(' ').next().unwrap().to_string())
        .collect();
    let position = |program: &str| programs.iter().position(|p| p == program).unwrap();

    assert!(position("uname") < position("chroot"));
    assert!(position("chroot") < position("mksquashfs"));
    assert!(position("mksquashfs") < position("rsync"));
    assert!(position("rsync") < position("grub-mkimage"));
    assert!(position("grub-mkimage") < position("xorriso"));
    assert_eq!(programs.last().map(String::as_str), Some("xorriso"));
}

#[test]
fn test_preflight_replaces_host_accounts() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);
    run_pipeline(&env, PipelineOptions::default(), &runner, &binder).unwrap();

    let snapshot = env.snapshot();
    let db = AccountDatabase::load(&snapshot).unwrap();
    assert!(db.user("alice").is_none());
    assert!(db.user("nobody").is_some());
    let live = db.user("live").unwrap();
    assert_eq!((live.uid, live.gid), (1000, 1000));
    assert_eq!(live.shell, "/bin/bash");
    assert_eq!(db.group("sudo").unwrap().members, ["live"]);
    assert_eq!(db.group("cdrom").unwrap().members, ["live"]);

    let subuid = fs::read_to_string(snapshot.join("etc/subuid")).unwrap();
    assert_eq!(subuid, "live:100000:65536\n");
    assert_eq!(
        fs::read_to_string(snapshot.join("home/live/.bashrc")).unwrap(),
        "# live\n"
    );

    // The host itself is untouched.
    let host_passwd = fs::read_to_string(env.host.join("etc/passwd")).unwrap();
    assert!(host_passwd.contains("alice:x:1000"));

    // Kernel and generated initrd are in the live tree.
    let live_dir = env.settings.work_dir.join("iso/live");
    assert_eq!(fs::read_to_string(live_dir.join("vmlinuz")).unwrap(), "kernel");
    assert_eq!(fs::read_to_string(live_dir.join("initrd.img")).unwrap(), "initrd");
}

#[test]
fn test_snapshot_excludes_private_data() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);
    run_pipeline(&env, PipelineOptions::default(), &runner, &binder).unwrap();

    let args = runner.calls_to("mksquashfs")[0].arguments().to_vec();
    for pattern in ["home/alice", "root/*", "etc/fstab", "etc/rc0.d/K01cryptdisks"] {
        assert!(args.iter().any(|a| a == pattern), "missing {pattern}");
    }
    assert!(!args.iter().any(|a| a == "home/live"));
    assert!(!args.iter().any(|a| a.starts_with('/') && a.contains("fstab")));
}

#[test]
fn test_boot_menus_rendered() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);
    run_pipeline(&env, PipelineOptions::default(), &runner, &binder).unwrap();

    let iso_root = env.settings.work_dir.join("iso");
    let isolinux = fs::read_to_string(iso_root.join("isolinux/isolinux.cfg")).unwrap();
    assert!(isolinux.contains("MENU TITLE DEBIAN GNU/LINUX BOOKWORM"));
    assert!(isolinux.contains(
        "APPEND initrd=/live/initrd.img boot=live components locales=en_US.UTF-8 cow_spacesize=2G"
    ));
    let grub = fs::read_to_string(iso_root.join("boot/grub/grub.cfg")).unwrap();
    assert!(grub.contains("linux /live/vmlinuz boot=live"));
    assert_eq!(
        fs::read_to_string(iso_root.join("isolinux/splash.png")).unwrap(),
        "png"
    );
    assert!(iso_root.join("EFI/efiboot.img").is_file());
}

#[test]
fn test_clone_keeps_accounts_and_home() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);
    let options = PipelineOptions {
        clone: true,
        ..Default::default()
    };
    run_pipeline(&env, options, &runner, &binder).unwrap();

    let db = AccountDatabase::load(&env.snapshot()).unwrap();
    assert!(db.user("alice").is_some());
    assert!(db.user("live").is_none());

    let args = runner.calls_to("mksquashfs")[0].arguments().to_vec();
    assert!(!args.iter().any(|a| a.starts_with("home/")));
}

#[test]
fn test_homecrypt_without_clone_replaces_accounts() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);
    let options = PipelineOptions {
        homecrypt: true,
        ..Default::default()
    };
    run_pipeline(&env, options, &runner, &binder).unwrap();

    let db = AccountDatabase::load(&env.snapshot()).unwrap();
    assert!(db.user("alice").is_none());
    assert!(db.user("live").is_some());

    let args = runner.calls_to("mksquashfs")[0].arguments().to_vec();
    assert!(args.iter().any(|a| a == "home/alice"));
}

#[test]
fn test_clone_with_homecrypt_keeps_accounts_and_home() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);
    let options = PipelineOptions {
        clone: true,
        homecrypt: true,
        ..Default::default()
    };
    run_pipeline(&env, options, &runner, &binder).unwrap();

    let db = AccountDatabase::load(&env.snapshot()).unwrap();
    assert!(db.user("alice").is_some());
    assert!(db.user("live").is_none());

    let args = runner.calls_to("mksquashfs")[0].arguments().to_vec();
    assert!(!args.iter().any(|a| a.starts_with("home/")));
}

#[test]
fn test_stage_failure_still_unbinds() {
    let env = TestEnv::new();
    let runner = debian_runner().fail("mksquashfs", 1, "no space left on device");
    let binder = FixtureBinder::new(&env.host);

    let err = run_pipeline(&env, PipelineOptions::default(), &runner, &binder).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::ExternalTool { .. })
    ));
    assert!(format!("{:#}", err).contains("stage 'squash' failed"));
    assert_eq!(binder.unbinds.get(), 1);
    assert!(!runner.invoked("xorriso"));

    let manifest = load_run_manifest(&env.settings.work_dir).unwrap().unwrap();
    assert_eq!(manifest.status, RunStatus::Failed);
    assert_eq!(
        manifest.completed_stages,
        ["identify", "bind", "preflight", "incubator", "unbind"]
    );
}

#[test]
fn test_bind_failure_still_unbinds() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder {
        fail_bind: true,
        ..FixtureBinder::new(&env.host)
    };

    let err = run_pipeline(&env, PipelineOptions::default(), &runner, &binder).unwrap_err();
    assert!(format!("{:#}", err).contains("overlay mount refused"));
    assert_eq!(binder.unbinds.get(), 1);
    assert!(!runner.invoked("uname"));
}

#[test]
fn test_stage_error_wins_over_unbind_error() {
    let env = TestEnv::new();
    fs::remove_file(env.host.join("boot/vmlinuz-6.1.0-18-amd64")).unwrap();
    let runner = debian_runner();
    let binder = FixtureBinder {
        fail_unbind: true,
        ..FixtureBinder::new(&env.host)
    };

    let err = run_pipeline(&env, PipelineOptions::default(), &runner, &binder).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::Filesystem { .. })
    ));
    assert_eq!(binder.unbinds.get(), 1);
}

#[test]
fn test_unbind_failure_after_success_is_reported() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder {
        fail_unbind: true,
        ..FixtureBinder::new(&env.host)
    };

    let err = run_pipeline(&env, PipelineOptions::default(), &runner, &binder).unwrap_err();
    assert!(format!("{:#}", err).contains("target is busy"));
}

struct PanickingIncubator;

impl Incubator for PanickingIncubator {
    fn configure(&self, _: &BuildContext) -> anyhow::Result<()> {
        panic!("installer templates corrupted");
    }
}

#[test]
fn test_panic_in_stage_still_unbinds() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);
    let profile = DistroProfile::detect(&env.os_release());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let with = Collaborators {
            runner: &runner,
            binder: &binder,
            incubator: &PanickingIncubator,
            renderer: &PlaceholderRenderer,
        };
        Orchestrator::new(profile, env.settings.clone(), PipelineOptions::default(), with).run()
    }));

    assert!(outcome.is_err());
    assert_eq!(binder.unbinds.get(), 1);
}

#[test]
fn test_script_only_writes_replay_scripts() {
    let env = TestEnv::new();
    let runner = debian_runner();
    let binder = FixtureBinder::new(&env.host);
    let options = PipelineOptions {
        script_only: true,
        ..Default::default()
    };
    run_pipeline(&env, options, &runner, &binder).unwrap();

    assert!(!runner.invoked("mksquashfs"));
    assert!(!runner.invoked("xorriso"));
    let work = &env.settings.work_dir;
    assert!(fs::read_to_string(work.join("mksquashfs.sh"))
        .unwrap()
        .contains("mksquashfs "));
    assert!(fs::read_to_string(work.join("mkisofs.sh"))
        .unwrap()
        .contains("xorriso -as mkisofs"));
}
