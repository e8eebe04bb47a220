use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use live_remaster::distro::dispatch::initrd_strategy;
use live_remaster::pipeline::{
    Collaborators, KrillIncubator, Orchestrator, OverlayBinder, PipelineOptions,
    PlaceholderRenderer,
};
use live_remaster::process::{CommandRunner, RecordingRunner, SystemRunner};
use live_remaster::{artifact, package_cache, preflight, DistroProfile, Settings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG: &str = "/etc/live-remaster.d/live-remaster.toml";

fn usage() -> &'static str {
    "Usage:\n  live-remaster produce [--clone|--homecrypt|--fullcrypt] [--fast|--max] [--verbose] [--script-only] [--include-root-home] [--config <file>]\n  live-remaster clean [--dry-run] [--config <file>]\n  live-remaster detect [--config <file>]\n  live-remaster check [--config <file>]"
}

fn main() -> Result<()> {
    init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, rest @ ..] if cmd == "produce" => produce(rest),
        [cmd, rest @ ..] if cmd == "clean" => clean(rest),
        [cmd, rest @ ..] if cmd == "detect" => detect(rest),
        [cmd, rest @ ..] if cmd == "check" => check(rest),
        _ => bail!(usage()),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[derive(Default)]
struct Flags {
    options: PipelineOptions,
    dry_run: bool,
    config: Option<PathBuf>,
}

fn parse_flags(args: &[String], allowed: &[&str]) -> Result<Flags> {
    let mut flags = Flags::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let arg = arg.as_str();
        if arg != "--config" && !allowed.contains(&arg) {
            bail!("unexpected argument '{}'\n{}", arg, usage());
        }
        match arg {
            "--config" => {
                let path = iter.next().context("--config needs a file")?;
                flags.config = Some(PathBuf::from(path));
            }
            "--clone" => flags.options.clone = true,
            "--homecrypt" => flags.options.homecrypt = true,
            "--fullcrypt" => flags.options.fullcrypt = true,
            "--fast" => flags.options.fast = true,
            "--max" => flags.options.max = true,
            "--verbose" => flags.options.verbose = true,
            "--script-only" => flags.options.script_only = true,
            "--include-root-home" => flags.options.include_root_home = true,
            "--dry-run" => flags.dry_run = true,
            _ => bail!("unexpected argument '{}'\n{}", arg, usage()),
        }
    }
    Ok(flags)
}

fn load_settings(flags: &Flags) -> Result<Settings> {
    match &flags.config {
        Some(path) => Settings::load(path),
        None => Settings::load_or_default(Path::new(DEFAULT_CONFIG)),
    }
}

fn detect_profile(settings: &Settings) -> DistroProfile {
    DistroProfile::detect(&settings.host_path("/etc/os-release"))
}

fn produce(args: &[String]) -> Result<()> {
    let flags = parse_flags(
        args,
        &[
            "--clone",
            "--homecrypt",
            "--fullcrypt",
            "--fast",
            "--max",
            "--verbose",
            "--script-only",
            "--include-root-home",
        ],
    )?;
    let settings = load_settings(&flags)?;
    let profile = detect_profile(&settings);

    let strategy = initrd_strategy(&profile.family());
    preflight::check_host(strategy, &settings.work_dir)?;
    if !artifact::filesystem::running_as_root() {
        tracing::warn!("not running as root, mounting and ownership changes will fail");
    }

    let with = Collaborators {
        runner: &SystemRunner,
        binder: &OverlayBinder,
        incubator: &KrillIncubator,
        renderer: &PlaceholderRenderer,
    };
    let iso = Orchestrator::new(profile, settings, flags.options, with).run()?;
    println!("{}", iso.display());
    Ok(())
}

fn clean(args: &[String]) -> Result<()> {
    let flags = parse_flags(args, &["--dry-run"])?;
    let settings = load_settings(&flags)?;
    let family = detect_profile(&settings).family();

    if flags.dry_run {
        let recorder = RecordingRunner::new();
        run_cleanup(&family, &recorder)?;
        for line in recorder.command_lines() {
            println!("{}", line);
        }
        return Ok(());
    }
    run_cleanup(&family, &SystemRunner)
}

fn run_cleanup(family: &live_remaster::Family, runner: &dyn CommandRunner) -> Result<()> {
    let report = package_cache::clean_package_cache(family, runner)?;
    tracing::info!(
        "{} cleanup steps run, {} tolerated failures",
        report.executed,
        report.tolerated_failures.len()
    );
    Ok(())
}

fn detect(args: &[String]) -> Result<()> {
    let flags = parse_flags(args, &[])?;
    let settings = load_settings(&flags)?;
    let profile = detect_profile(&settings);
    let family = profile.family();

    println!("id:        {}", profile.id);
    println!("family id: {}", profile.family_id);
    println!("release:   {}", profile.release_id);
    println!("codename:  {}", profile.codename);
    println!("name:      {}", profile.display_name);
    println!("family:    {}", family);
    println!("initrd:    {}", initrd_strategy(&family).tool());
    println!(
        "volume id: {}",
        live_remaster::pipeline::volume_id(
            &settings.snapshot_prefix,
            &profile.display_name,
            &profile.codename
        )
    );
    Ok(())
}

fn check(args: &[String]) -> Result<()> {
    let flags = parse_flags(args, &[])?;
    let settings = load_settings(&flags)?;
    let family = detect_profile(&settings).family();

    if !artifact::filesystem::running_as_root() {
        tracing::warn!("not running as root, most stages will fail");
    }
    preflight::check_host(initrd_strategy(&family), &settings.work_dir)
}
