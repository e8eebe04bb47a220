//! Production pipeline.
//!
//! [`Orchestrator`] runs the stages in order on one [`BuildContext`]:
//!
//! ```text
//! Identify → Bind → PreFlight → Incubator → Squash → BootloaderInject
//!          → Theme → BootloaderConfigure → CleanIsoRoot → Assemble → Unbind
//! ```
//!
//! Unbind runs on every exit path once Bind has started, including a
//! panic in a later stage. The first stage error aborts the run and is
//! returned after Unbind; nothing is retried. Progress is recorded in
//! `<work_dir>/run-manifest.json`.

pub mod collaborators;
pub mod context;

pub use collaborators::{
    Binder, Incubator, KrillIncubator, OverlayBinder, PlaceholderRenderer, TemplateRenderer,
};
pub use context::{volume_id, BuildContext, PipelineOptions, Stage, WorkPaths};

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Settings;
use crate::distro::DistroProfile;
use crate::process::CommandRunner;
use crate::run_manifest::{write_run_manifest, RunManifest};
use crate::stages;

/// External parts of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub runner: &'a dyn CommandRunner,
    pub binder: &'a dyn Binder,
    pub incubator: &'a dyn Incubator,
    pub renderer: &'a dyn TemplateRenderer,
}

pub struct Orchestrator<'a> {
    ctx: BuildContext,
    with: Collaborators<'a>,
    manifest: RunManifest,
}

impl<'a> Orchestrator<'a> {
    /// The profile is resolved by the caller; every family decision of the
    /// run derives from it.
    pub fn new(
        profile: DistroProfile,
        settings: Settings,
        options: PipelineOptions,
        with: Collaborators<'a>,
    ) -> Self {
        let ctx = BuildContext::new(profile, settings, options);
        let manifest = RunManifest::start(&ctx.profile.id, &ctx.family.to_string());
        Self {
            ctx,
            with,
            manifest,
        }
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Run every stage. Returns the ISO path.
    pub fn run(mut self) -> Result<PathBuf> {
        let outcome = self.produce();
        self.manifest.finish(&outcome);
        self.record_progress();
        outcome
    }

    fn produce(&mut self) -> Result<PathBuf> {
        tracing::info!(
            "producing {} ({}, family {}, volume {})",
            self.ctx.profile.display_name,
            self.ctx.profile.codename,
            self.ctx.family,
            self.ctx.volume_id
        );
        self.manifest.volume_id = Some(self.ctx.volume_id.clone());
        self.complete(Stage::Identify);

        let guard = UnbindGuard {
            binder: self.with.binder,
            runner: self.with.runner,
            paths: self.ctx.paths.clone(),
            done: false,
        };
        let produced = self.bound_stages();
        let unbound = guard.finish();

        match (produced, unbound) {
            (Ok(iso), Ok(())) => {
                self.complete(Stage::Unbind);
                Ok(iso)
            }
            (Ok(_), Err(err)) => Err(err.context("stage 'unbind' failed")),
            (Err(err), Ok(())) => {
                self.complete(Stage::Unbind);
                Err(err)
            }
            (Err(err), Err(unbind_err)) => {
                tracing::error!("unbind after failure also failed: {:#}", unbind_err);
                Err(err)
            }
        }
    }

    fn bound_stages(&mut self) -> Result<PathBuf> {
        let with = self.with;
        self.stage(Stage::Bind, |ctx| {
            with.binder.bind(&ctx.paths, &ctx.settings, with.runner)
        })?;
        self.stage(Stage::PreFlight, |ctx| {
            stages::s03_preflight::run(ctx, with.runner)
        })?;
        self.stage(Stage::Incubator, |ctx| with.incubator.configure(ctx))?;
        self.stage(Stage::Squash, |ctx| stages::s05_squash::run(ctx, with.runner))?;
        self.stage(Stage::BootloaderInject, |ctx| {
            stages::s06_bootloader_inject::run(ctx, with.runner).map(drop)
        })?;
        self.stage(Stage::Theme, |ctx| {
            stages::s07_theme::run(ctx, with.runner).map(drop)
        })?;
        self.stage(Stage::BootloaderConfigure, |ctx| {
            stages::s08_bootloader_configure::run(ctx, with.runner, with.renderer)
        })?;
        self.stage(Stage::CleanIsoRoot, |ctx| {
            stages::s09_clean_iso_root::run(ctx).map(drop)
        })?;
        self.stage(Stage::Assemble, |ctx| stages::s10_assemble::run(ctx, with.runner))
    }

    fn stage<T>(
        &mut self,
        stage: Stage,
        body: impl FnOnce(&mut BuildContext) -> Result<T>,
    ) -> Result<T> {
        tracing::info!("stage {}", stage);
        let value = body(&mut self.ctx).with_context(|| format!("stage '{}' failed", stage))?;
        self.complete(stage);
        Ok(value)
    }

    fn complete(&mut self, stage: Stage) {
        self.ctx.completed.push(stage);
        self.record_progress();
    }

    fn record_progress(&mut self) {
        self.manifest.completed_stages = self
            .ctx
            .completed
            .iter()
            .map(|stage| stage.name().to_string())
            .collect();
        if let Err(err) = write_run_manifest(&self.ctx.paths.work_dir, &self.manifest) {
            tracing::warn!("run manifest not updated: {:#}", err);
        }
    }
}

/// Tears down the snapshot view. [`UnbindGuard::finish`] reports the
/// outcome; a guard dropped without it (panic) still unbinds and logs.
struct UnbindGuard<'a> {
    binder: &'a dyn Binder,
    runner: &'a dyn CommandRunner,
    paths: WorkPaths,
    done: bool,
}

impl UnbindGuard<'_> {
    fn finish(mut self) -> Result<()> {
        self.done = true;
        tracing::info!("stage {}", Stage::Unbind);
        self.binder.unbind(&self.paths, self.runner)
    }
}

impl Drop for UnbindGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(err) = self.binder.unbind(&self.paths, self.runner) {
            tracing::error!("unbind during unwinding failed: {:#}", err);
        }
    }
}
