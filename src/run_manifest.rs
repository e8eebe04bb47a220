use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const RUN_MANIFEST_FILENAME: &str = "run-manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

/// Record of one production run, rewritten after every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub status: RunStatus,
    pub created_at_utc: String,
    pub finished_at_utc: Option<String>,
    pub distro_id: String,
    pub family: String,
    pub volume_id: Option<String>,
    pub iso: Option<PathBuf>,
    pub completed_stages: Vec<String>,
    pub error: Option<String>,
}

impl RunManifest {
    pub fn start(distro_id: &str, family: &str) -> Self {
        let created_at_utc = now_utc_compact();
        Self {
            run_id: format!("{}-{}", created_at_utc, std::process::id()),
            status: RunStatus::Running,
            created_at_utc,
            finished_at_utc: None,
            distro_id: distro_id.to_string(),
            family: family.to_string(),
            volume_id: None,
            iso: None,
            completed_stages: Vec::new(),
            error: None,
        }
    }

    pub fn finish(&mut self, outcome: &Result<PathBuf>) {
        self.finished_at_utc = Some(now_utc_compact());
        match outcome {
            Ok(iso) => {
                self.status = RunStatus::Success;
                self.iso = Some(iso.clone());
            }
            Err(err) => {
                self.status = RunStatus::Failed;
                self.error = Some(format!("{:#}", err));
            }
        }
    }
}

pub fn manifest_path(work_dir: &Path) -> PathBuf {
    work_dir.join(RUN_MANIFEST_FILENAME)
}

pub fn write_run_manifest(work_dir: &Path, manifest: &RunManifest) -> Result<PathBuf> {
    let path = manifest_path(work_dir);
    write_json_atomic(&path, manifest)
        .with_context(|| format!("writing run manifest '{}'", path.display()))?;
    Ok(path)
}

/// Manifest of the last run in `work_dir`, if any.
pub fn load_run_manifest(work_dir: &Path) -> Result<Option<RunManifest>> {
    let path = manifest_path(work_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let bytes =
        fs::read(&path).with_context(|| format!("reading run manifest '{}'", path.display()))?;
    let parsed = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing run manifest '{}'", path.display()))?;
    Ok(Some(parsed))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).context("serializing run manifest")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

pub(crate) fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
