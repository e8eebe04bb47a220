//! Host identification.
//!
//! - [`DistroProfile`] - what `/etc/os-release` says about the host
//! - [`family`] - the closed set of distribution families
//! - [`dispatch`] - per-family decision tables

pub mod dispatch;
pub mod family;

pub use family::{ArchVariant, Family};

use std::fs;
use std::path::Path;

/// Value used for every field the identification source does not provide.
pub const UNKNOWN: &str = "unknown";

/// Immutable description of the host distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistroProfile {
    pub id: String,
    pub family_id: String,
    pub release_id: String,
    pub codename: String,
    pub display_name: String,
}

impl Default for DistroProfile {
    fn default() -> Self {
        Self {
            id: UNKNOWN.to_string(),
            family_id: UNKNOWN.to_string(),
            release_id: "0".to_string(),
            codename: UNKNOWN.to_string(),
            display_name: "Unknown Linux".to_string(),
        }
    }
}

impl DistroProfile {
    /// Read and classify an os-release file. Never fails: a missing or
    /// unreadable file yields the all-unknown profile.
    pub fn detect(os_release: &Path) -> Self {
        match fs::read_to_string(os_release) {
            Ok(text) => classify(&text),
            Err(err) => {
                tracing::warn!(
                    "cannot read {} ({}), distribution is unknown",
                    os_release.display(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn family(&self) -> Family {
        Family::from_profile(self)
    }
}

/// Parse `KEY=value` os-release text.
///
/// `ID_LIKE` contributes its first whitespace-separated token; an empty or
/// absent `ID_LIKE` makes the family fall back to `ID`.
pub fn classify(text: &str) -> DistroProfile {
    let mut profile = DistroProfile::default();
    let mut family_hint: Option<String> = None;

    for line in text.lines() {
        let Some((key, raw)) = line.trim().split_once('=') else {
            continue;
        };
        let value = clean_value(raw);
        match key.trim() {
            "ID" if !value.is_empty() => profile.id = value,
            "ID_LIKE" => {
                family_hint = value.split_whitespace().next().map(str::to_string);
            }
            "VERSION_ID" if !value.is_empty() => profile.release_id = value,
            "VERSION_CODENAME" if !value.is_empty() => profile.codename = value,
            "NAME" if !value.is_empty() => profile.display_name = value,
            _ => {}
        }
    }

    profile.family_id = family_hint.unwrap_or_else(|| profile.id.clone());
    profile
}

/// Trims whitespace and one matching pair of outer quotes.
fn clean_value(raw: &str) -> String {
    let value = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q)?.strip_suffix(*q))
        .unwrap_or(value);
    unquoted.trim().to_string()
}
