//! Remaster a running Linux host into a hybrid BIOS+UEFI live ISO.
//!
//! The crate classifies the host distribution and drives a fixed sequence
//! of stages over a snapshot view of the host:
//!
//! - **Distro identification** - os-release parsing and family dispatch
//! - **Account database** - atomic rewrite of passwd/shadow/group and friends
//! - **Exclusions** - what the squashfs snapshot leaves out
//! - **Initrd** - per-family generators, including guarded hook patching
//! - **Pipeline** - stage ordering with guaranteed teardown
//!
//! # Architecture
//!
//! ```text
//! live-remaster (binary)
//!     │
//!     ├── DistroProfile::detect ──► Family ──► dispatch tables
//!     │
//!     └── pipeline::Orchestrator
//!             ├── Binder        (snapshot view)
//!             ├── stages::*     (kernel, accounts, squashfs, boot, ISO)
//!             ├── Incubator     (installer handoff)
//!             └── CommandRunner (every external tool)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use live_remaster::pipeline::{
//!     Collaborators, KrillIncubator, Orchestrator, OverlayBinder, PlaceholderRenderer,
//! };
//! use live_remaster::{DistroProfile, Settings, SystemRunner};
//!
//! let profile = DistroProfile::detect(Path::new("/etc/os-release"));
//! let with = Collaborators {
//!     runner: &SystemRunner,
//!     binder: &OverlayBinder,
//!     incubator: &KrillIncubator,
//!     renderer: &PlaceholderRenderer,
//! };
//! let iso = Orchestrator::new(profile, Settings::default(), Default::default(), with).run()?;
//! ```

pub mod accounts;
pub mod artifact;
pub mod config;
pub mod distro;
pub mod error;
pub mod exclusion;
pub mod initrd;
pub mod package_cache;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod run_manifest;
pub mod stages;

pub use config::{Compression, Settings};
pub use distro::{DistroProfile, Family};
pub use error::BuildError;
pub use pipeline::{Orchestrator, PipelineOptions};
pub use process::{Cmd, CommandRunner, RecordingRunner, SystemRunner};
