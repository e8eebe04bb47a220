//! Stage implementations driven by [`crate::pipeline::Orchestrator`].
//!
//! Identify, Bind, Incubator and Unbind are handled by the orchestrator
//! through its collaborators; the stages below own real work.

pub mod s03_preflight;
pub mod s05_squash;
pub mod s06_bootloader_inject;
pub mod s07_theme;
pub mod s08_bootloader_configure;
pub mod s09_clean_iso_root;
pub mod s10_assemble;
