//! Sample generation pipeline.
//!
//! - [`executor`]: the single-flight job executor driving ComfyUI.
//! - [`planner`]: expands a job request into items.
//! - [`progress`]: per-checkpoint roll-up of item states.
//! - [`sidecar`]: metadata files written next to each sample.
//! - [`loader`] and [`fs`]: the template and filesystem ports.

pub mod error;
pub mod executor;
pub mod fs;
pub mod loader;
pub mod planner;
pub mod progress;
pub mod sidecar;

pub use error::ExecutorError;
pub use executor::{ActiveWork, ExecutorConfig, JobExecutor};
