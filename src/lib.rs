//! mapflow library
//!
//! Supervises the external mapping/localization pipeline: per-dataset config rewriting,
//! process launch/monitor/teardown and resource-usage recording.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod module;
pub mod pack;
pub mod platform;
pub mod plot;
pub mod process;
pub mod resource;
pub mod signal;
pub mod workflow;

// Re-export commonly used types for convenience
pub use config::{FillbackConfigModifier, MappingConfigModifier, MappingToggles};
pub use error::{Result, WorkflowError};
pub use module::{ModuleConfig, ModuleKind, ModuleSet};
pub use pack::{ChannelKind, PackFillBackConfig};
pub use process::ProcessHandle;
pub use resource::{ResourceRecord, ResourceSample, ResourceSeries};
pub use workflow::{Workflow, WorkflowOptions};
