//! Configuration for the Sightline visibility pipeline.
//!
//! Settings persist to disk as RON files, can be overridden from the command
//! line via clap, and tolerate missing or unknown fields so older and newer
//! config files keep loading.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, CliOcclusionSystem};
pub use config::{
    Config, CullingConfig, DebugConfig, FadingConfig, LodConfig, MAX_BUFFERED_QUERY_FRAMES,
    OcclusionConfig, OcclusionSystem, ParallelConfig, default_config_dir,
};
pub use error::ConfigError;
