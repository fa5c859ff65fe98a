//! Errors surfaced by the visibility pipeline's fallible entry points.

use sightline_config::ConfigError;
use thiserror::Error;

/// Errors returned when building or driving a [`VisibilityPipeline`](crate::VisibilityPipeline).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    ThreadPoolBuild(#[from] rayon::ThreadPoolBuildError),

    #[error("stereo views do not form a primary/secondary pair: {0}")]
    StereoPairMismatch(String),
}
