//! Command-line argument parsing for the Sightline demo driver.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{Config, OcclusionSystem};

/// Occlusion technique as spelled on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliOcclusionSystem {
    /// GPU occlusion queries.
    Hardware,
    /// Hierarchical depth when available.
    Hzb,
    /// Hierarchical depth always.
    ForcedHzb,
}

impl From<CliOcclusionSystem> for OcclusionSystem {
    fn from(value: CliOcclusionSystem) -> Self {
        match value {
            CliOcclusionSystem::Hardware => OcclusionSystem::Hardware,
            CliOcclusionSystem::Hzb => OcclusionSystem::Hzb,
            CliOcclusionSystem::ForcedHzb => OcclusionSystem::ForcedHzb,
        }
    }
}

/// Sightline command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "sightline", about = "Scene visibility and occlusion culling driver")]
pub struct CliArgs {
    /// Number of synthetic objects to place in the scene.
    #[arg(long)]
    pub objects: Option<usize>,

    /// Number of frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Occlusion technique.
    #[arg(long, value_enum)]
    pub occlusion: Option<CliOcclusionSystem>,

    /// Run culling stages on the worker pool.
    #[arg(long)]
    pub parallel: Option<bool>,

    /// Worker thread count (0 = one per logical CPU).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Fade duration in seconds.
    #[arg(long)]
    pub fade_duration: Option<f32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    ///
    /// `objects` and `frames` drive the demo itself and are not config settings.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(system) = args.occlusion {
            self.occlusion.system = system.into();
        }
        if let Some(parallel) = args.parallel {
            self.parallel.parallel_culling = parallel;
        }
        if let Some(threads) = args.threads {
            self.parallel.worker_threads = threads;
        }
        if let Some(duration) = args.fade_duration {
            self.fading.fade_duration = duration;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
