//! Pipeline settings with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound on how many frames of occlusion queries may be in flight.
pub const MAX_BUFFERED_QUERY_FRAMES: u32 = 4;

/// Top-level visibility pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Frustum and distance culling.
    pub culling: CullingConfig,
    /// Occlusion culling.
    pub occlusion: OcclusionConfig,
    /// Distance and LOD fading.
    pub fading: FadingConfig,
    /// Level-of-detail selection.
    pub lod: LodConfig,
    /// Worker pool and task partitioning.
    pub parallel: ParallelConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Frustum and distance culling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CullingConfig {
    /// Multiplier applied to every finite max draw distance.
    pub view_distance_scale: f32,
    /// Reject against the bounding sphere before the box test.
    pub also_use_sphere_test: bool,
    /// Ignore max draw distances (detail meshes still honor theirs).
    pub force_disable_distance_culling: bool,
    /// Bitset words (32 objects each) handled by one cull task.
    pub frustum_cull_words_per_task: usize,
    /// Objects smaller than this screen radius draw their lowest LOD.
    pub min_screen_radius_for_lod: f32,
    /// Meshes smaller than this screen radius are dropped from shadow passes.
    pub min_screen_radius_for_shadow: f32,
    /// Meshes smaller than this screen radius are dropped from the depth prepass.
    pub min_screen_radius_for_depth: f32,
}

/// Which occlusion technique the pipeline uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OcclusionSystem {
    /// Per-object GPU occlusion queries read back a few frames later.
    Hardware,
    /// Hierarchical depth tests when the backend has a depth pyramid,
    /// hardware queries otherwise.
    #[default]
    Hzb,
    /// Always use hierarchical depth tests.
    ForcedHzb,
}

/// Occlusion culling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcclusionConfig {
    /// Occlusion technique.
    pub system: OcclusionSystem,
    /// GPU latency in frames before a query result is read (1 to 4).
    pub max_buffered_query_frames: u32,
    /// Objects closer than this are never occlusion tested.
    pub never_occlusion_test_distance: f32,
    /// Outstanding query budget; 0 disables deferral.
    pub soft_max_outstanding_queries: u32,
    /// Minimum share of pending individual queries submitted when over budget.
    pub min_deferred_progress_fraction: f32,
    /// Visible pixel fraction above which exact requeries become certain to skip.
    pub max_occlusion_pixels_fraction: f32,
    /// Seconds an object is assumed visible after last being proven visible.
    pub probably_visible_time: f32,
    /// Primitives sharing one grouped query.
    pub grouped_batch_size: u32,
    /// Allow proxies to split themselves into several occlusion queries.
    pub allow_sub_primitive_queries: bool,
    /// Treat every object as unoccluded regardless of query results.
    pub ignore_existing_queries: bool,
    /// Stop issuing new occlusion queries.
    pub disable_query_submission: bool,
    /// Frames an object must go untested before its bounds get expanded.
    pub frames_not_tested_to_expand: u32,
    /// Frames the newly-tested bounds expansion lasts.
    pub frames_to_expand_newly_tested: u32,
    /// Extra world units added to newly-tested occlusion bounds.
    pub expand_newly_tested_amount: f32,
    /// Extra world units added to every occlusion bounds.
    pub expand_all_tested_amount: f32,
    /// Parallel tasks used to fetch occlusion results.
    pub occlusion_fetch_tasks: usize,
}

/// Fading configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FadingConfig {
    /// Seconds one fade in or out lasts.
    pub fade_duration: f32,
    /// Width of the distance band beyond max draw distance where objects fade.
    pub distance_fade_max_travel: f32,
    /// Disable all fading; transitions pop.
    pub disable_lod_fade: bool,
}

/// Level-of-detail configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Multiplier on LOD distances (higher keeps detailed LODs longer).
    pub lod_distance_scale: f32,
    /// Force every mesh to this LOD index.
    pub forced_lod: Option<i8>,
    /// Seconds between temporal LOD samples.
    pub temporal_lod_lag: f32,
    /// Scale HLOD transition distances with the field of view.
    pub fov_affects_hlod: bool,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParallelConfig {
    /// Run culling stages on the worker pool instead of the calling thread.
    pub parallel_culling: bool,
    /// Worker thread count; 0 picks one per logical CPU.
    pub worker_threads: usize,
    /// Visible objects handled by one relevance task.
    pub relevance_packet_size: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            view_distance_scale: 1.0,
            also_use_sphere_test: true,
            force_disable_distance_culling: false,
            frustum_cull_words_per_task: 128,
            min_screen_radius_for_lod: 0.0,
            min_screen_radius_for_shadow: 0.01,
            min_screen_radius_for_depth: 0.03,
        }
    }
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            system: OcclusionSystem::Hzb,
            max_buffered_query_frames: 2,
            never_occlusion_test_distance: 0.0,
            soft_max_outstanding_queries: 8192,
            min_deferred_progress_fraction: 0.1,
            max_occlusion_pixels_fraction: 0.1,
            probably_visible_time: 8.0,
            grouped_batch_size: 16,
            allow_sub_primitive_queries: true,
            ignore_existing_queries: false,
            disable_query_submission: false,
            frames_not_tested_to_expand: 5,
            frames_to_expand_newly_tested: 2,
            expand_newly_tested_amount: 0.0,
            expand_all_tested_amount: 0.0,
            occlusion_fetch_tasks: 4,
        }
    }
}

impl Default for FadingConfig {
    fn default() -> Self {
        Self {
            fade_duration: 0.25,
            distance_fade_max_travel: 1000.0,
            disable_lod_fade: false,
        }
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            lod_distance_scale: 1.0,
            forced_lod: None,
            temporal_lod_lag: 0.5,
            fov_affects_hlod: true,
        }
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            parallel_culling: true,
            worker_threads: 0,
            relevance_packet_size: 127,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for Sightline, e.g. `~/.config/sightline`.
///
/// Falls back to the working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("sightline"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Validation ---

impl Config {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let occlusion = &self.occlusion;
        if !(1..=MAX_BUFFERED_QUERY_FRAMES).contains(&occlusion.max_buffered_query_frames) {
            return Err(ConfigError::InvalidValue {
                field: "occlusion.max_buffered_query_frames",
                reason: "must be between 1 and 4",
            });
        }
        if occlusion.grouped_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "occlusion.grouped_batch_size",
                reason: "must be at least 1",
            });
        }
        if occlusion.occlusion_fetch_tasks == 0 {
            return Err(ConfigError::InvalidValue {
                field: "occlusion.occlusion_fetch_tasks",
                reason: "must be at least 1",
            });
        }
        if !(0.0..=1.0).contains(&occlusion.min_deferred_progress_fraction) {
            return Err(ConfigError::InvalidValue {
                field: "occlusion.min_deferred_progress_fraction",
                reason: "must be within 0.0..=1.0",
            });
        }
        if self.culling.frustum_cull_words_per_task == 0 {
            return Err(ConfigError::InvalidValue {
                field: "culling.frustum_cull_words_per_task",
                reason: "must be at least 1",
            });
        }
        if self.parallel.relevance_packet_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "parallel.relevance_packet_size",
                reason: "must be at least 1",
            });
        }
        if self.fading.fade_duration <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "fading.fade_duration",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("frustum_cull_words_per_task: 128"));
        assert!(ron_str.contains("system: Hzb"));
        assert!(ron_str.contains("relevance_packet_size: 127"));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    /// A config missing whole sections fills them from defaults.
    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(culling: (view_distance_scale: 2.0))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.culling.view_distance_scale, 2.0);
        assert!(config.culling.also_use_sphere_test);
        assert_eq!(config.occlusion, OcclusionConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_forced_lod_parses() {
        let config: Config = ron::from_str("(lod: (forced_lod: Some(2)))").unwrap();
        assert_eq!(config.lod.forced_lod, Some(2));
    }

    #[test]
    fn test_validate_rejects_deep_query_pipeline() {
        let mut config = Config::default();
        config.occlusion.max_buffered_query_frames = 5;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "occlusion.max_buffered_query_frames",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_packet_size() {
        let mut config = Config::default();
        config.parallel.relevance_packet_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.occlusion.system = OcclusionSystem::Hardware;
        config.fading.fade_duration = 0.5;
        config.lod.forced_lod = Some(1);

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(occlusion: (grouped_batch_size: 0))",
        )
        .unwrap();
        assert!(Config::load_or_create(dir.path()).is_err());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.parallel.parallel_culling = false;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(!result.unwrap().parallel.parallel_culling);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_dir_ends_with_app_name() {
        let dir = default_config_dir();
        assert!(dir.ends_with("sightline") || dir == PathBuf::from("."));
    }
}
