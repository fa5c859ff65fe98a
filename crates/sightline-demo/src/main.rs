//! Headless Sightline driver: flies a camera down a synthetic street and runs
//! the visibility pipeline every frame.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p sightline-demo -- --objects 50000 --frames 300`.

mod gpu;
mod world;

use std::path::Path;
use std::time::Instant;

use clap::Parser;
use glam::{Mat4, UVec2, Vec3};
use serde::Serialize;
use sightline_config::{CliArgs, Config, default_config_dir};
use sightline_scene::SceneView;
use sightline_visibility::{ViewState, ViewVisibility, VisibilityPipeline};
use tracing::{debug, error, info, warn};

use gpu::SimulatedGpu;
use world::{STREET_LENGTH, World};

const DEFAULT_OBJECTS: usize = 20_000;
const DEFAULT_FRAMES: u32 = 240;
const SCENE_SEED: u64 = 42;
const VIEWPORT: UVec2 = UVec2::new(640, 360);
const FRAME_TIME: f32 = 1.0 / 60.0;
/// Frames between checks of `config.ron` for edits.
const RELOAD_INTERVAL: u32 = 60;

/// Totals over the whole run, printed as JSON at the end.
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    frames: u32,
    objects: usize,
    clusters: usize,
    removed: usize,
    mean_visible: f64,
    mean_frustum_culled: f64,
    mean_occluded: f64,
    mean_fading: f64,
    queries_submitted: u64,
    mean_frame_ms: f64,
}

impl RunSummary {
    fn record(&mut self, result: &ViewVisibility, frame_ms: f64) {
        let stats = &result.stats;
        self.frames += 1;
        self.mean_visible += stats.visible as f64;
        self.mean_frustum_culled += stats.frustum_culled as f64;
        self.mean_occluded += stats.occlusion.occluded as f64;
        self.mean_fading += stats.fading as f64;
        self.mean_frame_ms += frame_ms;
    }

    fn finish(mut self) -> Self {
        let n = f64::from(self.frames.max(1));
        self.mean_visible /= n;
        self.mean_frustum_culled /= n;
        self.mean_occluded /= n;
        self.mean_fading /= n;
        self.mean_frame_ms /= n;
        self
    }
}

/// Camera for `frame`: moving down the street, swaying side to side.
fn camera(frame: u32, frames: u32) -> SceneView {
    let t = frame as f32 / frames.max(1) as f32;
    let origin = Vec3::new((t * 12.0).sin() * 80.0, 8.0, 50.0 - t * STREET_LENGTH);
    let dir = Vec3::new((t * 7.0).sin() * 0.3, -0.02, -1.0).normalize();
    let look = Mat4::look_to_rh(origin, dir, Vec3::Y);
    let aspect = VIEWPORT.x as f32 / VIEWPORT.y as f32;
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, aspect, 5000.0, 0.1);
    SceneView::new(origin, look, proj, VIEWPORT).at_frame(frame, frame as f32 * FRAME_TIME)
}

fn reload_config(
    pipeline: &mut VisibilityPipeline,
    state: &mut ViewState,
    gpu: &mut SimulatedGpu,
    config_dir: &Path,
) {
    match pipeline.config().reload(config_dir) {
        Ok(Some(config)) => {
            let system_changed = config.occlusion.system != pipeline.config().occlusion.system;
            if let Err(e) = pipeline.reconfigure(config) {
                warn!("Ignoring reloaded config: {e}");
            } else if system_changed {
                state.reset(gpu);
                info!("Occlusion system changed, view state reset");
            }
        }
        Ok(None) => {}
        Err(e) => debug!("Config reload skipped: {e}"),
    }
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    match sightline_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config)) {
        Ok(Some(path)) => info!("Writing JSON log to {}", path.display()),
        Ok(None) => {}
        Err(e) => eprintln!("Logging disabled: {e}"),
    }

    let objects = args.objects.unwrap_or(DEFAULT_OBJECTS);
    let frames = args.frames.unwrap_or(DEFAULT_FRAMES);

    let mut pipeline = match VisibilityPipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to start visibility pipeline: {e}");
            std::process::exit(1);
        }
    };
    let mut state = ViewState::new(pipeline.config());
    let mut gpu = SimulatedGpu::new();
    let mut world = World::generate(objects, SCENE_SEED);

    let mut summary = RunSummary {
        objects: world.scene.len(),
        clusters: world.clusters,
        ..Default::default()
    };

    for frame in 1..=frames {
        if frame == frames / 2 {
            summary.removed = world.demolish(10);
            info!(frame, removed = summary.removed, "demolished props");
        }
        if frame % RELOAD_INTERVAL == 0 {
            reload_config(&mut pipeline, &mut state, &mut gpu, &config_dir);
        }

        let view = camera(frame, frames);
        gpu.render_depth(&view, &world.walls);

        let start = Instant::now();
        let result = pipeline.compute_view(&world.scene, &view, &mut state, &mut gpu);
        let frame_ms = start.elapsed().as_secs_f64() * 1000.0;
        summary.record(&result, frame_ms);

        let stats = &result.stats;
        debug!(
            frame,
            visible = stats.visible,
            frustum_culled = stats.frustum_culled,
            occluded = stats.occlusion.occluded,
            queries = stats.occlusion.individual_queries + stats.occlusion.grouped_queries,
            hzb_tests = stats.occlusion.hzb_tests,
            hlod_hidden = stats.hlod_forced_hidden,
            fading = stats.fading,
            translucent = result.translucent.len(),
            frame_ms,
            "frame"
        );
        if frame % 30 == 0 {
            info!(
                "Frame {frame}: {} of {} visible, {} occluded, {} histories, {:.2} ms",
                stats.visible,
                stats.objects,
                stats.occlusion.occluded,
                state.occlusion().histories().len(),
                frame_ms
            );
        }
    }

    summary.queries_submitted = gpu.submitted();
    let summary = summary.finish();
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("Failed to serialize run summary: {e}"),
    }

    state.reset(&mut gpu);
    info!(pending = gpu.pending_results(), "Shut down");
}
