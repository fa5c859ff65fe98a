//! Discrete mesh LOD selection with temporal dithering.
//!
//! Two camera samples taken `temporal_lod_lag` seconds apart each pick a LOD.
//! When they disagree on a mesh that supports dithered transitions, both LODs
//! are drawn and cross-faded with a screen-door pattern.

use glam::Vec3;
use sightline_math::{BoxSphereBounds, bounds_screen_radius_squared};
use sightline_scene::{SceneView, StaticMeshLod};

/// Camera samples used for temporal LOD transitions.
#[derive(Clone, Debug, PartialEq)]
pub struct TemporalLodState {
    origins: [Vec3; 2],
    distance_factors: [f32; 2],
    times: [f32; 2],
    lag: f32,
}

impl Default for TemporalLodState {
    fn default() -> Self {
        Self {
            origins: [Vec3::ZERO; 2],
            distance_factors: [1.0; 2],
            times: [0.0; 2],
            lag: 0.0,
        }
    }
}

impl TemporalLodState {
    /// Advance the samples for this frame.
    ///
    /// A new sample is taken once the newest one is older than `lag`. When
    /// distance fading is disabled, or time fails to move forward, both
    /// samples collapse onto the current camera and transitions stop.
    pub fn update(&mut self, view: &SceneView, lag: f32, fading_enabled: bool) {
        let now = view.real_time;
        let mut ok = false;
        if fading_enabled {
            ok = true;
            self.lag = lag;
            if self.times[1] < now - lag {
                if self.times[0] < self.times[1] {
                    self.origins[0] = self.origins[1];
                    self.distance_factors[0] = self.distance_factors[1];
                    self.times[0] = self.times[1];
                }
                self.origins[1] = view.view_origin;
                self.distance_factors[1] = view.lod_distance_factor;
                self.times[1] = now;
                if self.times[1] <= self.times[0] {
                    ok = false;
                }
            }
        }
        if !ok {
            self.origins = [view.view_origin; 2];
            self.distance_factors = [view.lod_distance_factor; 2];
            self.times = [now; 2];
            self.lag = 0.0;
        }
    }

    /// Blend weight of the newer sample at `now`, in `0..=1`.
    pub fn transition_alpha(&self, now: f32) -> f32 {
        if self.lag == 0.0 || self.times[1] <= self.times[0] {
            return 0.0;
        }
        ((now - self.lag - self.times[0]) / (self.times[1] - self.times[0])).clamp(0.0, 1.0)
    }

    pub fn origin(&self, sample: usize) -> Vec3 {
        self.origins[sample]
    }

    pub fn distance_factor(&self, sample: usize) -> f32 {
        self.distance_factors[sample]
    }

    /// Time of the older sample; changes mark HLOD sync points.
    pub fn sync_time(&self) -> f32 {
        self.times[0]
    }
}

/// The LOD (or dithered pair of LODs) an object draws in one view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LodMask {
    indices: [i8; 2],
}

impl Default for LodMask {
    fn default() -> Self {
        Self {
            indices: [i8::MAX; 2],
        }
    }
}

impl LodMask {
    /// Both samples draw `lod`.
    pub fn single(lod: i8) -> Self {
        Self { indices: [lod; 2] }
    }

    pub fn set_lod(&mut self, lod: i8) {
        self.indices = [lod; 2];
    }

    pub fn set_lod_sample(&mut self, lod: i8, sample: usize) {
        self.indices[sample] = lod;
    }

    /// LOD chosen by the older (0) or newer (1) temporal sample.
    pub fn sample(&self, sample: usize) -> i8 {
        self.indices[sample]
    }

    pub fn contains(&self, lod: i8) -> bool {
        self.indices[0] == lod || self.indices[1] == lod
    }

    /// The two samples disagree and both LODs are drawn.
    pub fn is_dithered(&self) -> bool {
        self.indices[0] != self.indices[1]
    }

    /// False until a LOD has been selected.
    pub fn is_valid(&self) -> bool {
        self.indices[0] != i8::MAX
    }
}

/// Inputs shared by every LOD computation in one view.
#[derive(Clone, Copy, Debug)]
pub struct LodSettings {
    /// Multiplier on screen radius; config scale times the view's factor.
    pub lod_scale: f32,
    pub forced_lod: Option<i8>,
    pub min_screen_radius_for_lod: f32,
}

/// Pick the LOD for one object's static meshes. Returns the mask and the
/// squared screen radius from the current camera.
///
/// The most detailed LOD whose `(screen_size / 2)²` fits inside the screen
/// radius² wins; objects too small for every threshold use the coarsest LOD.
pub fn compute_lod_for_meshes(
    meshes: &[StaticMeshLod],
    view: &SceneView,
    temporal: &TemporalLodState,
    bounds: &BoxSphereBounds,
    settings: &LodSettings,
) -> (LodMask, f32) {
    let scale_sq = settings.lod_scale * settings.lod_scale;
    let screen_radius_sq = |from: Vec3| {
        bounds_screen_radius_squared(bounds.origin, bounds.sphere_radius, from, &view.projection) * scale_sq
    };
    let current = screen_radius_sq(view.view_origin);

    let mut mask = LodMask::default();
    let Some(coarsest) = meshes.iter().map(|m| m.lod_index).max() else {
        return (mask, current);
    };
    let finest = meshes.iter().map(|m| m.lod_index).min().unwrap_or(0);

    if let Some(forced) = settings.forced_lod {
        mask.set_lod(forced.clamp(finest, coarsest));
    } else if current < settings.min_screen_radius_for_lod * settings.min_screen_radius_for_lod {
        mask.set_lod(coarsest);
    } else if meshes[0].dithered_lod_transition {
        for sample in 0..2 {
            let radius_sq = screen_radius_sq(temporal.origin(sample));
            mask.set_lod_sample(select_lod(meshes, radius_sq, coarsest), sample);
        }
    } else {
        mask.set_lod(select_lod(meshes, current, coarsest));
    }
    (mask, current)
}

fn select_lod(meshes: &[StaticMeshLod], screen_radius_sq: f32, coarsest: i8) -> i8 {
    meshes
        .iter()
        .filter(|m| (m.screen_size * 0.5).powi(2) <= screen_radius_sq)
        .map(|m| m.lod_index)
        .min()
        .unwrap_or(coarsest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, UVec2};

    fn view_at(origin: Vec3, time: f32) -> SceneView {
        let view = Mat4::look_to_rh(origin, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1000.0, 0.1);
        SceneView::new(origin, view, proj, UVec2::new(64, 64)).at_frame(1, time)
    }

    fn meshes() -> Vec<StaticMeshLod> {
        vec![
            StaticMeshLod::new(0, 0.5),
            StaticMeshLod::new(1, 0.2),
            StaticMeshLod::new(2, 0.0),
        ]
    }

    fn settings() -> LodSettings {
        LodSettings {
            lod_scale: 1.0,
            forced_lod: None,
            min_screen_radius_for_lod: 0.0,
        }
    }

    /// Closer objects get more detailed LODs.
    #[test]
    fn test_lod_selection_by_distance() {
        let view = view_at(Vec3::ZERO, 0.0);
        let temporal = TemporalLodState::default();
        let pick = |z: f32| {
            let bounds = BoxSphereBounds::from_extent(Vec3::new(0.0, 0.0, -z), Vec3::ONE);
            compute_lod_for_meshes(&meshes(), &view, &temporal, &bounds, &settings()).0
        };
        assert_eq!(pick(2.0), LodMask::single(0));
        assert_eq!(pick(5.0), LodMask::single(1));
        assert_eq!(pick(500.0), LodMask::single(2));
    }

    #[test]
    fn test_forced_lod_is_clamped() {
        let view = view_at(Vec3::ZERO, 0.0);
        let bounds = BoxSphereBounds::from_extent(Vec3::new(0.0, 0.0, -2.0), Vec3::ONE);
        let forced = LodSettings {
            forced_lod: Some(9),
            ..settings()
        };
        let (mask, _) = compute_lod_for_meshes(&meshes(), &view, &TemporalLodState::default(), &bounds, &forced);
        assert_eq!(mask, LodMask::single(2));
    }

    #[test]
    fn test_no_meshes_leaves_mask_invalid() {
        let view = view_at(Vec3::ZERO, 0.0);
        let bounds = BoxSphereBounds::from_extent(Vec3::ZERO, Vec3::ONE);
        let (mask, _) = compute_lod_for_meshes(&[], &view, &TemporalLodState::default(), &bounds, &settings());
        assert!(!mask.is_valid());
    }

    /// Temporal samples on either side of a threshold produce a dithered pair.
    #[test]
    fn test_dithered_pair_when_samples_disagree() {
        let dithered: Vec<_> = meshes().into_iter().map(StaticMeshLod::dithered).collect();
        let mut temporal = TemporalLodState::default();
        temporal.update(&view_at(Vec3::new(0.0, 0.0, 4.0), 1.0), 0.5, true);
        temporal.update(&view_at(Vec3::ZERO, 2.0), 0.5, true);
        assert_eq!(temporal.origin(0), Vec3::new(0.0, 0.0, 4.0));
        assert_eq!(temporal.origin(1), Vec3::ZERO);

        let view = view_at(Vec3::ZERO, 2.0);
        let bounds = BoxSphereBounds::from_extent(Vec3::new(0.0, 0.0, -2.0), Vec3::ONE);
        let (mask, _) = compute_lod_for_meshes(&dithered, &view, &temporal, &bounds, &settings());
        assert!(mask.is_dithered());
        assert_eq!(mask.sample(0), 1);
        assert_eq!(mask.sample(1), 0);
        assert!(mask.contains(0) && mask.contains(1) && !mask.contains(2));
    }

    #[test]
    fn test_temporal_state_resets_when_fading_disabled() {
        let mut temporal = TemporalLodState::default();
        temporal.update(&view_at(Vec3::X, 0.0), 0.5, true);
        temporal.update(&view_at(Vec3::Y, 1.0), 0.5, false);
        assert_eq!(temporal.origin(0), Vec3::Y);
        assert_eq!(temporal.origin(1), Vec3::Y);
        assert_eq!(temporal.transition_alpha(1.0), 0.0);
    }

    #[test]
    fn test_transition_alpha_between_samples() {
        let mut temporal = TemporalLodState::default();
        temporal.update(&view_at(Vec3::ZERO, 1.0), 0.5, true);
        temporal.update(&view_at(Vec3::X, 2.0), 0.5, true);
        assert_eq!(temporal.transition_alpha(2.5), 1.0);
        assert!((temporal.transition_alpha(2.0) - 0.5).abs() < 1e-5);
        assert_eq!(temporal.transition_alpha(0.0), 0.0);
    }

    #[test]
    fn test_sync_time_advances_only_after_lag() {
        let mut temporal = TemporalLodState::default();
        temporal.update(&view_at(Vec3::ZERO, 1.0), 0.5, true);
        temporal.update(&view_at(Vec3::ZERO, 1.2), 0.5, true);
        let first = temporal.sync_time();
        temporal.update(&view_at(Vec3::ZERO, 1.6), 0.5, true);
        temporal.update(&view_at(Vec3::ZERO, 2.2), 0.5, true);
        assert!(temporal.sync_time() > first);
    }
}
