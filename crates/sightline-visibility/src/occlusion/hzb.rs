//! Screen-space occlusion tests against a hierarchical depth pyramid.
//!
//! Bounds added during frame N are tested once the pyramid for frame N
//! exists; the results are read back in frame N+1 through a mapping guard.
//! Results are only meaningful for histories whose last test happened in the
//! frame the results were produced for.

use glam::{Mat4, Vec3};

use super::pyramid::DepthPyramid;

/// Most tests one frame can hold; later bounds are left untested.
pub const MAX_HZB_TESTS: usize = 256 * 256;

/// Index of one HZB test within its frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HzbHandle(u32);

/// Collects bounds for this frame and holds the results of the last one.
#[derive(Debug, Default)]
pub struct HzbOcclusionTester {
    pending: Vec<(Vec3, Vec3)>,
    results: Vec<bool>,
    valid_frame: Option<u32>,
    mapped: bool,
}

impl HzbOcclusionTester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a box for testing. Returns `None` once the frame is full.
    pub fn add_bounds(&mut self, origin: Vec3, extent: Vec3) -> Option<HzbHandle> {
        assert!(!self.mapped, "adding HZB bounds while results are mapped");
        if self.pending.len() >= MAX_HZB_TESTS {
            return None;
        }
        self.pending.push((origin, extent));
        Some(HzbHandle(self.pending.len() as u32 - 1))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Run the queued tests against `pyramid` and make them the results for
    /// `frame`. Without a pyramid every test passes.
    pub fn submit(&mut self, pyramid: Option<&DepthPyramid>, view_projection: &Mat4, frame: u32) {
        assert!(!self.mapped, "submitting HZB tests while results are mapped");
        self.results.clear();
        self.results.extend(self.pending.drain(..).map(|(origin, extent)| {
            pyramid.is_none_or(|p| p.is_box_visible(view_projection, origin, extent))
        }));
        self.valid_frame = Some(frame);
        tracing::trace!(tests = self.results.len(), frame, "evaluated HZB tests");
    }

    /// Frame the current results belong to.
    pub fn valid_frame(&self) -> Option<u32> {
        self.valid_frame
    }

    /// Map the results for reading. They are unmapped when the guard drops.
    pub fn map_results(&mut self) -> HzbResults<'_> {
        self.mapped = true;
        HzbResults { tester: self }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

/// Read access to the last frame's HZB results.
#[derive(Debug)]
pub struct HzbResults<'a> {
    tester: &'a mut HzbOcclusionTester,
}

impl HzbResults<'_> {
    /// True when results exist for tests added in `frame`.
    pub fn is_valid_frame(&self, frame: u32) -> bool {
        self.tester.valid_frame == Some(frame)
    }

    /// Conservative: unknown handles are visible.
    pub fn is_visible(&self, handle: HzbHandle) -> bool {
        self.tester.results.get(handle.0 as usize).copied().unwrap_or(true)
    }
}

impl Drop for HzbResults<'_> {
    fn drop(&mut self) {
        self.tester.mapped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::UVec2;

    fn camera() -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1000.0, 0.1);
        proj * view
    }

    #[test]
    fn test_results_follow_pyramid() {
        let vp = camera();
        let wall = (Vec3::new(0.0, 0.0, -10.0), Vec3::new(50.0, 50.0, 0.1));
        let pyramid = DepthPyramid::from_occluders(UVec2::new(32, 32), &vp, &[wall]);

        let mut hzb = HzbOcclusionTester::new();
        let hidden = hzb.add_bounds(Vec3::new(0.0, 0.0, -50.0), Vec3::ONE).unwrap();
        let shown = hzb.add_bounds(Vec3::new(0.0, 0.0, -3.0), Vec3::ONE).unwrap();
        hzb.submit(Some(&pyramid), &vp, 7);
        assert_eq!(hzb.pending_count(), 0);

        let results = hzb.map_results();
        assert!(results.is_valid_frame(7));
        assert!(!results.is_valid_frame(6));
        assert!(!results.is_visible(hidden));
        assert!(results.is_visible(shown));
    }

    #[test]
    fn test_guard_unmaps_on_drop() {
        let mut hzb = HzbOcclusionTester::new();
        {
            let _results = hzb.map_results();
        }
        assert!(!hzb.is_mapped());
        assert!(hzb.add_bounds(Vec3::ZERO, Vec3::ONE).is_some());
    }

    #[test]
    fn test_missing_pyramid_passes_everything() {
        let mut hzb = HzbOcclusionTester::new();
        let handle = hzb.add_bounds(Vec3::new(0.0, 0.0, -50.0), Vec3::ONE).unwrap();
        hzb.submit(None, &camera(), 1);
        assert!(hzb.map_results().is_visible(handle));
    }
}
