//! Per-view output handed to the draw-command generator.

use std::fmt;

use sightline_scene::{BitArray, ComponentId, CustomViewData, MarkMask, MeshId};

use crate::fading::FadeParams;
use crate::lod::LodMask;
use crate::occlusion::OcclusionStats;

/// A translucent object queued for back-to-front drawing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TranslucentPrimitive {
    pub index: usize,
    pub id: ComponentId,
    pub sort_priority: i16,
    /// Squared distance from the view origin to the bounds origin.
    pub distance_sq: f32,
}

/// Per-mesh marks, one bitset per mark kind, indexed by [`MeshId`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshMarks {
    pub visibility: BitArray,
    pub shadow_depth: BitArray,
    pub velocity: BitArray,
    pub occluder: BitArray,
    pub fade_out_dithered: BitArray,
    pub fade_in_dithered: BitArray,
}

impl MeshMarks {
    pub fn new(capacity: usize) -> Self {
        Self {
            visibility: BitArray::new(capacity),
            shadow_depth: BitArray::new(capacity),
            velocity: BitArray::new(capacity),
            occluder: BitArray::new(capacity),
            fade_out_dithered: BitArray::new(capacity),
            fade_in_dithered: BitArray::new(capacity),
        }
    }

    /// OR every set bit of `mask` in for `mesh`.
    pub fn apply(&mut self, mesh: MeshId, mask: MarkMask) {
        let i = mesh.index();
        for (flag, bits) in [
            (MarkMask::VISIBILITY, &mut self.visibility),
            (MarkMask::SHADOW_DEPTH, &mut self.shadow_depth),
            (MarkMask::VELOCITY, &mut self.velocity),
            (MarkMask::OCCLUDER, &mut self.occluder),
            (MarkMask::FADE_OUT_DITHERED, &mut self.fade_out_dithered),
            (MarkMask::FADE_IN_DITHERED, &mut self.fade_in_dithered),
        ] {
            if mask.contains(flag) {
                bits.set(i, true);
            }
        }
    }

    /// Every mark set for `mesh`.
    pub fn get(&self, mesh: MeshId) -> MarkMask {
        let i = mesh.index();
        let mut mask = MarkMask::empty();
        mask.set(MarkMask::VISIBILITY, self.visibility.get(i));
        mask.set(MarkMask::SHADOW_DEPTH, self.shadow_depth.get(i));
        mask.set(MarkMask::VELOCITY, self.velocity.get(i));
        mask.set(MarkMask::OCCLUDER, self.occluder.get(i));
        mask.set(MarkMask::FADE_OUT_DITHERED, self.fade_out_dithered.get(i));
        mask.set(MarkMask::FADE_IN_DITHERED, self.fade_in_dithered.get(i));
        mask
    }
}

/// Counters for one computed view.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibilityStats {
    pub objects: usize,
    pub frustum_culled: usize,
    pub occlusion: OcclusionStats,
    pub hlod_forced_visible: usize,
    pub hlod_forced_hidden: usize,
    /// Objects with a fade in progress.
    pub fading: usize,
    /// Objects still visible after relevance.
    pub visible: usize,
    pub visible_static_mesh_elements: usize,
    pub relevance_packets: usize,
    /// Translucent objects each relevance packet found, in packet order.
    pub translucent_per_packet: Vec<usize>,
}

/// Everything the pipeline decided about one view in one frame. Object-indexed
/// data uses this frame's registry indices.
#[derive(Default)]
pub struct ViewVisibility {
    pub visible: BitArray,
    pub definitely_unoccluded: BitArray,
    pub potentially_fading: BitArray,
    pub mesh_marks: MeshMarks,
    /// Sorted by priority, then back to front.
    pub translucent: Vec<TranslucentPrimitive>,
    pub distortion: Vec<usize>,
    pub decals: Vec<usize>,
    pub custom_depth: Vec<usize>,
    pub editor_only: Vec<usize>,
    pub dynamic: Vec<usize>,
    /// Objects drawn from static mesh data.
    pub static_mesh: Vec<usize>,
    pub fade: Vec<Option<FadeParams>>,
    pub lod_masks: Vec<LodMask>,
    /// Weight of the newer LOD sample in dithered cross-fades, `0..=1`.
    pub lod_transition_alpha: f32,
    pub custom_data: Vec<(usize, CustomViewData)>,
    pub stats: VisibilityStats,
}

impl ViewVisibility {
    pub(crate) fn new(objects: usize, mesh_capacity: usize) -> Self {
        Self {
            visible: BitArray::new(objects),
            definitely_unoccluded: BitArray::new(objects),
            potentially_fading: BitArray::new(objects),
            mesh_marks: MeshMarks::new(mesh_capacity),
            fade: vec![None; objects],
            lod_masks: vec![LodMask::default(); objects],
            ..Default::default()
        }
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.visible.get(index)
    }

    pub fn fade(&self, index: usize) -> Option<FadeParams> {
        self.fade.get(index).copied().flatten()
    }

    pub fn lod_mask(&self, index: usize) -> LodMask {
        self.lod_masks.get(index).copied().unwrap_or_default()
    }

    pub fn custom_data(&self, index: usize) -> Option<&CustomViewData> {
        self.custom_data
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, data)| data)
    }
}

impl fmt::Debug for ViewVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewVisibility")
            .field("visible", &self.visible.count_ones())
            .field("translucent", &self.translucent.len())
            .field("custom_data", &self.custom_data.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
