//! Bit flags describing how objects take part in culling and which passes
//! they are relevant to.

use bitflags::bitflags;

bitflags! {
    /// How an object participates in occlusion culling.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct OcclusionFlags: u8 {
        /// The object may be hidden by occlusion results.
        const CAN_BE_OCCLUDED = 0x1;
        /// Cheap grouped requeries are acceptable once the object is occluded.
        const ALLOW_APPROXIMATE_OCCLUSION = 0x2;
        /// The object is covered by precomputed visibility data.
        const HAS_PRECOMPUTED_VISIBILITY = 0x4;
        /// The proxy supplies several occlusion volumes instead of one.
        const HAS_SUBPRIMITIVE_QUERIES = 0x8;
    }
}

bitflags! {
    /// Which render passes a visible object contributes to in a view.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct RelevanceFlags: u32 {
        const DRAW = 1 << 0;
        const DYNAMIC = 1 << 1;
        const STATIC = 1 << 2;
        const SHADOW = 1 << 3;
        const RENDER_IN_MAIN_PASS = 1 << 4;
        const CUSTOM_DEPTH = 1 << 5;
        const TRANSLUCENT = 1 << 6;
        const DISTORTION = 1 << 7;
        const DECAL = 1 << 8;
        const EDITOR_ONLY = 1 << 9;
        const VELOCITY = 1 << 10;
        const CUSTOM_DATA = 1 << 11;
    }
}

bitflags! {
    /// Per-mesh marks produced by relevance computation and merged into the
    /// view's per-mesh bitsets.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MarkMask: u8 {
        const SHADOW_DEPTH = 0x1;
        const VISIBILITY = 0x2;
        const VELOCITY = 0x4;
        const OCCLUDER = 0x8;
        const FADE_OUT_DITHERED = 0x10;
        const FADE_IN_DITHERED = 0x20;
    }
}

static_assertions::const_assert_eq!(std::mem::size_of::<MarkMask>(), 1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_mask_bit_values() {
        assert_eq!(MarkMask::SHADOW_DEPTH.bits(), 0x1);
        assert_eq!(MarkMask::FADE_IN_DITHERED.bits(), 0x20);
        let combined = MarkMask::VISIBILITY | MarkMask::VELOCITY;
        assert!(combined.contains(MarkMask::VISIBILITY));
        assert!(!combined.contains(MarkMask::OCCLUDER));
    }

    #[test]
    fn test_precomputed_culling_requires_both_flags() {
        let required =
            OcclusionFlags::CAN_BE_OCCLUDED | OcclusionFlags::HAS_PRECOMPUTED_VISIBILITY;
        assert!(!OcclusionFlags::CAN_BE_OCCLUDED.contains(required));
        assert!(
            (OcclusionFlags::CAN_BE_OCCLUDED
                | OcclusionFlags::HAS_PRECOMPUTED_VISIBILITY
                | OcclusionFlags::ALLOW_APPROXIMATE_OCCLUSION)
                .contains(required)
        );
    }
}
