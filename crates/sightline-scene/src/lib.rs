//! Scene-side data for the visibility pipeline.
//!
//! Owns the dense primitive registry, the HLOD parent/child registrations, the
//! capability trait renderable objects implement, and the per-view camera
//! description consumed by the culling stages.

mod bit_array;
mod flags;
mod ids;
mod lod_tree;
mod proxy;
mod registry;
mod scene;
mod view;

pub use bit_array::{BITS_PER_WORD, BitArray, iter_word_ones};
pub use flags::{MarkMask, OcclusionFlags, RelevanceFlags};
pub use ids::{ComponentId, MeshId, TypeTag};
pub use lod_tree::{HlodNode, HlodTree};
pub use proxy::{CustomViewData, PrimitiveProxy, StaticMeshLod, ViewRelevance};
pub use registry::{PrimitiveBounds, PrimitiveDesc, PrimitiveRecord, PrimitiveRegistry};
pub use scene::Scene;
pub use view::{CustomVisibilityQuery, PrecomputedVisibility, SceneView, StereoPass};
