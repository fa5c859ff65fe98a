//! Synthetic street scene: scattered props, a few walls across the street,
//! and HLOD cluster proxies standing in for distant blocks of props.

use std::sync::Arc;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use sightline_math::BoxSphereBounds;
use sightline_scene::{
    ComponentId, PrimitiveDesc, PrimitiveProxy, RelevanceFlags, Scene, SceneView, StaticMeshLod,
    TypeTag, ViewRelevance,
};

/// Length of the street along -Z.
pub const STREET_LENGTH: f32 = 3000.0;
const STREET_HALF_WIDTH: f32 = 400.0;
/// Edge of one HLOD cluster cell on the ground plane.
const CLUSTER_CELL: f32 = 250.0;
/// Clusters replace their props beyond this distance.
const CLUSTER_TRANSITION: f32 = 700.0;

const PROP: TypeTag = TypeTag(1);
const WALL: TypeTag = TypeTag(2);
const CLUSTER: TypeTag = TypeTag(3);

/// A box-shaped renderable with a fixed relevance and LOD chain.
pub struct Prop {
    bounds: BoxSphereBounds,
    relevance: ViewRelevance,
    meshes: Vec<StaticMeshLod>,
}

impl Prop {
    fn solid(origin: Vec3, extent: Vec3) -> Self {
        Self {
            bounds: BoxSphereBounds::from_extent(origin, extent),
            relevance: ViewRelevance::opaque_static(),
            meshes: vec![
                StaticMeshLod::new(0, 0.25).dithered(),
                StaticMeshLod::new(1, 0.05).dithered(),
                StaticMeshLod::new(2, 0.0),
            ],
        }
    }

    fn glass(origin: Vec3, extent: Vec3, priority: i16) -> Self {
        Self {
            bounds: BoxSphereBounds::from_extent(origin, extent),
            relevance: ViewRelevance {
                flags: RelevanceFlags::DRAW
                    | RelevanceFlags::DYNAMIC
                    | RelevanceFlags::TRANSLUCENT
                    | RelevanceFlags::RENDER_IN_MAIN_PASS
                    | RelevanceFlags::SHADOW,
                translucency_sort_priority: priority,
            },
            meshes: Vec::new(),
        }
    }

    fn wall(origin: Vec3, extent: Vec3) -> Self {
        Self {
            bounds: BoxSphereBounds::from_extent(origin, extent),
            relevance: ViewRelevance::opaque_static(),
            meshes: vec![StaticMeshLod::new(0, 0.0).occluder()],
        }
    }

    fn cluster(origin: Vec3, extent: Vec3) -> Self {
        Self {
            bounds: BoxSphereBounds::from_extent(origin, extent),
            relevance: ViewRelevance::opaque_static(),
            meshes: vec![StaticMeshLod::new(0, 0.0).dithered()],
        }
    }
}

impl PrimitiveProxy for Prop {
    fn bounds(&self) -> BoxSphereBounds {
        self.bounds
    }

    fn view_relevance(&self, _view: &SceneView) -> ViewRelevance {
        self.relevance
    }

    fn static_meshes(&self) -> &[StaticMeshLod] {
        &self.meshes
    }
}

/// The generated scene plus what the simulated GPU needs to draw depth.
pub struct World {
    pub scene: Scene,
    /// Occluder boxes (origin, extent) rasterized into the depth buffer.
    pub walls: Vec<(Vec3, Vec3)>,
    pub props: Vec<ComponentId>,
    pub clusters: usize,
}

impl World {
    /// Build a street with `objects` props from a fixed `seed`.
    pub fn generate(objects: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut scene = Scene::new();
        let mut props = Vec::with_capacity(objects);
        let mut cells: FxHashMap<(i32, i32), Vec<ComponentId>> = FxHashMap::default();

        for i in 0..objects {
            let origin = Vec3::new(
                rng.random_range(-STREET_HALF_WIDTH..STREET_HALF_WIDTH),
                rng.random_range(0.0..30.0),
                rng.random_range(-STREET_LENGTH..0.0),
            );
            let extent = Vec3::new(
                rng.random_range(0.5..4.0),
                rng.random_range(0.5..6.0),
                rng.random_range(0.5..4.0),
            );
            let proxy = if rng.random_bool(0.08) {
                Prop::glass(origin, extent, (i % 3) as i16)
            } else {
                Prop::solid(origin, extent)
            };
            let max_draw = rng.random_range(600.0..1500.0);
            let id = scene.add_object(
                Arc::new(proxy),
                PrimitiveDesc::default()
                    .with_type(PROP)
                    .with_draw_distance(0.0, max_draw),
            );
            props.push(id);

            let cell = (
                (origin.x / CLUSTER_CELL).floor() as i32,
                (origin.z / CLUSTER_CELL).floor() as i32,
            );
            cells.entry(cell).or_default().push(id);
        }

        let mut walls = Vec::new();
        let mut z = -250.0;
        while z > -STREET_LENGTH {
            let origin = Vec3::new(rng.random_range(-200.0..200.0), 20.0, z);
            let extent = Vec3::new(rng.random_range(60.0..180.0), 20.0, 1.0);
            scene.add_object(
                Arc::new(Prop::wall(origin, extent)),
                PrimitiveDesc::default().with_type(WALL),
            );
            walls.push((origin, extent));
            z -= rng.random_range(300.0..600.0);
        }

        let mut keys: Vec<_> = cells.keys().copied().collect();
        keys.sort_unstable();
        let mut clusters = 0;
        for key in keys {
            let Some(children) = cells.get(&key) else {
                continue;
            };
            if children.len() < 4 {
                continue;
            }
            let half = CLUSTER_CELL * 0.5;
            let origin = Vec3::new(key.0 as f32 * CLUSTER_CELL + half, 15.0, key.1 as f32 * CLUSTER_CELL + half);
            let parent = scene.add_object(
                Arc::new(Prop::cluster(origin, Vec3::new(half, 15.0, half))),
                PrimitiveDesc::default()
                    .with_type(CLUSTER)
                    .with_draw_distance(CLUSTER_TRANSITION, f32::INFINITY),
            );
            for &child in children {
                scene.attach_hlod_child(parent, child);
            }
            clusters += 1;
        }

        tracing::info!(
            objects = scene.len(),
            props = props.len(),
            walls = walls.len(),
            clusters,
            "generated street scene"
        );
        Self {
            scene,
            walls,
            props,
            clusters,
        }
    }

    /// Remove every `stride`-th prop. Returns how many were removed.
    pub fn demolish(&mut self, stride: usize) -> usize {
        let stride = stride.max(1);
        let mut removed = 0;
        let mut kept = Vec::with_capacity(self.props.len());
        for (i, id) in self.props.drain(..).enumerate() {
            if i % stride == 0 && self.scene.remove_object(id) {
                removed += 1;
            } else {
                kept.push(id);
            }
        }
        self.props = kept;
        removed
    }
}
