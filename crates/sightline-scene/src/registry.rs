//! Dense parallel-array storage for every renderable object in the scene.
//!
//! Objects of the same [`TypeTag`] are kept contiguous. Adding or removing an
//! object costs at most one swap per type bucket that follows it, and every
//! swap goes through [`PrimitiveRegistry::swap_entries`] so no array can lag
//! behind the others.
//!
//! Indices shift whenever objects are removed; anything that must survive a
//! frame boundary keys on [`ComponentId`].

use std::sync::Arc;

use rustc_hash::FxHashMap;
use sightline_math::BoxSphereBounds;

use crate::flags::OcclusionFlags;
use crate::ids::{ComponentId, MeshId, TypeTag};
use crate::proxy::PrimitiveProxy;

/// World bounds plus the draw-distance window of one object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimitiveBounds {
    pub bounds: BoxSphereBounds,
    pub min_draw_distance: f32,
    /// `f32::INFINITY` when the object has no distance limit.
    pub max_draw_distance: f32,
}

/// Registration parameters for a new object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimitiveDesc {
    pub type_tag: TypeTag,
    pub min_draw_distance: f32,
    pub max_draw_distance: f32,
    pub occlusion_flags: OcclusionFlags,
    /// Slot in precomputed visibility tables, if the object was baked.
    pub visibility_id: Option<u32>,
}

impl Default for PrimitiveDesc {
    fn default() -> Self {
        Self {
            type_tag: TypeTag::default(),
            min_draw_distance: 0.0,
            max_draw_distance: f32::INFINITY,
            occlusion_flags: OcclusionFlags::CAN_BE_OCCLUDED
                | OcclusionFlags::ALLOW_APPROXIMATE_OCCLUSION,
            visibility_id: None,
        }
    }
}

impl PrimitiveDesc {
    #[must_use]
    pub fn with_type(mut self, type_tag: TypeTag) -> Self {
        self.type_tag = type_tag;
        self
    }

    #[must_use]
    pub fn with_draw_distance(mut self, min: f32, max: f32) -> Self {
        self.min_draw_distance = min;
        self.max_draw_distance = max;
        self
    }

    #[must_use]
    pub fn with_occlusion_flags(mut self, flags: OcclusionFlags) -> Self {
        self.occlusion_flags = flags;
        self
    }

    #[must_use]
    pub fn with_visibility_id(mut self, visibility_id: u32) -> Self {
        self.visibility_id = Some(visibility_id);
        self
    }
}

/// Borrowed view of one registered object.
#[derive(Clone, Copy)]
pub struct PrimitiveRecord<'a> {
    pub index: usize,
    pub id: ComponentId,
    pub proxy: Option<&'a Arc<dyn PrimitiveProxy>>,
    pub bounds: &'a PrimitiveBounds,
    pub occlusion_bounds: &'a BoxSphereBounds,
    pub occlusion_flags: OcclusionFlags,
    pub type_tag: TypeTag,
    pub mesh_ids: &'a [MeshId],
    pub visibility_id: Option<u32>,
}

/// Contiguous run of same-type objects: `[previous bucket end, end)`.
#[derive(Clone, Copy, Debug)]
struct TypeBucket {
    tag: TypeTag,
    end: usize,
}

/// Dense storage for all renderable objects.
#[derive(Default)]
pub struct PrimitiveRegistry {
    proxies: Vec<Option<Arc<dyn PrimitiveProxy>>>,
    bounds: Vec<PrimitiveBounds>,
    occlusion_bounds: Vec<BoxSphereBounds>,
    occlusion_flags: Vec<OcclusionFlags>,
    component_ids: Vec<ComponentId>,
    type_tags: Vec<TypeTag>,
    mesh_ids: Vec<Vec<MeshId>>,
    visibility_ids: Vec<Option<u32>>,

    buckets: Vec<TypeBucket>,
    id_to_index: FxHashMap<ComponentId, usize>,
    next_component_id: u32,

    free_mesh_ids: Vec<u32>,
    mesh_id_capacity: u32,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.component_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.component_ids.is_empty()
    }

    /// Register an object. Returns its new id and its index after it was
    /// moved into its type bucket.
    pub fn add(&mut self, proxy: Arc<dyn PrimitiveProxy>, desc: PrimitiveDesc) -> (ComponentId, usize) {
        let id = ComponentId(self.next_component_id);
        self.next_component_id += 1;

        let bounds = proxy.bounds();
        let mesh_ids = (0..proxy.static_meshes().len())
            .map(|_| self.allocate_mesh_id())
            .collect();

        let index = self.component_ids.len();
        self.proxies.push(Some(proxy));
        self.bounds.push(PrimitiveBounds {
            bounds,
            min_draw_distance: desc.min_draw_distance,
            max_draw_distance: desc.max_draw_distance,
        });
        self.occlusion_bounds.push(bounds);
        self.occlusion_flags.push(desc.occlusion_flags);
        self.component_ids.push(id);
        self.type_tags.push(desc.type_tag);
        self.mesh_ids.push(mesh_ids);
        self.visibility_ids.push(desc.visibility_id);
        self.id_to_index.insert(id, index);

        let index = self.insert_into_bucket(desc.type_tag, index);
        self.check_lengths();
        tracing::trace!(%id, index, type_tag = desc.type_tag.0, "registered primitive");
        (id, index)
    }

    /// Remove the object at `index`, returning its id.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a registered object.
    pub fn remove(&mut self, index: usize) -> ComponentId {
        assert!(
            index < self.len(),
            "removing primitive at index {index} but only {} are registered",
            self.len()
        );
        let Some(first_bucket) = self.buckets.iter().position(|b| index < b.end) else {
            panic!("type bucket table does not cover index {index}");
        };

        // Fill the hole with the last element of each following bucket in turn
        // until it reaches the end of the arrays.
        let mut hole = index;
        for j in first_bucket..self.buckets.len() {
            let last = self.buckets[j].end - 1;
            self.swap_entries(hole, last);
            self.buckets[j].end -= 1;
            hole = last;
        }
        debug_assert_eq!(hole, self.len() - 1);

        self.proxies.pop();
        self.bounds.pop();
        self.occlusion_bounds.pop();
        self.occlusion_flags.pop();
        self.type_tags.pop();
        self.visibility_ids.pop();
        let mesh_ids = self.mesh_ids.pop().unwrap_or_default();
        self.free_mesh_ids.extend(mesh_ids.iter().map(|m| m.0));
        let Some(id) = self.component_ids.pop() else {
            panic!("component id array shorter than the others");
        };
        self.id_to_index.remove(&id);

        let mut previous_end = 0;
        self.buckets.retain(|bucket| {
            let keep = bucket.end > previous_end;
            previous_end = bucket.end;
            keep
        });

        self.check_lengths();
        tracing::trace!(%id, index, "removed primitive");
        id
    }

    /// Remove an object by id. Returns `false` when the id is unknown.
    pub fn remove_by_id(&mut self, id: ComponentId) -> bool {
        match self.index_of(id) {
            Some(index) => {
                self.remove(index);
                true
            }
            None => false,
        }
    }

    /// Current dense index of `id`.
    pub fn index_of(&self, id: ComponentId) -> Option<usize> {
        self.id_to_index.get(&id).copied()
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.id_to_index.contains_key(&id)
    }

    /// Everything known about the object at `index`.
    pub fn get(&self, index: usize) -> Option<PrimitiveRecord<'_>> {
        if index >= self.len() {
            return None;
        }
        Some(PrimitiveRecord {
            index,
            id: self.component_ids[index],
            proxy: self.proxies[index].as_ref(),
            bounds: &self.bounds[index],
            occlusion_bounds: &self.occlusion_bounds[index],
            occlusion_flags: self.occlusion_flags[index],
            type_tag: self.type_tags[index],
            mesh_ids: &self.mesh_ids[index],
            visibility_id: self.visibility_ids[index],
        })
    }

    /// Move an object. Returns `false` when the id is unknown.
    pub fn update_bounds(&mut self, id: ComponentId, bounds: BoxSphereBounds) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        self.bounds[index].bounds = bounds;
        self.occlusion_bounds[index] = bounds;
        true
    }

    /// Detach the proxy of an object that is being torn down. The object
    /// stays registered but is skipped by relevance until removed.
    pub fn release_proxy(&mut self, id: ComponentId) -> Option<Arc<dyn PrimitiveProxy>> {
        let index = self.index_of(id)?;
        self.proxies[index].take()
    }

    pub fn proxies(&self) -> &[Option<Arc<dyn PrimitiveProxy>>] {
        &self.proxies
    }

    pub fn bounds(&self) -> &[PrimitiveBounds] {
        &self.bounds
    }

    pub fn occlusion_bounds(&self) -> &[BoxSphereBounds] {
        &self.occlusion_bounds
    }

    pub fn occlusion_flags(&self) -> &[OcclusionFlags] {
        &self.occlusion_flags
    }

    pub fn component_ids(&self) -> &[ComponentId] {
        &self.component_ids
    }

    pub fn type_tags(&self) -> &[TypeTag] {
        &self.type_tags
    }

    pub fn mesh_ids(&self) -> &[Vec<MeshId>] {
        &self.mesh_ids
    }

    pub fn visibility_ids(&self) -> &[Option<u32>] {
        &self.visibility_ids
    }

    /// Size needed for per-mesh bitsets: one past the highest mesh id handed
    /// out so far.
    pub fn mesh_id_capacity(&self) -> usize {
        self.mesh_id_capacity as usize
    }

    /// Full structural check: parallel arrays, the id map and the type
    /// bucket table all agree.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first inconsistency found.
    pub fn assert_consistent(&self) {
        self.check_lengths();
        let mut start = 0;
        for bucket in &self.buckets {
            assert!(bucket.end > start, "empty or unordered type bucket {:?}", bucket.tag);
            for index in start..bucket.end {
                assert_eq!(
                    self.type_tags[index], bucket.tag,
                    "index {index} is outside its type bucket"
                );
            }
            start = bucket.end;
        }
        assert_eq!(start, self.len(), "type buckets do not cover every primitive");
        for (index, id) in self.component_ids.iter().enumerate() {
            assert_eq!(self.id_to_index.get(id), Some(&index), "stale index for {id}");
        }
    }

    fn check_lengths(&self) {
        let len = self.component_ids.len();
        assert!(
            self.proxies.len() == len
                && self.bounds.len() == len
                && self.occlusion_bounds.len() == len
                && self.occlusion_flags.len() == len
                && self.type_tags.len() == len
                && self.mesh_ids.len() == len
                && self.visibility_ids.len() == len
                && self.id_to_index.len() == len,
            "primitive registry arrays out of sync (expected {len} entries)"
        );
    }

    /// Moves the element at `index`, the last slot, into the end of the
    /// bucket for `tag`. Returns its final index.
    fn insert_into_bucket(&mut self, tag: TypeTag, mut index: usize) -> usize {
        let Some(target) = self.buckets.iter().position(|b| b.tag == tag) else {
            self.buckets.push(TypeBucket { tag, end: index + 1 });
            return index;
        };
        // Rotate the first element of every following bucket to that bucket's end.
        for j in (target + 1..self.buckets.len()).rev() {
            let first = self.buckets[j - 1].end;
            self.swap_entries(index, first);
            self.buckets[j].end += 1;
            index = first;
        }
        self.buckets[target].end += 1;
        index
    }

    fn swap_entries(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.proxies.swap(a, b);
        self.bounds.swap(a, b);
        self.occlusion_bounds.swap(a, b);
        self.occlusion_flags.swap(a, b);
        self.component_ids.swap(a, b);
        self.type_tags.swap(a, b);
        self.mesh_ids.swap(a, b);
        self.visibility_ids.swap(a, b);
        self.id_to_index.insert(self.component_ids[a], a);
        self.id_to_index.insert(self.component_ids[b], b);
    }

    fn allocate_mesh_id(&mut self) -> MeshId {
        if let Some(id) = self.free_mesh_ids.pop() {
            return MeshId(id);
        }
        let id = self.mesh_id_capacity;
        self.mesh_id_capacity += 1;
        MeshId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{StaticMeshLod, ViewRelevance};
    use crate::view::SceneView;
    use glam::Vec3;

    struct Dummy {
        meshes: Vec<StaticMeshLod>,
    }

    impl PrimitiveProxy for Dummy {
        fn bounds(&self) -> BoxSphereBounds {
            BoxSphereBounds::from_extent(Vec3::ZERO, Vec3::ONE)
        }
        fn view_relevance(&self, _view: &SceneView) -> ViewRelevance {
            ViewRelevance::opaque_static()
        }
        fn static_meshes(&self) -> &[StaticMeshLod] {
            &self.meshes
        }
    }

    fn dummy(mesh_count: usize) -> Arc<dyn PrimitiveProxy> {
        Arc::new(Dummy {
            meshes: (0..mesh_count)
                .map(|i| StaticMeshLod::new(i as i8, 1.0 / (i + 1) as f32))
                .collect(),
        })
    }

    fn tagged(tag: u32) -> PrimitiveDesc {
        PrimitiveDesc::default().with_type(TypeTag(tag))
    }

    /// Interleaved adds of three types end up grouped by type.
    #[test]
    fn test_add_keeps_type_buckets_contiguous() {
        let mut registry = PrimitiveRegistry::new();
        for tag in [0, 1, 2, 0, 1, 0, 2, 2, 1, 0] {
            registry.add(dummy(0), tagged(tag));
            registry.assert_consistent();
        }
        let tags: Vec<u32> = registry.type_tags().iter().map(|t| t.0).collect();
        assert_eq!(tags, vec![0, 0, 0, 0, 1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_remove_keeps_ids_resolvable() {
        let mut registry = PrimitiveRegistry::new();
        let ids: Vec<_> = [0, 1, 0, 2, 1, 2]
            .into_iter()
            .map(|tag| registry.add(dummy(0), tagged(tag)).0)
            .collect();

        let removed_index = registry.index_of(ids[0]).unwrap();
        assert_eq!(registry.remove(removed_index), ids[0]);
        registry.assert_consistent();
        assert_eq!(registry.len(), 5);
        assert!(!registry.contains(ids[0]));
        for id in &ids[1..] {
            let index = registry.index_of(*id).unwrap();
            assert_eq!(registry.get(index).unwrap().id, *id);
        }
    }

    #[test]
    fn test_removing_last_of_type_drops_bucket() {
        let mut registry = PrimitiveRegistry::new();
        let (a, _) = registry.add(dummy(0), tagged(0));
        registry.add(dummy(0), tagged(1));
        registry.add(dummy(0), tagged(2));
        assert!(registry.remove_by_id(a));
        registry.assert_consistent();
        registry.add(dummy(0), tagged(1));
        registry.assert_consistent();
        let tags: Vec<u32> = registry.type_tags().iter().map(|t| t.0).collect();
        assert_eq!(tags, vec![1, 1, 2]);
    }

    #[test]
    #[should_panic(expected = "removing primitive at index 3")]
    fn test_remove_absent_index_panics() {
        let mut registry = PrimitiveRegistry::new();
        registry.add(dummy(0), tagged(0));
        registry.remove(3);
    }

    #[test]
    fn test_mesh_ids_are_recycled() {
        let mut registry = PrimitiveRegistry::new();
        let (a, _) = registry.add(dummy(3), tagged(0));
        registry.add(dummy(2), tagged(0));
        assert_eq!(registry.mesh_id_capacity(), 5);

        registry.remove_by_id(a);
        let (c, _) = registry.add(dummy(3), tagged(0));
        assert_eq!(registry.mesh_id_capacity(), 5);
        let index = registry.index_of(c).unwrap();
        let mut reused: Vec<u32> = registry.mesh_ids()[index].iter().map(|m| m.0).collect();
        reused.sort_unstable();
        assert_eq!(reused, vec![0, 1, 2]);
    }

    #[test]
    fn test_update_bounds_moves_both_volumes() {
        let mut registry = PrimitiveRegistry::new();
        let (id, _) = registry.add(dummy(0), tagged(0));
        let moved = BoxSphereBounds::from_extent(Vec3::new(5.0, 0.0, 0.0), Vec3::ONE);
        assert!(registry.update_bounds(id, moved));
        assert_eq!(registry.bounds()[0].bounds, moved);
        assert_eq!(registry.occlusion_bounds()[0], moved);
        assert!(!registry.update_bounds(ComponentId(99), moved));
    }

    #[test]
    fn test_release_proxy_leaves_object_registered() {
        let mut registry = PrimitiveRegistry::new();
        let (id, index) = registry.add(dummy(0), tagged(0));
        assert!(registry.release_proxy(id).is_some());
        assert!(registry.get(index).unwrap().proxy.is_none());
        assert_eq!(registry.len(), 1);
    }
}
