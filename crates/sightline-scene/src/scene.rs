//! The upstream face of the scene: what gameplay code calls to add, move and
//! remove renderable objects.

use std::sync::Arc;

use sightline_math::BoxSphereBounds;

use crate::ids::ComponentId;
use crate::lod_tree::HlodTree;
use crate::proxy::PrimitiveProxy;
use crate::registry::{PrimitiveDesc, PrimitiveRegistry};

/// A world of renderable objects plus their HLOD links.
#[derive(Default)]
pub struct Scene {
    registry: PrimitiveRegistry,
    hlod: HlodTree,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, proxy: Arc<dyn PrimitiveProxy>, desc: PrimitiveDesc) -> ComponentId {
        self.registry.add(proxy, desc).0
    }

    /// Returns `false` when `id` is not in the scene.
    pub fn remove_object(&mut self, id: ComponentId) -> bool {
        if !self.registry.remove_by_id(id) {
            return false;
        }
        self.hlod.remove_component(id);
        true
    }

    /// Returns `false` when `id` is not in the scene.
    pub fn update_transform(&mut self, id: ComponentId, bounds: BoxSphereBounds) -> bool {
        self.registry.update_bounds(id, bounds)
    }

    /// Make `parent` the HLOD proxy standing in for `child`. Links to
    /// objects that are not registered are ignored.
    pub fn attach_hlod_child(&mut self, parent: ComponentId, child: ComponentId) {
        if !self.registry.contains(parent) || !self.registry.contains(child) {
            tracing::warn!(%parent, %child, "ignoring HLOD link to unregistered object");
            return;
        }
        self.hlod.attach(parent, child);
    }

    pub fn detach_hlod_child(&mut self, parent: ComponentId, child: ComponentId) {
        self.hlod.detach(parent, child);
    }

    pub fn registry(&self) -> &PrimitiveRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PrimitiveRegistry {
        &mut self.registry
    }

    pub fn hlod_tree(&self) -> &HlodTree {
        &self.hlod
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
