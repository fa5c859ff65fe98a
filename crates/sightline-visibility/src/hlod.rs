//! Hierarchical LOD visibility.
//!
//! Each HLOD node is a low-detail proxy standing in for its children once
//! the camera is far enough away. Node range state is re-evaluated on
//! temporal LOD sync points; dithered nodes cross-fade with their children
//! for one sync period instead of popping.
//!
//! The result is a set of per-object maps the frustum cull and relevance
//! stages consume: forced visible, forced hidden, fading and fading out.

use rustc_hash::FxHashMap;
use sightline_config::LodConfig;
use sightline_scene::{BitArray, ComponentId, HlodTree, PrimitiveRegistry, SceneView};

use crate::fading::{FadeParams, FadingStateManager};

/// Where a node is in its transition cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HlodNodeVisibility {
    NotVisible,
    FadingIn,
    FadingOut,
    StablyVisible,
}

#[derive(Clone, Copy, Debug, Default)]
struct NodeState {
    was_visible: bool,
    is_visible: bool,
    is_fading: bool,
    /// Update round that last touched this node; equal to the current round
    /// means the node was already handled, usually hidden by an ancestor.
    update_count: u32,
}

impl NodeState {
    fn visibility(&self) -> HlodNodeVisibility {
        match (self.is_fading, self.is_visible) {
            (true, true) => HlodNodeVisibility::FadingIn,
            (true, false) => HlodNodeVisibility::FadingOut,
            (false, true) => HlodNodeVisibility::StablyVisible,
            (false, false) => HlodNodeVisibility::NotVisible,
        }
    }
}

/// Per-object HLOD overrides for one view and frame, indexed like the
/// registry.
#[derive(Clone, Debug, PartialEq)]
pub struct HlodMaps {
    pub fading: BitArray,
    /// Fading objects heading towards hidden.
    pub fading_out: BitArray,
    pub forced_visible: BitArray,
    pub forced_hidden: BitArray,
    /// Fade ramps for objects with a transition in progress.
    pub fades: Vec<(usize, FadeParams)>,
}

impl HlodMaps {
    pub fn new(len: usize) -> Self {
        Self {
            fading: BitArray::new(len),
            fading_out: BitArray::new(len),
            forced_visible: BitArray::new(len),
            forced_hidden: BitArray::new(len),
            fades: Vec::new(),
        }
    }
}

/// HLOD node states one view keeps across frames.
#[derive(Clone, Debug)]
pub struct HlodVisibilityState {
    nodes: FxHashMap<ComponentId, NodeState>,
    update_count: u32,
    sync_time: Option<f32>,
    fov_scale_sq: f32,
    fading: FadingStateManager,
    last_frame: Option<u32>,
}

impl HlodVisibilityState {
    pub fn new(fade_duration: f32) -> Self {
        Self {
            nodes: FxHashMap::default(),
            update_count: 0,
            sync_time: None,
            fov_scale_sq: 1.0,
            fading: FadingStateManager::new(fade_duration),
            last_frame: None,
        }
    }

    pub fn node_visibility(&self, id: ComponentId) -> Option<HlodNodeVisibility> {
        self.nodes.get(&id).map(NodeState::visibility)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn fading(&self) -> &FadingStateManager {
        &self.fading
    }

    pub(crate) fn set_fade_duration(&mut self, duration: f32) {
        self.fading.set_duration(duration);
    }

    /// Re-evaluate every node and build this frame's maps.
    ///
    /// `sync_time` is the temporal LOD sync time; a change marks a sync
    /// frame. Frozen views keep their node states but still get maps. Returns
    /// `None` when the scene has no HLOD nodes.
    pub fn update(
        &mut self,
        registry: &PrimitiveRegistry,
        tree: &HlodTree,
        view: &SceneView,
        sync_time: f32,
        config: &LodConfig,
    ) -> Option<HlodMaps> {
        self.nodes.retain(|id, _| tree.node(*id).is_some());
        if !tree.is_active() {
            return None;
        }
        let _span = tracing::info_span!("hlod_update", nodes = tree.len()).entered();

        let now = view.real_time;
        let frame = view.frame_number;
        self.fading
            .prune(now, self.last_frame.unwrap_or(frame), view.is_paused);
        self.last_frame = Some(frame);

        let sync = self.sync_time != Some(sync_time);
        if sync {
            self.sync_time = Some(sync_time);
            // Only on sync frames, so a zoom cannot flip a fade mid-way.
            self.fov_scale_sq = if config.fov_affects_hlod {
                view.fov_distance_scale().powi(2)
            } else {
                1.0
            };
        }
        self.update_count = self.update_count.wrapping_add(1);

        let mut walk = Walk {
            registry,
            tree,
            view,
            nodes: &mut self.nodes,
            fading: &mut self.fading,
            maps: HlodMaps::new(registry.len()),
            update_count: self.update_count,
            fov_scale_sq: self.fov_scale_sq,
            sync,
            frozen: view.is_frozen,
        };
        for root in tree.roots() {
            walk.visit(root);
        }
        let maps = walk.maps;
        tracing::debug!(
            sync,
            forced_visible = maps.forced_visible.count_ones(),
            forced_hidden = maps.forced_hidden.count_ones(),
            fading = maps.fading.count_ones(),
            "HLOD maps built"
        );
        Some(maps)
    }
}

struct Walk<'a> {
    registry: &'a PrimitiveRegistry,
    tree: &'a HlodTree,
    view: &'a SceneView,
    nodes: &'a mut FxHashMap<ComponentId, NodeState>,
    fading: &'a mut FadingStateManager,
    maps: HlodMaps,
    update_count: u32,
    fov_scale_sq: f32,
    sync: bool,
    frozen: bool,
}

impl Walk<'_> {
    /// Parents before children, so nodes hidden by an ancestor are skipped.
    fn visit(&mut self, id: ComponentId) {
        if self
            .nodes
            .get(&id)
            .is_some_and(|s| s.update_count == self.update_count)
        {
            return;
        }
        self.update_node(id);

        let tree = self.tree;
        if let Some(node) = tree.node(id) {
            for &child in &node.children {
                if tree.node(child).is_some() {
                    self.visit(child);
                }
            }
        }
    }

    fn update_node(&mut self, id: ComponentId) {
        let registry = self.registry;
        let Some(index) = registry.index_of(id) else {
            return;
        };
        let Some(proxy) = registry.proxies()[index].as_ref() else {
            return;
        };
        let Some(first_mesh) = proxy.static_meshes().first() else {
            return;
        };
        let dithered = first_mesh.dithered_lod_transition;

        let primitive = &registry.bounds()[index];
        let min_sq = primitive.min_draw_distance * primitive.min_draw_distance;
        let forced_into_view = min_sq < 1e-8;
        let dist_sq = primitive
            .bounds
            .squared_distance_from_box_to_point(self.view.view_origin);
        let in_range = dist_sq >= min_sq * self.fov_scale_sq;

        let state = self.nodes.entry(id).or_default();
        if !self.frozen {
            if dithered && !forced_into_view {
                if self.sync {
                    if state.is_fading {
                        state.is_fading = false;
                    } else if in_range != state.was_visible {
                        state.is_fading = true;
                    }
                    state.was_visible = state.is_visible;
                    state.is_visible = in_range;
                }
            } else {
                state.was_visible = state.is_visible;
                state.is_visible = in_range || forced_into_view;
                state.is_fading = false;
            }
        }
        let state = *state;

        if state.is_fading {
            self.maps.fading.set(index, true);
            self.maps.fading_out.set(index, !state.is_visible);
            self.maps.forced_visible.set(index, true);
            self.fade_children(id, state.is_visible);
        } else if state.is_visible {
            self.maps.forced_visible.set(index, true);
            self.hide_children(id);
        } else {
            self.maps.forced_hidden.set(index, true);
        }

        self.drive_fades(id, index, state.is_visible);
    }

    /// Direct children cross-fade against the node; anything deeper stays
    /// hidden.
    fn fade_children(&mut self, id: ComponentId, node_visible: bool) {
        self.nodes.entry(id).or_default().update_count = self.update_count;
        let tree = self.tree;
        let Some(node) = tree.node(id) else {
            return;
        };
        for &child in &node.children {
            if let Some(index) = self.registry.index_of(child) {
                self.maps.fading.set(index, true);
                self.maps.fading_out.set(index, node_visible);
                self.maps.forced_hidden.set(index, false);
                self.maps.forced_visible.set(index, true);
            }
            if tree.node(child).is_some() {
                self.hide_children(child);
            }
        }
    }

    fn hide_children(&mut self, id: ComponentId) {
        let state = self.nodes.entry(id).or_default();
        if state.update_count == self.update_count {
            return;
        }
        state.update_count = self.update_count;

        let tree = self.tree;
        let Some(node) = tree.node(id) else {
            return;
        };
        for &child in &node.children {
            if let Some(index) = self.registry.index_of(child) {
                self.maps.forced_hidden.set(index, true);
            }
            if tree.node(child).is_some() {
                self.hide_children(child);
            }
        }
    }

    /// Feed the node and its children to the fade tracker every frame so a
    /// transition is seen the frame it happens.
    fn drive_fades(&mut self, id: ComponentId, index: usize, node_visible: bool) {
        let now = self.view.real_time;
        let frame = self.view.frame_number;
        let params = self.fading.update_fade(id, node_visible, now, frame);
        if let Some(params) = params
            && self.maps.fading.get(index)
        {
            self.maps.fades.push((index, params));
        }

        let tree = self.tree;
        let Some(node) = tree.node(id) else {
            return;
        };
        for &child in &node.children {
            let params = self.fading.update_fade(child, !node_visible, now, frame);
            if let Some(params) = params
                && let Some(child_index) = self.registry.index_of(child)
                && self.maps.fading.get(child_index)
            {
                self.maps.fades.push((child_index, params));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glam::Vec3;
    use sightline_scene::{PrimitiveDesc, Scene, StaticMeshLod};

    use crate::test_support::{TestProxy, camera};

    const PARENT_AT: Vec3 = Vec3::new(0.0, 0.0, -500.0);

    /// A parent proxy that takes over beyond 100 units, with three children.
    fn build(dithered: bool) -> (Scene, ComponentId, Vec<ComponentId>) {
        let mut scene = Scene::new();
        let mesh = StaticMeshLod::new(0, 0.0);
        let mesh = if dithered { mesh.dithered() } else { mesh };
        let parent = scene.add_object(
            Arc::new(TestProxy::at(PARENT_AT).with_meshes(vec![mesh])),
            PrimitiveDesc::default().with_draw_distance(100.0, f32::INFINITY),
        );
        let children: Vec<_> = (0..3)
            .map(|i| {
                let at = PARENT_AT + Vec3::new(i as f32 * 4.0, 0.0, 0.0);
                scene.add_object(Arc::new(TestProxy::at(at)), PrimitiveDesc::default())
            })
            .collect();
        for child in &children {
            scene.attach_hlod_child(parent, *child);
        }
        (scene, parent, children)
    }

    fn update(state: &mut HlodVisibilityState, scene: &Scene, view: &SceneView, sync: f32) -> HlodMaps {
        state
            .update(scene.registry(), scene.hlod_tree(), view, sync, &LodConfig::default())
            .unwrap()
    }

    fn index(scene: &Scene, id: ComponentId) -> usize {
        scene.registry().index_of(id).unwrap()
    }

    /// A parent in range is drawn in place of its children.
    #[test]
    fn test_parent_in_range_hides_children() {
        let (scene, parent, children) = build(false);
        let mut state = HlodVisibilityState::new(0.25);
        let maps = update(&mut state, &scene, &camera(Vec3::ZERO).at_frame(1, 0.0), 0.0);

        assert!(maps.forced_visible.get(index(&scene, parent)));
        for child in &children {
            assert!(maps.forced_hidden.get(index(&scene, *child)));
            assert!(!maps.forced_visible.get(index(&scene, *child)));
        }
        assert_eq!(state.node_visibility(parent), Some(HlodNodeVisibility::StablyVisible));
    }

    #[test]
    fn test_parent_out_of_range_is_hidden() {
        let (scene, parent, children) = build(false);
        let mut state = HlodVisibilityState::new(0.25);
        let near = camera(Vec3::new(0.0, 0.0, -450.0)).at_frame(1, 0.0);
        let maps = update(&mut state, &scene, &near, 0.0);

        assert!(maps.forced_hidden.get(index(&scene, parent)));
        for child in &children {
            assert!(!maps.forced_hidden.get(index(&scene, *child)));
        }
        assert_eq!(state.node_visibility(parent), Some(HlodNodeVisibility::NotVisible));
    }

    #[test]
    fn test_empty_tree_yields_no_maps() {
        let mut scene = Scene::new();
        scene.add_object(Arc::new(TestProxy::at(PARENT_AT)), PrimitiveDesc::default());
        let mut state = HlodVisibilityState::new(0.25);
        let view = camera(Vec3::ZERO);
        assert!(
            state
                .update(scene.registry(), scene.hlod_tree(), &view, 0.0, &LodConfig::default())
                .is_none()
        );
    }

    /// Dithered nodes only change on sync frames and fade for one sync period.
    #[test]
    fn test_dithered_transition_waits_for_sync() {
        let (scene, parent, children) = build(true);
        let far = camera(Vec3::ZERO);
        let near = camera(Vec3::new(0.0, 0.0, -450.0));
        let mut state = HlodVisibilityState::new(0.25);

        update(&mut state, &scene, &far.clone().at_frame(1, 0.0), 0.0);
        update(&mut state, &scene, &far.clone().at_frame(2, 0.1), 1.0);
        assert_eq!(state.node_visibility(parent), Some(HlodNodeVisibility::StablyVisible));

        // Moving close does nothing until the next sync.
        let maps = update(&mut state, &scene, &near.clone().at_frame(3, 0.2), 1.0);
        assert_eq!(state.node_visibility(parent), Some(HlodNodeVisibility::StablyVisible));
        assert!(maps.fades.is_empty());

        let maps = update(&mut state, &scene, &near.clone().at_frame(4, 0.3), 2.0);
        assert_eq!(state.node_visibility(parent), Some(HlodNodeVisibility::FadingOut));
        let parent_index = index(&scene, parent);
        assert!(maps.fading.get(parent_index) && maps.fading_out.get(parent_index));
        assert!(maps.forced_visible.get(parent_index));
        for child in &children {
            let i = index(&scene, *child);
            assert!(maps.fading.get(i) && !maps.fading_out.get(i));
            assert!(maps.forced_visible.get(i) && !maps.forced_hidden.get(i));
        }
        assert_eq!(maps.fades.len(), 4);

        let maps = update(&mut state, &scene, &near.at_frame(5, 0.9), 3.0);
        assert_eq!(state.node_visibility(parent), Some(HlodNodeVisibility::NotVisible));
        assert!(maps.forced_hidden.get(parent_index));
        assert_eq!(maps.fading.count_ones(), 0);
    }

    /// Nodes with a zero min draw distance are always in view.
    #[test]
    fn test_forced_into_view_ignores_range() {
        let mut scene = Scene::new();
        let parent = scene.add_object(
            Arc::new(TestProxy::at(PARENT_AT).with_meshes(vec![StaticMeshLod::new(0, 0.0).dithered()])),
            PrimitiveDesc::default(),
        );
        let child = scene.add_object(Arc::new(TestProxy::at(PARENT_AT)), PrimitiveDesc::default());
        scene.attach_hlod_child(parent, child);
        let mut state = HlodVisibilityState::new(0.25);
        let maps = update(&mut state, &scene, &camera(PARENT_AT).at_frame(1, 0.0), 0.0);
        assert!(maps.forced_visible.get(index(&scene, parent)));
        assert!(maps.forced_hidden.get(index(&scene, child)));
    }

    /// A visible root hides nested nodes and their children too.
    #[test]
    fn test_nested_nodes_hidden_by_visible_root() {
        let (mut scene, parent, children) = build(false);
        let leaf = scene.add_object(Arc::new(TestProxy::at(PARENT_AT)), PrimitiveDesc::default());
        scene.attach_hlod_child(children[0], leaf);
        let mut state = HlodVisibilityState::new(0.25);
        let maps = update(&mut state, &scene, &camera(Vec3::ZERO).at_frame(1, 0.0), 0.0);
        assert!(maps.forced_visible.get(index(&scene, parent)));
        assert!(maps.forced_hidden.get(index(&scene, children[0])));
        assert!(maps.forced_hidden.get(index(&scene, leaf)));
    }

    #[test]
    fn test_frozen_view_keeps_node_state() {
        let (scene, parent, _) = build(false);
        let mut state = HlodVisibilityState::new(0.25);
        update(&mut state, &scene, &camera(Vec3::ZERO).at_frame(1, 0.0), 0.0);

        let mut near = camera(Vec3::new(0.0, 0.0, -450.0)).at_frame(2, 0.1);
        near.is_frozen = true;
        let maps = update(&mut state, &scene, &near, 1.0);
        assert_eq!(state.node_visibility(parent), Some(HlodNodeVisibility::StablyVisible));
        assert!(maps.forced_visible.get(index(&scene, parent)));
    }

    #[test]
    fn test_removed_nodes_are_forgotten() {
        let (mut scene, parent, children) = build(false);
        let mut state = HlodVisibilityState::new(0.25);
        update(&mut state, &scene, &camera(Vec3::ZERO).at_frame(1, 0.0), 0.0);
        assert_eq!(state.node_count(), 1);

        for child in children {
            scene.detach_hlod_child(parent, child);
        }
        let view = camera(Vec3::ZERO).at_frame(2, 0.1);
        assert!(
            state
                .update(scene.registry(), scene.hlod_tree(), &view, 0.0, &LodConfig::default())
                .is_none()
        );
        assert_eq!(state.node_count(), 0);
    }
}
