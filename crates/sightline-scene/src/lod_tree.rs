//! Hierarchical LOD registrations: which low-detail proxy stands in for
//! which group of objects.

use rustc_hash::FxHashMap;

use crate::ids::ComponentId;

/// One HLOD proxy and the objects it replaces when far away.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HlodNode {
    pub children: Vec<ComponentId>,
}

/// All HLOD parent/child links in the scene, keyed by component id.
#[derive(Clone, Debug, Default)]
pub struct HlodTree {
    nodes: FxHashMap<ComponentId, HlodNode>,
    parents: FxHashMap<ComponentId, ComponentId>,
}

impl HlodTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when at least one HLOD node exists.
    pub fn is_active(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Link `child` under `parent`. A child already owned by another parent
    /// is moved.
    pub fn attach(&mut self, parent: ComponentId, child: ComponentId) {
        if let Some(previous) = self.parents.get(&child).copied() {
            if previous == parent {
                return;
            }
            self.detach(previous, child);
        }
        self.nodes.entry(parent).or_default().children.push(child);
        self.parents.insert(child, parent);
    }

    /// Unlink `child` from `parent`. A node left without children is dropped.
    pub fn detach(&mut self, parent: ComponentId, child: ComponentId) {
        let Some(node) = self.nodes.get_mut(&parent) else {
            return;
        };
        node.children.retain(|c| *c != child);
        if node.children.is_empty() {
            self.nodes.remove(&parent);
        }
        if self.parents.get(&child) == Some(&parent) {
            self.parents.remove(&child);
        }
    }

    /// Forget every link involving `id`, as parent or as child.
    pub fn remove_component(&mut self, id: ComponentId) {
        if let Some(parent) = self.parents.get(&id).copied() {
            self.detach(parent, id);
        }
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.parents.remove(&child);
            }
        }
    }

    pub fn node(&self, id: ComponentId) -> Option<&HlodNode> {
        self.nodes.get(&id)
    }

    pub fn parent_of(&self, child: ComponentId) -> Option<ComponentId> {
        self.parents.get(&child).copied()
    }

    /// Nodes that are not themselves children of another node, in ascending
    /// id order so traversal is deterministic.
    pub fn roots(&self) -> Vec<ComponentId> {
        let mut roots: Vec<_> = self
            .nodes
            .keys()
            .filter(|id| !self.parents.contains_key(id))
            .copied()
            .collect();
        roots.sort_unstable();
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_and_detach() {
        let mut tree = HlodTree::new();
        let parent = ComponentId(1);
        tree.attach(parent, ComponentId(2));
        tree.attach(parent, ComponentId(3));
        assert_eq!(tree.node(parent).unwrap().children.len(), 2);
        assert_eq!(tree.parent_of(ComponentId(3)), Some(parent));

        tree.detach(parent, ComponentId(2));
        tree.detach(parent, ComponentId(3));
        assert!(tree.node(parent).is_none());
        assert!(!tree.is_active());
    }

    #[test]
    fn test_reattach_moves_child() {
        let mut tree = HlodTree::new();
        tree.attach(ComponentId(1), ComponentId(5));
        tree.attach(ComponentId(2), ComponentId(6));
        tree.attach(ComponentId(2), ComponentId(5));
        assert!(tree.node(ComponentId(1)).is_none());
        assert_eq!(tree.parent_of(ComponentId(5)), Some(ComponentId(2)));
    }

    #[test]
    fn test_roots_exclude_nested_nodes() {
        let mut tree = HlodTree::new();
        tree.attach(ComponentId(10), ComponentId(4));
        tree.attach(ComponentId(4), ComponentId(1));
        tree.attach(ComponentId(7), ComponentId(8));
        assert_eq!(tree.roots(), vec![ComponentId(7), ComponentId(10)]);
    }

    #[test]
    fn test_remove_component_clears_links() {
        let mut tree = HlodTree::new();
        tree.attach(ComponentId(10), ComponentId(4));
        tree.attach(ComponentId(4), ComponentId(1));
        tree.remove_component(ComponentId(4));
        assert!(tree.node(ComponentId(4)).is_none());
        assert!(tree.node(ComponentId(10)).is_none());
        assert_eq!(tree.parent_of(ComponentId(1)), None);
    }
}
