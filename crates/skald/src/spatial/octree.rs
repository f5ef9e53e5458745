//! Octree spatial partitioning structure
//!
//! Divides space into hierarchical cubes for fast bounds queries. An entity
//! lives in the deepest node whose bounds fully contain its AABB, so boxes
//! straddling a split plane stay in the parent. Boxes outside the root are
//! kept in the root.
//!
//! Nodes live in a flat `Vec` and are addressed by [`OctreeNodeId`].
//! Components hold those ids as handles; the octree owns removal. When a
//! node subdivides, entities that move into children are reported through
//! [`Octree::take_relocations`] so handle holders can catch up.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ecs::EntityId;
use crate::math::{Aabb, Vec3};

/// Configuration for octree behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Half the edge length of the root cube, centered on the origin
    pub root_half_extent: f32,

    /// Maximum subdivision depth
    pub max_depth: u32,

    /// Entities a leaf holds before it subdivides
    pub max_entities_per_node: usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            root_half_extent: 1024.0,
            max_depth: 8,
            max_entities_per_node: 8,
        }
    }
}

/// Handle to a node of an [`Octree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OctreeNodeId(u32);

impl OctreeNodeId {
    pub const ROOT: OctreeNodeId = OctreeNodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct OctreeNode {
    bounds: Aabb,
    depth: u32,
    children: Option<[OctreeNodeId; 8]>,
    entities: Vec<EntityId>,
}

impl OctreeNode {
    fn new(bounds: Aabb, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            children: None,
            entities: Vec::new(),
        }
    }
}

/// Loose-fit octree over entity AABBs.
pub struct Octree {
    config: OctreeConfig,
    nodes: Vec<OctreeNode>,
    entries: HashMap<EntityId, (OctreeNodeId, Aabb)>,
    relocations: Vec<(EntityId, OctreeNodeId)>,
}

impl Octree {
    pub fn new(config: OctreeConfig) -> Self {
        let root = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(config.root_half_extent));
        Self {
            config,
            nodes: vec![OctreeNode::new(root, 0)],
            entries: HashMap::new(),
            relocations: Vec::new(),
        }
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Insert (or move) an entity, returning the node that now holds it.
    pub fn insert(&mut self, id: EntityId, aabb: Aabb) -> OctreeNodeId {
        self.remove(id);

        let mut node = OctreeNodeId::ROOT;
        loop {
            let current = &self.nodes[node.index()];
            if current.children.is_none() {
                let full = current.entities.len() >= self.config.max_entities_per_node;
                if !full || current.depth >= self.config.max_depth {
                    break;
                }
                self.subdivide(node);
            }
            match self.child_containing(node, &aabb) {
                Some(child) => node = child,
                None => break,
            }
        }

        self.nodes[node.index()].entities.push(id);
        self.entries.insert(id, (node, aabb));
        node
    }

    /// Update an entity's bounds. Stays in place while the box still fits
    /// its node and no child could take it; otherwise it is reinserted.
    pub fn update(&mut self, id: EntityId, aabb: Aabb) -> OctreeNodeId {
        if let Some(&(node, _)) = self.entries.get(&id) {
            let fits = node == OctreeNodeId::ROOT || self.nodes[node.index()].bounds.contains(&aabb);
            if fits && self.child_containing(node, &aabb).is_none() {
                self.entries.insert(id, (node, aabb));
                return node;
            }
        }
        self.insert(id, aabb)
    }

    /// Remove an entity, returning its last bounds.
    pub fn remove(&mut self, id: EntityId) -> Option<Aabb> {
        let (node, aabb) = self.entries.remove(&id)?;
        let entities = &mut self.nodes[node.index()].entities;
        if let Some(pos) = entities.iter().position(|&e| e == id) {
            entities.swap_remove(pos);
        }
        Some(aabb)
    }

    pub fn node_of(&self, id: EntityId) -> Option<OctreeNodeId> {
        self.entries.get(&id).map(|&(node, _)| node)
    }

    pub fn bounds_of(&self, id: EntityId) -> Option<Aabb> {
        self.entries.get(&id).map(|&(_, aabb)| aabb)
    }

    pub fn node_bounds(&self, node: OctreeNodeId) -> Option<Aabb> {
        self.nodes.get(node.index()).map(|n| n.bounds)
    }

    /// Entities whose bounds intersect `region`.
    pub fn find(&self, region: &Aabb) -> Vec<EntityId> {
        let mut found = Vec::new();
        let mut stack = vec![OctreeNodeId::ROOT];
        while let Some(node) = stack.pop() {
            let current = &self.nodes[node.index()];
            if node != OctreeNodeId::ROOT && !current.bounds.intersects(region) {
                continue;
            }
            found.extend(current.entities.iter().copied().filter(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|(_, aabb)| aabb.intersects(region))
            }));
            if let Some(children) = current.children {
                stack.extend(children);
            }
        }
        found
    }

    /// Entities moved to a different node by subdivision since the last
    /// call, with their new node.
    pub fn take_relocations(&mut self) -> Vec<(EntityId, OctreeNodeId)> {
        std::mem::take(&mut self.relocations)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[0].children = None;
        self.nodes[0].entities.clear();
        self.entries.clear();
        self.relocations.clear();
    }

    fn child_containing(&self, node: OctreeNodeId, aabb: &Aabb) -> Option<OctreeNodeId> {
        let current = &self.nodes[node.index()];
        let children = current.children?;
        let child = children[octant(current.bounds.center(), aabb.center())];
        self.nodes[child.index()]
            .bounds
            .contains(aabb)
            .then_some(child)
    }

    fn subdivide(&mut self, node: OctreeNodeId) {
        let (bounds, depth) = {
            let current = &self.nodes[node.index()];
            (current.bounds, current.depth)
        };
        let center = bounds.center();
        let quarter = bounds.half_extents() * 0.5;

        let mut children = [OctreeNodeId::ROOT; 8];
        for (octant, slot) in children.iter_mut().enumerate() {
            let sign = Vec3::new(
                if octant & 1 != 0 { 1.0 } else { -1.0 },
                if octant & 2 != 0 { 1.0 } else { -1.0 },
                if octant & 4 != 0 { 1.0 } else { -1.0 },
            );
            let child_bounds = Aabb::from_center_half_extents(center + quarter * sign, quarter);
            *slot = OctreeNodeId(self.nodes.len() as u32);
            self.nodes.push(OctreeNode::new(child_bounds, depth + 1));
        }
        self.nodes[node.index()].children = Some(children);

        // Push down whatever fits entirely inside a child.
        let residents = std::mem::take(&mut self.nodes[node.index()].entities);
        for id in residents {
            let Some(&(_, aabb)) = self.entries.get(&id) else {
                continue;
            };
            match self.child_containing(node, &aabb) {
                Some(child) => {
                    self.nodes[child.index()].entities.push(id);
                    self.entries.insert(id, (child, aabb));
                    self.relocations.push((id, child));
                }
                None => self.nodes[node.index()].entities.push(id),
            }
        }
    }
}

impl Default for Octree {
    fn default() -> Self {
        Self::new(OctreeConfig::default())
    }
}

/// Octant index (0-7) of `point` relative to `center`: bit 0 is +X, bit 1
/// is +Y, bit 2 is +Z.
fn octant(center: Vec3, point: Vec3) -> usize {
    let x = (point.x >= center.x) as usize;
    let y = (point.y >= center.y) as usize;
    let z = (point.z >= center.z) as usize;
    (z << 2) | (y << 1) | x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityPool;

    fn small_tree() -> Octree {
        Octree::new(OctreeConfig {
            root_half_extent: 16.0,
            max_depth: 3,
            max_entities_per_node: 2,
        })
    }

    fn cube(x: f32, y: f32, z: f32) -> Aabb {
        Aabb::from_center_half_extents(Vec3::new(x, y, z), Vec3::splat(0.5))
    }

    #[test]
    fn subdivides_and_reports_relocations() {
        let mut pool = EntityPool::new();
        let mut tree = small_tree();
        let a = pool.create();
        let b = pool.create();
        let c = pool.create();

        assert_eq!(tree.insert(a, cube(8.0, 8.0, 8.0)), OctreeNodeId::ROOT);
        assert_eq!(tree.insert(b, cube(-8.0, -8.0, -8.0)), OctreeNodeId::ROOT);
        let node_c = tree.insert(c, cube(8.0, -8.0, 8.0));
        assert_ne!(node_c, OctreeNodeId::ROOT);

        let moved = tree.take_relocations();
        assert_eq!(moved.len(), 2);
        for (id, node) in moved {
            assert_eq!(tree.node_of(id), Some(node));
            assert!(tree.node_bounds(node).unwrap().contains(&tree.bounds_of(id).unwrap()));
        }
        assert!(tree.take_relocations().is_empty());
    }

    #[test]
    fn straddling_boxes_stay_in_parent() {
        let mut pool = EntityPool::new();
        let mut tree = small_tree();
        for i in 0..3 {
            tree.insert(pool.create(), cube(i as f32 * 8.0 - 8.0, 4.0, 4.0));
        }
        let wide = pool.create();
        let node = tree.insert(wide, Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0)));
        assert_eq!(node, OctreeNodeId::ROOT);
    }

    #[test]
    fn find_returns_intersecting_entities() {
        let mut pool = EntityPool::new();
        let mut tree = small_tree();
        let ids: Vec<_> = (0..6)
            .map(|i| {
                let id = pool.create();
                tree.insert(id, cube(i as f32 * 4.0 - 10.0, 0.0, 0.0));
                id
            })
            .collect();
        let outside = pool.create();
        tree.insert(outside, cube(100.0, 0.0, 0.0));

        let mut hits = tree.find(&Aabb::new(Vec3::new(-11.0, -1.0, -1.0), Vec3::new(-5.0, 1.0, 1.0)));
        hits.sort();
        assert_eq!(hits, vec![ids[0], ids[1]]);
        assert_eq!(tree.find(&cube(100.0, 0.0, 0.0)), vec![outside]);
    }

    #[test]
    fn update_moves_only_when_needed() {
        let mut pool = EntityPool::new();
        let mut tree = small_tree();
        let ids: Vec<_> = (0..3).map(|_| pool.create()).collect();
        tree.insert(ids[0], cube(8.0, 8.0, 8.0));
        tree.insert(ids[1], cube(-8.0, -8.0, -8.0));
        let node = tree.insert(ids[2], cube(9.0, 9.0, 9.0));

        assert_eq!(tree.update(ids[2], cube(9.5, 9.0, 9.0)), node);
        let moved = tree.update(ids[2], cube(-9.0, 9.0, 9.0));
        assert_ne!(moved, node);
        assert_eq!(tree.node_of(ids[2]), Some(moved));
        assert_eq!(tree.len(), 3);

        assert!(tree.remove(ids[2]).is_some());
        assert!(tree.remove(ids[2]).is_none());
        assert!(tree.node_of(ids[2]).is_none());
    }
}
