//! Engine-level components shared by the stock systems.
//!
//! [`Transformable`] is the placement of an entity: a persisted local
//! [`Transform`] plus runtime state derived by systems (world matrix, local
//! bounds, octree handle). Only `local` is saved; everything else is rebuilt
//! after a load.

use serde::{Deserialize, Serialize};

use crate::ecs::{Component, EntityId, EntityWorld};
use crate::math::{Aabb, Mat4, Transform};
use crate::spatial::OctreeNodeId;

/// Placement of an entity in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformable {
    /// Transform relative to the parent entity.
    pub local: Transform,
    /// World matrix, written by `TransformPropagationSystem`.
    #[serde(skip, default = "identity")]
    pub global: Mat4,
    /// Bounds in local space, written by `AabbUpdateSystem`.
    #[serde(skip)]
    pub local_aabb: Option<Aabb>,
    /// Octree node holding this entity, managed by `OctreeSystem`.
    #[serde(skip)]
    pub node: Option<OctreeNodeId>,
}

impl Component for Transformable {}

fn identity() -> Mat4 {
    Mat4::IDENTITY
}

impl Transformable {
    pub fn new(local: Transform) -> Self {
        Self {
            local,
            global: local.matrix(),
            local_aabb: None,
            node: None,
        }
    }

    /// Local bounds mapped through the world matrix.
    pub fn global_aabb(&self) -> Option<Aabb> {
        self.local_aabb.map(|aabb| aabb.transformed(&self.global))
    }

    /// Post-load hook: derived state isn't persisted, so every loaded
    /// transform counts as changed.
    pub fn after_load(world: &mut EntityWorld, ids: &[EntityId]) {
        world.make_mutated::<Transformable>(ids);
    }
}

impl Default for Transformable {
    fn default() -> Self {
        Self::new(Transform::IDENTITY)
    }
}

impl From<Transform> for Transformable {
    fn from(local: Transform) -> Self {
        Self::new(local)
    }
}
