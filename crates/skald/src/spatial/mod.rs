//! Spatial partitioning data structures
//!
//! Provides bounds-based indexing of entities for visibility and proximity
//! queries. Kept in sync with the world by
//! [`OctreeSystem`](crate::systems::OctreeSystem).

mod octree;

pub use octree::{Octree, OctreeConfig, OctreeNodeId};
