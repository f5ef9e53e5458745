//! # Stock Systems
//!
//! The systems most scenes want, registered in this order:
//!
//! | System                          | Phase     | Writes                          |
//! |---------------------------------|-----------|---------------------------------|
//! | [`AssetLoaderSystem`]           | pre-tick  | `AssetData`, `AssetFailed`, `@loading` |
//! | [`TransformPropagationSystem`]  | tick      | `Transformable::global`         |
//! | [`AabbUpdateSystem`]            | tick      | `Transformable::local_aabb`     |
//! | [`OctreeSystem`]                | post-tick | `Transformable::node`           |
//!
//! Each one reacts to change tracking only, so a quiet scene costs next to
//! nothing per tick.

mod aabb;
mod asset_loader;
mod octree;
mod transform;

pub use aabb::{AabbSource, AabbUpdateSystem, LocalAabb};
pub use asset_loader::{AssetData, AssetFailed, AssetLoaderSystem, AssetSource, LOADING_TAG};
pub use octree::OctreeSystem;
pub use transform::TransformPropagationSystem;
