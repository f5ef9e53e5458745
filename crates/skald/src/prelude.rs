//! Convenience re-exports: `use skald::prelude::*` for the common items.

pub use crate::asset::{AssetError, AssetLoader, AssetPayload};
pub use crate::components::Transformable;
pub use crate::config::{AssetConfig, Config, ConfigError, DiagnosticsConfig, EngineConfig};
pub use crate::ecs::{
    Access, Changed, Component, ComponentRegistry, EntityGroup, EntityId, EntityWorld, FnSystem,
    LoadReport, Not, Phase, Query, Removed, StateError, System, SystemSchedule,
};
pub use crate::math::{Aabb, Mat4, Quat, Transform, Vec3};
pub use crate::spatial::{Octree, OctreeConfig, OctreeNodeId};
pub use crate::systems::{
    AabbSource, AabbUpdateSystem, AssetData, AssetFailed, AssetLoaderSystem, AssetSource,
    LOADING_TAG, LocalAabb, OctreeSystem, TransformPropagationSystem,
};
#[cfg(feature = "diagnostics")]
pub use crate::diag::{DiagSender, DiagnosticsSystem, WorldSnapshot};
