//! # Sparse-Set ECS
//!
//! Components live in one sparse set per type; entities are generational
//! indices; groups are cached views kept current by a condition-counting
//! matrix. Change tracking is per component type and cleared once per tick.
//!
//! ## Module Overview
//!
//! - [`entity`]: Generational ids, recycling and the parent/child hierarchy
//! - [`sparse`]: Sparse id sets and dense component storage
//! - [`component`]: Per-type containers with mutated/removed tracking
//! - [`registry`]: Explicit component registration, persistence hooks
//! - [`matrix`]: Component/tag presence and incremental group membership
//! - [`filter`]: Group parameters: `&T`, `&mut T`, `Changed`, `Not`, `Removed`
//! - [`group`]: Memoized groups and the queries they produce
//! - [`world`]: The top-level container
//! - [`system`]: Systems, access sets and the phase/stage scheduler
//! - [`state`]: Save and load

pub mod component;
pub mod entity;
pub mod filter;
pub mod group;
pub mod matrix;
pub mod registry;
pub mod sparse;
pub mod state;
pub mod system;
pub mod world;

pub use component::{Component, ComponentContainer, ComponentContainerBase, ComponentMut, ComponentRef};
pub use entity::{EntityId, EntityPool, EntityPoolState};
pub use filter::{Changed, FilterKind, GroupParam, Not, ReadOnlyGroupParam, Removed};
pub use group::{EntityGroup, Query};
pub use matrix::{ComponentMatrix, GroupMembership};
pub use registry::{ComponentInfo, ComponentRegistry, ComponentTypeIndex, MAX_COMPONENT_TYPES, PostLoadFn};
pub use state::{LoadReport, StateError};
pub use system::{Access, FnSystem, Phase, System, SystemSchedule, SystemState};
pub use world::{EntityWorld, IMPLICIT_TAG_PREFIX, is_implicit_tag};
