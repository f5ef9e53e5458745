//! # Skald: Sparse-Set ECS Core
//!
//! The data layer of a real-time engine: entity lifecycle, per-type sparse
//! component storage with change tracking, incrementally maintained groups,
//! and a phase-ordered system scheduler. Renderers, editors and gameplay code
//! sit on top and talk to it through queries.
//!
//! Start with `use skald::prelude::*` and build an
//! [`EntityWorld`](ecs::EntityWorld).

pub mod asset;
pub mod components;
pub mod config;
pub mod ecs;
pub mod math;
pub mod prelude;
pub mod spatial;
pub mod systems;

#[cfg(feature = "diagnostics")]
pub mod diag;
