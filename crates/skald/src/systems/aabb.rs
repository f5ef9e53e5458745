//! # Local Bounds
//!
//! Component types that describe geometry advertise it through the
//! [`AabbSource`] capability on their registry entry:
//!
//! ```ignore
//! registry.register_serde::<MeshBounds>()
//!     .with_capability(AabbSource::of::<MeshBounds>());
//! ```
//!
//! [`AabbUpdateSystem`] learns those types as they're registered and, each
//! tick, rebuilds [`Transformable::local_aabb`] for entities whose source
//! component changed or went away. An entity with several sources gets the
//! union of their boxes.

use std::collections::{BTreeSet, HashMap};

use crate::components::Transformable;
use crate::ecs::component::downcast;
use crate::ecs::{
    Access, Component, ComponentContainerBase, ComponentInfo, ComponentTypeIndex, EntityId,
    EntityWorld, System, SystemSchedule,
};
use crate::math::Aabb;

/// A component that has bounds in its entity's local space.
pub trait LocalAabb: Component {
    fn local_aabb(&self) -> Aabb;
}

/// Registry capability: reads the local bounds of one component type out
/// of its type-erased container.
#[derive(Clone, Copy)]
pub struct AabbSource {
    read: fn(&dyn ComponentContainerBase, EntityId) -> Option<Aabb>,
}

impl AabbSource {
    pub fn of<T: LocalAabb>() -> Self {
        Self {
            read: read_aabb::<T>,
        }
    }

    pub fn read(&self, container: &dyn ComponentContainerBase, id: EntityId) -> Option<Aabb> {
        (self.read)(container, id)
    }
}

fn read_aabb<T: LocalAabb>(container: &dyn ComponentContainerBase, id: EntityId) -> Option<Aabb> {
    downcast::<T>(container).try_get(id).map(|value| value.local_aabb())
}

/// Maintains [`Transformable::local_aabb`] from every [`AabbSource`] type.
#[derive(Default)]
pub struct AabbUpdateSystem {
    sources: Vec<(ComponentTypeIndex, AabbSource)>,
}

impl AabbUpdateSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of component types providing bounds.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    fn update(&mut self, world: &mut EntityWorld) {
        let mut dirty = BTreeSet::new();
        for &(index, _) in &self.sources {
            dirty.extend(world.recently_mutated_by_index(index));
            if let Some(container) = world.container_by_index(index) {
                dirty.extend(container.recently_removed());
            }
        }
        if dirty.is_empty() {
            return;
        }

        let bounds: HashMap<EntityId, Option<Aabb>> = dirty
            .into_iter()
            .filter(|&id| world.exists(id))
            .map(|id| (id, self.merged_bounds(world, id)))
            .collect();
        let ids: Vec<EntityId> = bounds.keys().copied().collect();

        world
            .query_subset::<&mut Transformable>(&ids)
            .for_each(|id, transformable| {
                transformable.local_aabb = bounds.get(&id).copied().flatten();
            });
    }

    fn merged_bounds(&self, world: &EntityWorld, id: EntityId) -> Option<Aabb> {
        self.sources
            .iter()
            .filter_map(|(index, source)| {
                let container = world.container_by_index(*index)?;
                source.read(container, id)
            })
            .reduce(|a, b| a.merged(&b))
    }
}

impl System for AabbUpdateSystem {
    fn setup(&mut self, world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
        world.register_component_serde::<Transformable>();
        for &(index, _) in &self.sources {
            if let Some(container) = world.container_by_index(index) {
                container.mark_all_mutated();
            }
        }
        world.mark_all_mutated::<Transformable>();

        // Source types may be registered after setup, so the callback
        // claims the whole world.
        schedule.on_tick(
            "update_local_aabbs",
            Access::of::<&mut Transformable>().with(Access::exclusive()),
            Self::update,
        );
    }

    fn register_component_type(&mut self, info: &ComponentInfo) {
        if let Some(source) = info.capability::<AabbSource>() {
            log::debug!("{} provides local bounds", info.short_name());
            self.sources.push((info.index(), *source));
        }
    }
}
