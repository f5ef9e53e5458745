//! Keeps an [`Octree`] in sync with the world bounds of every
//! [`Transformable`] that has a local AABB.
//!
//! Runs in post-tick, after transforms and bounds have settled. Each
//! `Transformable` remembers the node holding it in
//! [`Transformable::node`]; the octree is the owner and the handle is only
//! a cached lookup.

use crate::components::Transformable;
use crate::ecs::{Access, Changed, EntityId, EntityWorld, System, SystemSchedule};
use crate::math::Aabb;
use crate::spatial::{Octree, OctreeConfig, OctreeNodeId};

/// Spatial index over transformed entity bounds.
pub struct OctreeSystem {
    octree: Octree,
}

impl OctreeSystem {
    pub fn new(config: OctreeConfig) -> Self {
        Self {
            octree: Octree::new(config),
        }
    }

    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// Entities whose world bounds intersect `region`.
    pub fn find(&self, region: &Aabb) -> Vec<EntityId> {
        self.octree.find(region)
    }

    fn sync(&mut self, world: &mut EntityWorld) {
        for id in world.recently_removed::<Transformable>() {
            self.octree.remove(id);
        }

        let octree = &mut self.octree;
        world
            .query::<Changed<&mut Transformable>>()
            .for_each(|id, transformable| {
                transformable.node = match transformable.global_aabb() {
                    Some(aabb) => Some(octree.update(id, aabb)),
                    None => {
                        octree.remove(id);
                        None
                    }
                };
            });

        self.apply_relocations(world);
    }

    /// Entities pushed down by a subdivision still point at the old node.
    fn apply_relocations(&mut self, world: &EntityWorld) {
        for (id, node) in self.octree.take_relocations() {
            set_node(world, id, Some(node));
        }
    }
}

impl Default for OctreeSystem {
    fn default() -> Self {
        Self::new(OctreeConfig::default())
    }
}

fn set_node(world: &EntityWorld, id: EntityId, node: Option<OctreeNodeId>) {
    if let Some(mut transformable) = world.component_mut::<Transformable>(id) {
        transformable.node = node;
    }
}

impl System for OctreeSystem {
    fn setup(&mut self, world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
        world.register_component_serde::<Transformable>();

        let bounds: Vec<(EntityId, Aabb)> = world
            .query::<&Transformable>()
            .iter()
            .filter_map(|(id, t)| t.global_aabb().map(|aabb| (id, aabb)))
            .collect();
        for (id, aabb) in bounds {
            let node = self.octree.insert(id, aabb);
            set_node(world, id, Some(node));
        }
        self.apply_relocations(world);
        log::debug!("octree seeded with {} entities", self.octree.len());

        schedule.on_post_tick(
            "sync_octree",
            Access::of::<Changed<&mut Transformable>>(),
            Self::sync,
        );
    }

    fn destroy(&mut self, world: &mut EntityWorld) {
        for id in world.component_ids::<Transformable>() {
            set_node(world, id, None);
        }
        self.octree.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Component, ComponentRegistry};
    use crate::math::{Transform, Vec3};
    use crate::systems::{AabbSource, AabbUpdateSystem, LocalAabb, TransformPropagationSystem};

    #[derive(Debug, Clone, Copy)]
    struct Cube(f32);

    impl Component for Cube {}

    impl LocalAabb for Cube {
        fn local_aabb(&self) -> Aabb {
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(self.0))
        }
    }

    fn world() -> EntityWorld {
        let mut registry = ComponentRegistry::new();
        registry
            .register::<Cube>()
            .with_capability(AabbSource::of::<Cube>());
        let mut world = EntityWorld::with_registry(registry);
        world.add_system(TransformPropagationSystem::new());
        world.add_system(AabbUpdateSystem::new());
        world.add_system(OctreeSystem::new(OctreeConfig {
            root_half_extent: 64.0,
            max_depth: 4,
            max_entities_per_node: 2,
        }));
        world
    }

    fn spawn(world: &mut EntityWorld, x: f32) -> EntityId {
        let id = world.create_entity();
        world.add_component(id, Transformable::new(Transform::from_xyz(x, 5.0, 5.0)));
        world.add_component(id, Cube(0.5));
        id
    }

    fn region(x: f32) -> Aabb {
        Aabb::from_center_half_extents(Vec3::new(x, 5.0, 5.0), Vec3::splat(1.0))
    }

    fn octree(world: &EntityWorld) -> &Octree {
        world.find_system::<OctreeSystem>().unwrap().octree()
    }

    #[test]
    fn indexes_transformed_bounds() {
        let mut world = world();
        let near = spawn(&mut world, 10.0);
        let far = spawn(&mut world, -30.0);
        world.tick();

        let system = world.find_system::<OctreeSystem>().unwrap();
        assert_eq!(system.find(&region(10.0)), vec![near]);
        assert_eq!(system.find(&region(-30.0)), vec![far]);
        assert!(system.find(&region(0.0)).is_empty());
    }

    #[test]
    fn handles_follow_subdivision() {
        let mut world = world();
        let ids: Vec<_> = (0..6).map(|i| spawn(&mut world, i as f32 * 8.0 - 20.0)).collect();
        world.tick();

        let tree = octree(&world);
        assert!(tree.node_count() > 1);
        for id in ids {
            let node = world.component::<Transformable>(id).unwrap().node;
            assert_eq!(node, tree.node_of(id));
        }
    }

    #[test]
    fn moved_entities_are_reindexed() {
        let mut world = world();
        let id = spawn(&mut world, 10.0);
        world.tick();

        world.component_mut::<Transformable>(id).unwrap().local.translation.x = 40.0;
        world.make_mutated::<Transformable>(&[id]);
        world.tick();

        let system = world.find_system::<OctreeSystem>().unwrap();
        assert!(system.find(&region(10.0)).is_empty());
        assert_eq!(system.find(&region(40.0)), vec![id]);
    }

    #[test]
    fn removed_entities_leave_the_index() {
        let mut world = world();
        let a = spawn(&mut world, 1.0);
        let b = spawn(&mut world, 2.0);
        world.tick();
        assert_eq!(octree(&world).len(), 2);

        world.remove_entity(a);
        world.remove_component::<Transformable>(b);
        world.tick();
        assert!(octree(&world).is_empty());
    }
}
