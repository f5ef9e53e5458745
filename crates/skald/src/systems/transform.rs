//! # Transform Propagation
//!
//! Keeps [`Transformable::global`] equal to `parent_global * local` along
//! the pool's parent chain. Only entities whose transform changed this tick,
//! plus their descendants, are recomputed.
//!
//! ```text
//! changed:  B            dirty (by depth):  B, C, D
//!   A                    C anchors on B (dirty, computed in-pass)
//!   └── B                D anchors on B (C has no Transformable)
//!       ├── C
//!       └── (x) ── D
//! ```
//!
//! Ancestors without a `Transformable` are transparent: a child anchors on
//! the nearest ancestor that has one, or on the identity.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::components::Transformable;
use crate::ecs::{Access, EntityId, EntityWorld, System, SystemSchedule};
use crate::math::Mat4;

/// Where a dirty entity takes its parent matrix from.
#[derive(Clone, Copy)]
enum Anchor {
    /// Ancestor left untouched this tick; its global is read up front.
    Fixed(Mat4),
    /// Ancestor recomputed earlier in the same pass.
    Dirty(EntityId),
}

/// Computes world matrices for every changed [`Transformable`].
#[derive(Default)]
pub struct TransformPropagationSystem {
    updated_last_tick: usize,
}

impl TransformPropagationSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of globals recomputed in the most recent tick.
    pub fn updated_last_tick(&self) -> usize {
        self.updated_last_tick
    }

    fn propagate(&mut self, world: &mut EntityWorld) {
        let changed = world.recently_mutated::<Transformable>();
        if changed.is_empty() {
            self.updated_last_tick = 0;
            return;
        }

        // Changed entities and everything below them.
        let mut dirty = HashSet::new();
        let mut queue: VecDeque<EntityId> = changed.into_iter().collect();
        while let Some(id) = queue.pop_front() {
            if !world.exists(id) || !dirty.insert(id) {
                continue;
            }
            queue.extend(world.children(id).iter().copied());
        }

        let mut order: Vec<(usize, EntityId)> = dirty
            .iter()
            .copied()
            .filter(|&id| world.has_component::<Transformable>(id))
            .map(|id| (world.parents(id).len(), id))
            .collect();
        order.sort();

        let mut anchors = HashMap::with_capacity(order.len());
        for &(_, id) in &order {
            let ancestor = world
                .parents(id)
                .into_iter()
                .find(|&p| world.has_component::<Transformable>(p));
            let anchor = match ancestor {
                Some(p) if dirty.contains(&p) => Anchor::Dirty(p),
                Some(p) => Anchor::Fixed(
                    world
                        .component::<Transformable>(p)
                        .map_or(Mat4::IDENTITY, |t| t.global),
                ),
                None => Anchor::Fixed(Mat4::IDENTITY),
            };
            anchors.insert(id, anchor);
        }

        let ids: Vec<EntityId> = order.into_iter().map(|(_, id)| id).collect();
        let mut globals: HashMap<EntityId, Mat4> = HashMap::with_capacity(ids.len());
        let mut query = world.query_subset::<&mut Transformable>(&ids);
        query.for_each(|id, transformable| {
            let parent = match anchors.get(&id) {
                Some(Anchor::Dirty(p)) => globals.get(p).copied().unwrap_or(Mat4::IDENTITY),
                Some(Anchor::Fixed(m)) => *m,
                None => Mat4::IDENTITY,
            };
            transformable.global = parent * transformable.local.matrix();
            globals.insert(id, transformable.global);
        });
        self.updated_last_tick = globals.len();
    }
}

impl System for TransformPropagationSystem {
    fn setup(&mut self, world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
        world.register_component_serde::<Transformable>();
        world.set_post_load::<Transformable>(Transformable::after_load);
        world.mark_all_mutated::<Transformable>();

        schedule.on_tick(
            "propagate_transforms",
            Access::of::<&mut Transformable>(),
            Self::propagate,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Transform, Vec3};

    fn translation(world: &EntityWorld, id: EntityId) -> Vec3 {
        world
            .component::<Transformable>(id)
            .unwrap()
            .global
            .col(3)
            .truncate()
    }

    fn spawn(world: &mut EntityWorld, parent: Option<EntityId>, x: f32) -> EntityId {
        let id = match parent {
            Some(p) => world.create_child(p),
            None => world.create_entity(),
        };
        world.add_component(id, Transformable::new(Transform::from_xyz(x, 0.0, 0.0)));
        id
    }

    #[test]
    fn child_inherits_parent_transform() {
        let mut world = EntityWorld::new();
        world.add_system(TransformPropagationSystem::new());
        let root = spawn(&mut world, None, 100.0);
        let child = spawn(&mut world, Some(root), 10.0);
        let grandchild = spawn(&mut world, Some(child), 1.0);

        world.tick();

        assert!((translation(&world, root).x - 100.0).abs() < 1e-4);
        assert!((translation(&world, child).x - 110.0).abs() < 1e-4);
        assert!((translation(&world, grandchild).x - 111.0).abs() < 1e-4);
    }

    #[test]
    fn parent_moves_child_follows() {
        let mut world = EntityWorld::new();
        world.add_system(TransformPropagationSystem::new());
        let root = spawn(&mut world, None, 0.0);
        let child = spawn(&mut world, Some(root), 5.0);
        world.tick();

        world.component_mut::<Transformable>(root).unwrap().local.translation.x = 50.0;
        world.make_mutated::<Transformable>(&[root]);
        world.tick();

        assert!((translation(&world, child).x - 55.0).abs() < 1e-4);
        assert_eq!(
            world
                .find_system::<TransformPropagationSystem>()
                .unwrap()
                .updated_last_tick(),
            2
        );
    }

    #[test]
    fn untouched_parent_is_read_not_recomputed() {
        let mut world = EntityWorld::new();
        world.add_system(TransformPropagationSystem::new());
        let root = spawn(&mut world, None, 20.0);
        let child = spawn(&mut world, Some(root), 2.0);
        world.tick();

        world.component_mut::<Transformable>(child).unwrap().local.translation.x = 3.0;
        world.make_mutated::<Transformable>(&[child]);
        world.tick();

        assert!((translation(&world, child).x - 23.0).abs() < 1e-4);
        assert_eq!(
            world
                .find_system::<TransformPropagationSystem>()
                .unwrap()
                .updated_last_tick(),
            1
        );
    }

    #[test]
    fn ancestors_without_transform_are_transparent() {
        let mut world = EntityWorld::new();
        world.add_system(TransformPropagationSystem::new());
        let root = spawn(&mut world, None, 7.0);
        let bare = world.create_child(root);
        let leaf = spawn(&mut world, Some(bare), 1.0);

        world.tick();

        assert!((translation(&world, leaf).x - 8.0).abs() < 1e-4);
    }
}
