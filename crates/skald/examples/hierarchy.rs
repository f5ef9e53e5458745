//! Hierarchy: parent/child transforms, bounds and the octree together.
//!
//! A sun with orbiting planets and moons. Moving the sun moves everything
//! below it; the octree is asked which bodies sit inside a query box.
//!
//! Run with: `cargo run -p skald --example hierarchy`

use skald::ecs::ComponentRegistry;
use skald::prelude::*;

/// Bounds of a round body.
#[derive(Debug, Clone, Copy)]
struct Body {
    radius: f32,
}

impl LocalAabb for Body {
    fn local_aabb(&self) -> Aabb {
        Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(self.radius))
    }
}

struct Name(&'static str);

impl Component for Body {}
impl Component for Name {}

fn spawn(
    world: &mut EntityWorld,
    parent: Option<EntityId>,
    name: &'static str,
    offset: Vec3,
    radius: f32,
) -> EntityId {
    let id = match parent {
        Some(parent) => world.create_child(parent),
        None => world.create_entity(),
    };
    world.add_component(id, Name(name));
    world.add_component(id, Body { radius });
    world.add_component(
        id,
        Transformable::new(Transform::from_xyz(offset.x, offset.y, offset.z)),
    );
    id
}

fn print_bodies(world: &mut EntityWorld) {
    let rows: Vec<String> = world
        .query::<(&Name, &Transformable)>()
        .iter()
        .map(|(id, (name, t))| {
            let depth = "  ".repeat(world.parents(id).len());
            format!(
                "{depth}{id} {:<6} at {:?} bounds {:?}",
                name.0,
                t.global.w_axis.truncate(),
                t.global_aabb().map(|b| (b.min, b.max))
            )
        })
        .collect();
    for row in rows {
        log::info!("{row}");
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut registry = ComponentRegistry::new();
    registry
        .register::<Body>()
        .with_capability(AabbSource::of::<Body>());
    let mut world = EntityWorld::with_registry(registry);

    let config = EngineConfig::default();
    world.add_system(TransformPropagationSystem::new());
    world.add_system(AabbUpdateSystem::new());
    world.add_system(OctreeSystem::new(config.octree));

    let sun = spawn(&mut world, None, "sun", Vec3::new(0.0, 5.0, 5.0), 3.0);
    let earth = spawn(&mut world, Some(sun), "earth", Vec3::new(20.0, 0.0, 0.0), 1.0);
    spawn(&mut world, Some(earth), "moon", Vec3::new(3.0, 0.0, 0.0), 0.3);
    let mars = spawn(&mut world, Some(sun), "mars", Vec3::new(-30.0, 0.0, 0.0), 0.6);
    spawn(&mut world, Some(mars), "phobos", Vec3::new(1.5, 0.0, 0.0), 0.1);

    world.tick();
    log::info!("initial layout:");
    print_bodies(&mut world);

    world
        .query_subset::<&mut Transformable>(&[sun])
        .for_each(|_, t| t.local.translation += Vec3::new(10.0, 0.0, 0.0));
    world.tick();
    log::info!("after moving the sun:");
    print_bodies(&mut world);

    log::info!(
        "moon ancestors: {:?}, mars children: {:?}",
        world.parents(world.children(earth)[0]),
        world.children(mars)
    );

    let region = Aabb::new(Vec3::new(25.0, 0.0, 0.0), Vec3::new(40.0, 10.0, 10.0));
    if let Some(octree) = world.find_system::<OctreeSystem>() {
        let hits = octree.find(&region);
        log::info!("{} bodies inside {:?}..{:?}: {hits:?}", hits.len(), region.min, region.max);
    }

    world.remove_entity(earth);
    world.tick();
    log::info!(
        "after removing earth: {} entities, {} in octree",
        world.entity_count(),
        world
            .find_system::<OctreeSystem>()
            .map(|s| s.octree().len())
            .unwrap_or(0)
    );
}
