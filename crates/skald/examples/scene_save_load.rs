//! Scene save/load: round-trip a world through a JSON file.
//!
//! Persisted components survive, runtime-only ones are dropped, and the
//! transform system rebuilds world matrices from the post-load hook.
//!
//! Run with: `cargo run -p skald --example scene_save_load`

use serde::{Deserialize, Serialize};
use skald::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Label(String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Score(u32);

/// Runtime only, never written to disk.
struct CachedPath(Vec<Vec3>);

impl Component for Label {}
impl Component for Score {}
impl Component for CachedPath {}

fn build(world: &mut EntityWorld) {
    let root = world.create_entity();
    world.add_component(root, Label("level".into()));
    world.add_component(root, Transformable::new(Transform::from_xyz(0.0, 0.0, 0.0)));
    world.add_tag(root, "scene-root");

    for i in 0..4 {
        let id = world.create_child(root);
        world.add_component(id, Label(format!("pickup-{i}")));
        world.add_component(id, Score(10 * (i + 1)));
        world.add_component(
            id,
            Transformable::new(Transform::from_xyz(i as f32 * 2.0, 1.0, 0.0)),
        );
        world.add_component(id, CachedPath(vec![Vec3::ZERO, Vec3::X]));
        world.add_tag(id, "pickup");
    }
}

fn describe(world: &mut EntityWorld) {
    let rows: Vec<String> = world
        .query::<(&Label, &Transformable)>()
        .iter()
        .map(|(id, (label, t))| {
            format!("{id} {:<10} at {:?}", label.0, t.global.w_axis.truncate())
        })
        .collect();
    for row in rows {
        log::info!("  {row}");
    }
}

fn main() -> Result<(), StateError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::temp_dir().join("skald_scene.json");

    let mut world = EntityWorld::new();
    world.add_system(TransformPropagationSystem::new());
    world.register_component_serde::<Label>();
    world.register_component_serde::<Score>();
    world.register_component::<CachedPath>();

    build(&mut world);
    world.tick();
    log::info!("built scene:");
    describe(&mut world);

    world.save_state_to_file(&path)?;
    log::info!("saved to {}", path.display());

    world.clear();
    log::info!("cleared, {} entities left", world.entity_count());

    let report = world.load_state_from_file(&path)?;
    log::info!(
        "loaded {} entities / {} components (skipped: {:?})",
        report.entities,
        report.components,
        report.skipped_types
    );
    world.tick();
    describe(&mut world);

    log::info!(
        "pickups: {}, cached paths: {}",
        world.with_tag("pickup").len(),
        world.component_ids::<CachedPath>().len()
    );
    std::fs::remove_file(&path).ok();
    Ok(())
}
