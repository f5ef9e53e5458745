//! Change tracking: react only to what moved this tick.
//!
//! A regen system heals a few entities per tick; a watcher system reads
//! `Changed<&Health>` and only ever sees those. Entities that die lose
//! their `Health` and show up once under `Removed<Health>`.
//!
//! Run with: `cargo run -p skald --example changed_tracking`

use skald::prelude::*;

#[derive(Debug, Clone, Copy)]
struct Health(i32);

struct Poisoned;

impl Component for Health {}
impl Component for Poisoned {}

// ── Systems ──────────────────────────────────────────────────────────────

/// Hurts poisoned entities every tick and heals everyone else every third.
struct Regen {
    ticks: u32,
}

impl Regen {
    fn apply(&mut self, world: &mut EntityWorld) {
        self.ticks += 1;

        world
            .query::<(&mut Health, &Poisoned)>()
            .for_each(|_, (health, _)| health.0 -= 15);

        if self.ticks % 3 == 0 {
            world
                .query::<(&mut Health, Not<Poisoned>)>()
                .for_each(|_, (health, _)| health.0 = (health.0 + 5).min(100));
        }

        let dead: Vec<EntityId> = world
            .query::<&Health>()
            .iter()
            .filter(|(_, health)| health.0 <= 0)
            .map(|(id, _)| id)
            .collect();
        for id in dead {
            world.remove_component::<Health>(id);
            world.add_tag(id, "dead");
        }
    }
}

impl System for Regen {
    fn setup(&mut self, world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
        world.register_component::<Health>();
        world.register_component::<Poisoned>();
        schedule.on_tick(
            "regen",
            Access::of::<(&mut Health, &Poisoned)>().write_tag("dead"),
            Self::apply,
        );
    }
}

/// Logs every change the previous callbacks made this tick.
fn report(world: &mut EntityWorld) {
    let changed: Vec<(EntityId, i32)> = world
        .query::<Changed<&Health>>()
        .iter()
        .map(|(id, health)| (id, health.0))
        .collect();
    for (id, hp) in &changed {
        log::info!("{id} health -> {hp}");
    }
    for (id, ()) in world.query::<Removed<Health>>().iter() {
        log::warn!("{id} died");
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut world = EntityWorld::new();
    world.add_system(Regen { ticks: 0 });
    world.add_system(FnSystem::new(
        "report",
        Phase::PostTick,
        Access::of::<Changed<&Health>>().read::<Health>(),
        report,
    ));

    for i in 0..6 {
        let id = world.create_entity();
        world.add_component(id, Health(60 + i * 5));
        if i % 2 == 0 {
            world.add_component(id, Poisoned);
        }
    }

    for tick in 1..=6 {
        log::info!("── tick {tick} ──");
        world.tick();
    }

    log::info!(
        "{} entities alive, {} tagged dead",
        world.entity_count(),
        world.with_tag("dead").len()
    );
}
