//! # Systems & the Scheduler
//!
//! A system is a struct with state that registers one or more callbacks at
//! setup time. Each callback names the [`Phase`] it runs in and declares an
//! [`Access`] set: the component types and tags it reads or writes.
//!
//! ```ignore
//! impl System for Gravity {
//!     fn setup(&mut self, world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
//!         world.mark_all_mutated::<Velocity>();
//!         schedule.on_tick("apply", Access::of::<&mut Velocity>(), |this, world| {
//!             world.query::<&mut Velocity>().for_each(|_, v| v.y -= this.g);
//!         });
//!     }
//! }
//! ```
//!
//! ## Ordering
//!
//! Phases run in order `PreTick → Tick → PostTick`. Inside a phase,
//! callbacks are packed into stages:
//!
//! ```text
//! registration:  a(w Pos)  b(r Vel)  c(r Pos)  d(w Vel)  e(r Name)
//! stage 0:       a  b  e
//! stage 1:       c  d
//! ```
//!
//! A callback lands one stage after the latest stage holding an earlier
//! callback it conflicts with, so conflicting callbacks keep registration
//! order and disjoint ones share a stage. Stages run one after another;
//! callbacks inside a stage are independent and run in registration order.
//!
//! ## Lifecycle
//!
//! `Created → Setup → Ticking → Destroyed`, tracked per system and asserted.
//! Systems are destroyed in reverse order when the world drops.

use std::any::{Any, TypeId, type_name};
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::mem;

use super::filter::GroupParam;
use super::registry::{ComponentInfo, ComponentRegistry};
use super::world::EntityWorld;

/// Execution phase of a callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    PreTick,
    Tick,
    PostTick,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::PreTick, Phase::Tick, Phase::PostTick];

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::PreTick => "pre-tick",
            Phase::Tick => "tick",
            Phase::PostTick => "post-tick",
        };
        f.write_str(name)
    }
}

// ── Access ───────────────────────────────────────────────────────────────

/// Something a callback can touch.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessKey {
    Component(TypeId),
    Tag(String),
}

/// Declared read/write set of a callback.
///
/// Read-read never conflicts; a write conflicts with any access to the same
/// key. An exclusive access conflicts with everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Access {
    reads: BTreeSet<AccessKey>,
    writes: BTreeSet<AccessKey>,
    exclusive: bool,
}

impl Access {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conflicts with every other callback.
    pub fn exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::default()
        }
    }

    /// The access implied by a group signature.
    pub fn of<P: GroupParam>() -> Self {
        let mut access = Self::default();
        P::access(&mut access);
        access
    }

    pub fn read<T: 'static>(mut self) -> Self {
        self.add_read::<T>();
        self
    }

    pub fn write<T: 'static>(mut self) -> Self {
        self.add_write::<T>();
        self
    }

    pub fn read_tag(mut self, tag: &str) -> Self {
        self.reads.insert(AccessKey::Tag(tag.to_string()));
        self
    }

    pub fn write_tag(mut self, tag: &str) -> Self {
        self.writes.insert(AccessKey::Tag(tag.to_string()));
        self
    }

    /// Union of two access sets.
    pub fn with(mut self, other: Access) -> Self {
        self.reads.extend(other.reads);
        self.writes.extend(other.writes);
        self.exclusive |= other.exclusive;
        self
    }

    pub fn add_read<T: 'static>(&mut self) {
        self.reads.insert(AccessKey::Component(TypeId::of::<T>()));
    }

    pub fn add_write<T: 'static>(&mut self) {
        self.writes.insert(AccessKey::Component(TypeId::of::<T>()));
    }

    pub fn reads_component<T: 'static>(&self) -> bool {
        self.reads.contains(&AccessKey::Component(TypeId::of::<T>()))
    }

    pub fn writes_component<T: 'static>(&self) -> bool {
        self.writes.contains(&AccessKey::Component(TypeId::of::<T>()))
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn conflicts_with(&self, other: &Access) -> bool {
        if self.exclusive || other.exclusive {
            return true;
        }
        let touches = |access: &Access, key: &AccessKey| {
            access.reads.contains(key) || access.writes.contains(key)
        };
        self.writes.iter().any(|key| touches(other, key))
            || other.writes.iter().any(|key| self.reads.contains(key))
    }
}

// ── System trait ─────────────────────────────────────────────────────────

/// A unit of per-tick logic with its own state.
pub trait System: Any + Send {
    /// Name used in logs and diagnostics.
    fn name(&self) -> String {
        short_system_name(type_name::<Self>())
    }

    /// Called once when the system is added. Register callbacks here.
    fn setup(&mut self, world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>)
    where
        Self: Sized;

    /// Called for every component type registered before or after this
    /// system was added.
    fn register_component_type(&mut self, _info: &ComponentInfo) {}

    /// Called once when the world shuts down.
    fn destroy(&mut self, _world: &mut EntityWorld) {}
}

trait DynSystem: Send {
    fn register_component_type(&mut self, info: &ComponentInfo);
    fn destroy(&mut self, world: &mut EntityWorld);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<S: System> DynSystem for S {
    fn register_component_type(&mut self, info: &ComponentInfo) {
        System::register_component_type(self, info);
    }

    fn destroy(&mut self, world: &mut EntityWorld) {
        System::destroy(self, world);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Lifecycle state of one system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemState {
    Created,
    Setup,
    Ticking,
    Destroyed,
}

impl SystemState {
    fn advance(self, next: SystemState) -> SystemState {
        let legal = matches!(
            (self, next),
            (SystemState::Created, SystemState::Setup)
                | (SystemState::Setup, SystemState::Ticking)
                | (SystemState::Ticking, SystemState::Ticking)
                | (SystemState::Setup, SystemState::Destroyed)
                | (SystemState::Ticking, SystemState::Destroyed)
        );
        assert!(legal, "illegal system state transition {self:?} -> {next:?}");
        next
    }
}

// ── Schedule builder ─────────────────────────────────────────────────────

type Callback = Box<dyn FnMut(&mut dyn Any, &mut EntityWorld) + Send>;

struct CallbackSpec {
    phase: Phase,
    name: String,
    access: Access,
    run: Callback,
}

/// Handed to [`System::setup`] to register callbacks for system `S`.
pub struct SystemSchedule<S> {
    callbacks: Vec<CallbackSpec>,
    _system: PhantomData<fn(&mut S)>,
}

impl<S: System> SystemSchedule<S> {
    fn new() -> Self {
        Self {
            callbacks: Vec::new(),
            _system: PhantomData,
        }
    }

    /// Register a callback in `phase`.
    pub fn add(
        &mut self,
        phase: Phase,
        name: &str,
        access: Access,
        mut f: impl FnMut(&mut S, &mut EntityWorld) + Send + 'static,
    ) -> &mut Self {
        self.callbacks.push(CallbackSpec {
            phase,
            name: name.to_string(),
            access,
            run: Box::new(move |system, world| {
                let Some(system) = system.downcast_mut::<S>() else {
                    unreachable!("callback invoked with a foreign system");
                };
                f(system, world);
            }),
        });
        self
    }

    pub fn on_pre_tick(
        &mut self,
        name: &str,
        access: Access,
        f: impl FnMut(&mut S, &mut EntityWorld) + Send + 'static,
    ) -> &mut Self {
        self.add(Phase::PreTick, name, access, f)
    }

    pub fn on_tick(
        &mut self,
        name: &str,
        access: Access,
        f: impl FnMut(&mut S, &mut EntityWorld) + Send + 'static,
    ) -> &mut Self {
        self.add(Phase::Tick, name, access, f)
    }

    pub fn on_post_tick(
        &mut self,
        name: &str,
        access: Access,
        f: impl FnMut(&mut S, &mut EntityWorld) + Send + 'static,
    ) -> &mut Self {
        self.add(Phase::PostTick, name, access, f)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// A system backed by a single closure.
pub struct FnSystem<F> {
    name: String,
    phase: Phase,
    access: Access,
    f: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut EntityWorld) + Send + 'static,
{
    pub fn new(name: &str, phase: Phase, access: Access, f: F) -> Self {
        Self {
            name: name.to_string(),
            phase,
            access,
            f,
        }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut EntityWorld) + Send + 'static,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn setup(&mut self, _world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
        let name = self.name.clone();
        schedule.add(self.phase, &name, self.access.clone(), |this, world| {
            (this.f)(world)
        });
    }
}

// ── Manager ──────────────────────────────────────────────────────────────

struct SystemEntry {
    name: String,
    system: Box<dyn DynSystem>,
    state: SystemState,
    /// Number of registry entries this system has been told about.
    announced: usize,
}

struct ScheduledCallback {
    system: usize,
    phase: Phase,
    name: String,
    access: Access,
    run: Callback,
}

/// Timing of one callback in the most recent tick.
#[cfg(feature = "diagnostics")]
#[derive(Clone, Debug)]
pub struct CallbackTiming {
    pub system: String,
    pub callback: String,
    pub phase: Phase,
    pub stage: usize,
    pub duration_us: f64,
}

/// Owns the systems of a world and their callback plan.
#[derive(Default)]
pub(crate) struct SystemManager {
    entries: Vec<SystemEntry>,
    callbacks: Vec<ScheduledCallback>,
    /// Per phase: stages of callback indices.
    plan: [Vec<Vec<usize>>; 3],
    #[cfg(feature = "diagnostics")]
    pub(crate) timings: Vec<CallbackTiming>,
}

impl SystemManager {
    fn push(&mut self, entry: SystemEntry, specs: Vec<CallbackSpec>) -> usize {
        let system = self.entries.len();
        self.entries.push(entry);
        for spec in specs {
            self.callbacks.push(ScheduledCallback {
                system,
                phase: spec.phase,
                name: spec.name,
                access: spec.access,
                run: spec.run,
            });
        }
        self.rebuild_plan();
        system
    }

    /// Tell every system about component types it hasn't seen yet.
    pub(crate) fn announce_types(&mut self, registry: &ComponentRegistry) {
        for entry in &mut self.entries {
            if entry.state == SystemState::Destroyed {
                continue;
            }
            for info in registry.iter().skip(entry.announced) {
                entry.system.register_component_type(info);
            }
            entry.announced = registry.len();
        }
    }

    /// Move systems registered into `other` (e.g. during a tick) to the end.
    fn absorb(&mut self, other: SystemManager) {
        let offset = self.entries.len();
        self.entries.extend(other.entries);
        self.callbacks
            .extend(other.callbacks.into_iter().map(|mut cb| {
                cb.system += offset;
                cb
            }));
        self.rebuild_plan();
    }

    fn rebuild_plan(&mut self) {
        for phase in Phase::ALL {
            let mut stages: Vec<Vec<usize>> = Vec::new();
            let mut placed: Vec<(usize, usize)> = Vec::new();
            for (index, cb) in self.callbacks.iter().enumerate() {
                if cb.phase != phase {
                    continue;
                }
                let stage = placed
                    .iter()
                    .filter(|(other, _)| self.callbacks[*other].access.conflicts_with(&cb.access))
                    .map(|(_, stage)| stage + 1)
                    .max()
                    .unwrap_or(0);
                if stage == stages.len() {
                    stages.push(Vec::new());
                }
                stages[stage].push(index);
                placed.push((index, stage));
            }
            if !stages.is_empty() {
                log::debug!(
                    "{phase} plan: {}",
                    stages
                        .iter()
                        .enumerate()
                        .map(|(i, stage)| {
                            let names: Vec<&str> =
                                stage.iter().map(|&c| self.callbacks[c].name.as_str()).collect();
                            format!("stage {i} [{}]", names.join(", "))
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            self.plan[phase.slot()] = stages;
        }
    }

    fn run(&mut self, world: &mut EntityWorld) {
        #[cfg(feature = "diagnostics")]
        self.timings.clear();

        for phase in Phase::ALL {
            for (stage_index, stage) in self.plan[phase.slot()].iter().enumerate() {
                for &index in stage {
                    let cb = &mut self.callbacks[index];
                    let entry = &mut self.entries[cb.system];
                    if entry.state == SystemState::Destroyed {
                        continue;
                    }

                    #[cfg(feature = "diagnostics")]
                    let start = std::time::Instant::now();

                    (cb.run)(entry.system.as_any_mut(), world);

                    #[cfg(feature = "diagnostics")]
                    self.timings.push(CallbackTiming {
                        system: entry.name.clone(),
                        callback: cb.name.clone(),
                        phase,
                        stage: stage_index,
                        duration_us: start.elapsed().as_secs_f64() * 1_000_000.0,
                    });
                    #[cfg(not(feature = "diagnostics"))]
                    let _ = stage_index;
                }
            }
        }

        for entry in &mut self.entries {
            if entry.state != SystemState::Destroyed {
                entry.state = entry.state.advance(SystemState::Ticking);
            }
        }
    }

    fn find(&self, type_id: TypeId) -> Option<&SystemEntry> {
        self.entries
            .iter()
            .find(|e| e.system.as_any().type_id() == type_id)
    }

    fn find_mut(&mut self, type_id: TypeId) -> Option<&mut SystemEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.system.as_any().type_id() == type_id)
    }
}

// ── World integration ────────────────────────────────────────────────────

impl EntityWorld {
    /// Add a system: announce known component types, run its setup, then
    /// schedule its callbacks.
    pub fn add_system<S: System>(&mut self, mut system: S) -> &mut S {
        let name = System::name(&system);
        log::debug!("adding system {name}");

        for info in self.registry.iter() {
            system.register_component_type(info);
        }
        let mut announced = self.registry.len();

        let mut schedule = SystemSchedule::<S>::new();
        let state = SystemState::Created.advance(SystemState::Setup);
        system.setup(self, &mut schedule);
        log::debug!("system {name} set up with {} callback(s)", schedule.len());

        // Types registered lazily during setup.
        for info in self.registry.iter().skip(announced) {
            system.register_component_type(info);
        }
        announced = self.registry.len();

        let index = self.systems.push(
            SystemEntry {
                name,
                system: Box::new(system),
                state,
                announced,
            },
            schedule.callbacks,
        );
        self.systems.entries[index]
            .system
            .as_any_mut()
            .downcast_mut::<S>()
            .unwrap_or_else(|| unreachable!("system entry holds a different type"))
    }

    /// The first system of type `S`. Systems are detached from the world
    /// while a tick runs, so this returns `None` from inside callbacks.
    pub fn find_system<S: System>(&self) -> Option<&S> {
        self.systems
            .find(TypeId::of::<S>())
            .and_then(|e| e.system.as_any().downcast_ref::<S>())
    }

    pub fn find_system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems
            .find_mut(TypeId::of::<S>())
            .and_then(|e| e.system.as_any_mut().downcast_mut::<S>())
    }

    pub fn system_state<S: System>(&self) -> Option<SystemState> {
        self.systems.find(TypeId::of::<S>()).map(|e| e.state)
    }

    /// Names of all systems, in registration order.
    pub fn system_names(&self) -> Vec<String> {
        self.systems.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Callback names per stage for `phase`.
    pub fn stage_plan(&self, phase: Phase) -> Vec<Vec<String>> {
        self.systems.plan[phase.slot()]
            .iter()
            .map(|stage| {
                stage
                    .iter()
                    .map(|&c| self.systems.callbacks[c].name.clone())
                    .collect()
            })
            .collect()
    }

    /// Timings of every callback from the most recent completed tick. Also
    /// readable from inside callbacks of the tick that follows.
    #[cfg(feature = "diagnostics")]
    pub fn callback_timings(&self) -> &[CallbackTiming] {
        &self.systems.timings
    }

    /// Run every phase, then [`end_tick`](Self::end_tick).
    pub fn tick(&mut self) {
        let mut systems = mem::take(&mut self.systems);
        #[cfg(feature = "diagnostics")]
        {
            self.systems.timings = mem::take(&mut systems.timings);
        }
        systems.announce_types(&self.registry);
        systems.run(self);

        let added = mem::replace(&mut self.systems, systems);
        self.systems.absorb(added);
        self.systems.announce_types(&self.registry);

        self.end_tick();
    }

    /// Destroy every system in reverse registration order.
    pub(crate) fn destroy_systems(&mut self) {
        loop {
            let mut systems = mem::take(&mut self.systems);
            if systems.entries.is_empty() {
                break;
            }
            for entry in systems.entries.iter_mut().rev() {
                if entry.state == SystemState::Destroyed {
                    continue;
                }
                log::debug!("destroying system {}", entry.name);
                entry.system.destroy(self);
                entry.state = entry.state.advance(SystemState::Destroyed);
            }
        }
    }
}

/// Strip the module path from a type name (`game::physics::Gravity` →
/// `Gravity`, closures → `<closure>`).
fn short_system_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    let name = base.rsplit("::").next().unwrap_or(base);
    if name.contains("closure") {
        "<closure>".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::ecs::component::Component;
    use crate::ecs::filter::Changed;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(i32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(i32);
    struct Name;

    impl Component for Position {}
    impl Component for Velocity {}
    impl Component for Name {}

    type Log = Arc<Mutex<Vec<String>>>;

    struct Mover {
        log: Log,
        types_seen: Vec<String>,
    }

    impl System for Mover {
        fn setup(&mut self, world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
            world.register_component::<Position>();
            schedule
                .on_pre_tick("prepare", Access::new().read::<Velocity>(), |this, _| {
                    this.log.lock().push("prepare".into());
                })
                .on_tick("move", Access::of::<(&mut Position, &Velocity)>(), |this, world| {
                    world
                        .query::<(&mut Position, &Velocity)>()
                        .for_each(|_, (p, v)| p.0 += v.0);
                    this.log.lock().push("move".into());
                });
        }

        fn register_component_type(&mut self, info: &ComponentInfo) {
            self.types_seen.push(info.short_name().to_string());
        }

        fn destroy(&mut self, _world: &mut EntityWorld) {
            self.log.lock().push("destroy mover".into());
        }
    }

    struct Watcher {
        log: Log,
        seen: usize,
    }

    impl System for Watcher {
        fn setup(&mut self, _world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
            schedule.on_post_tick("watch", Access::of::<Changed<&Position>>(), |this, world| {
                this.seen += world.query::<Changed<&Position>>().len();
                this.log.lock().push("watch".into());
            });
        }

        fn destroy(&mut self, _world: &mut EntityWorld) {
            self.log.lock().push("destroy watcher".into());
        }
    }

    #[test]
    fn access_conflicts() {
        let read_pos = Access::new().read::<Position>();
        let write_pos = Access::new().write::<Position>();
        let read_vel = Access::new().read::<Velocity>();
        assert!(!read_pos.conflicts_with(&read_pos.clone()));
        assert!(read_pos.conflicts_with(&write_pos));
        assert!(write_pos.conflicts_with(&read_pos));
        assert!(!write_pos.conflicts_with(&read_vel));
        assert!(Access::exclusive().conflicts_with(&Access::new()));
        assert!(Access::new().write_tag("t").conflicts_with(&Access::new().read_tag("t")));
    }

    #[test]
    fn stages_pack_disjoint_callbacks() {
        struct Planner;
        impl System for Planner {
            fn setup(&mut self, _: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
                schedule
                    .on_tick("a", Access::new().write::<Position>(), |_, _| {})
                    .on_tick("b", Access::new().read::<Velocity>(), |_, _| {})
                    .on_tick("c", Access::new().read::<Position>(), |_, _| {})
                    .on_tick("d", Access::new().write::<Velocity>(), |_, _| {})
                    .on_tick("e", Access::new().read::<Name>(), |_, _| {});
            }
        }

        let mut world = EntityWorld::new();
        world.add_system(Planner);
        assert_eq!(
            world.stage_plan(Phase::Tick),
            vec![vec!["a", "b", "e"], vec!["c", "d"]]
        );
    }

    #[test]
    fn phases_run_in_order_and_changes_flow_downstream() {
        let log: Log = Arc::default();
        let mut world = EntityWorld::new();
        world.add_system(Watcher {
            log: log.clone(),
            seen: 0,
        });
        world.add_system(Mover {
            log: log.clone(),
            types_seen: Vec::new(),
        });

        let e = world.create_entity();
        world.add_component(e, Position(0));
        world.add_component(e, Velocity(2));
        world.end_tick();

        world.tick();
        assert_eq!(*log.lock(), vec!["prepare", "move", "watch"]);
        assert_eq!(*world.component::<Position>(e).unwrap(), Position(2));
        assert_eq!(world.find_system::<Watcher>().unwrap().seen, 1);
        assert_eq!(world.system_state::<Mover>(), Some(SystemState::Ticking));
        // end_tick ran after the phases
        assert!(world.recently_mutated::<Position>().is_empty());
    }

    #[test]
    fn systems_learn_every_component_type() {
        let mut world = EntityWorld::new();
        world.register_component::<Velocity>();
        world.add_system(Mover {
            log: Arc::default(),
            types_seen: Vec::new(),
        });
        world.register_component::<Name>();
        assert_eq!(
            world.find_system::<Mover>().unwrap().types_seen,
            vec!["Velocity", "Position", "Name"]
        );
    }

    #[test]
    fn destroy_runs_in_reverse_order() {
        let log: Log = Arc::default();
        {
            let mut world = EntityWorld::new();
            world.add_system(Mover {
                log: log.clone(),
                types_seen: Vec::new(),
            });
            world.add_system(Watcher {
                log: log.clone(),
                seen: 0,
            });
        }
        assert_eq!(*log.lock(), vec!["destroy watcher", "destroy mover"]);
    }

    #[test]
    fn fn_system_runs_every_tick() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_component(e, Position(0));
        world.add_system(FnSystem::new(
            "count",
            Phase::Tick,
            Access::of::<&mut Position>(),
            |world: &mut EntityWorld| world.query::<&mut Position>().for_each(|_, p| p.0 += 1),
        ));
        world.tick();
        world.tick();
        assert_eq!(world.component::<Position>(e).unwrap().0, 2);
        assert_eq!(world.system_names(), vec!["count"]);
    }

    #[test]
    fn system_added_during_tick_is_kept() {
        let mut world = EntityWorld::new();
        world.add_system(FnSystem::new(
            "spawner",
            Phase::Tick,
            Access::exclusive(),
            |world: &mut EntityWorld| {
                if world.system_names().is_empty() {
                    world.add_system(FnSystem::new(
                        "late",
                        Phase::Tick,
                        Access::new(),
                        |_: &mut EntityWorld| {},
                    ));
                }
            },
        ));
        world.tick();
        assert_eq!(world.system_names(), vec!["spawner", "late"]);
    }

    #[test]
    #[should_panic(expected = "illegal system state transition")]
    fn lifecycle_is_asserted() {
        SystemState::Destroyed.advance(SystemState::Ticking);
    }

    #[test]
    fn system_names_are_short() {
        assert_eq!(short_system_name("game::physics::Gravity"), "Gravity");
        assert_eq!(short_system_name("skald::ecs::system::FnSystem<game::{{closure}}>"), "FnSystem");
        assert_eq!(short_system_name("game::main::{{closure}}"), "<closure>");
    }
}
