//! Streams files referenced by [`AssetSource`] components.
//!
//! ```text
//! AssetSource added/changed ──► request ──► @loading
//!                                  │
//!            next ticks: poll ◄────┘
//!                 ok  → AssetData,   @loading removed
//!                 err → AssetFailed, @loading removed
//! ```
//!
//! Changing the path of an entity that is still loading supersedes the
//! old request; removing the `AssetSource` (or the entity) cancels it.
//! Either way a stale result is dropped instead of applied.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::asset::{AssetError, AssetLoader, AssetPayload, Ticket};
use crate::config::AssetConfig;
use crate::ecs::{Access, Changed, Component, EntityId, EntityWorld, System, SystemSchedule};

/// Implicit tag carried while a load is in flight.
pub const LOADING_TAG: &str = "@loading";

/// Path of the file an entity wants loaded, relative to the asset root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    pub path: String,
}

impl Component for AssetSource {}

impl AssetSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// The loaded contents of an entity's [`AssetSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssetData {
    pub path: String,
    pub payload: AssetPayload,
}

impl Component for AssetData {}

/// Set instead of [`AssetData`] when the load failed.
#[derive(Debug)]
pub struct AssetFailed {
    pub path: String,
    pub error: AssetError,
}

impl Component for AssetFailed {}

struct PendingLoad {
    entity: EntityId,
    path: String,
}

/// Drives an [`AssetLoader`] from the world.
pub struct AssetLoaderSystem {
    config: AssetConfig,
    loader: Option<AssetLoader>,
    by_entity: HashMap<EntityId, Ticket>,
    pending: HashMap<Ticket, PendingLoad>,
}

impl AssetLoaderSystem {
    pub fn new(config: AssetConfig) -> Self {
        Self {
            config,
            loader: None,
            by_entity: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Loads requested and not yet applied.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn loader(&self) -> Option<&AssetLoader> {
        self.loader.as_ref()
    }

    fn request(&mut self, world: &mut EntityWorld) {
        let Some(loader) = self.loader.as_mut() else {
            return;
        };

        for id in world.recently_removed::<AssetSource>() {
            if let Some(ticket) = self.by_entity.remove(&id) {
                self.pending.remove(&ticket);
                loader.cancel(ticket);
                log::debug!("cancelled load for {id}");
            }
            if world.exists(id) && world.has_tag(id, LOADING_TAG) {
                world.remove_implicit_tag(id, LOADING_TAG);
            }
        }

        if loader.is_watching() {
            let changed = loader.changed_files();
            if !changed.is_empty() {
                let stale: Vec<EntityId> = world
                    .query::<&AssetSource>()
                    .iter()
                    .filter(|(_, source)| {
                        let path = loader.resolve(&source.path);
                        let path = path.canonicalize().unwrap_or(path);
                        changed.contains(&path)
                    })
                    .map(|(id, _)| id)
                    .collect();
                if !stale.is_empty() {
                    log::info!("reloading {} asset(s) changed on disk", stale.len());
                    world.make_mutated::<AssetSource>(&stale);
                }
            }
        }

        let requests: Vec<(EntityId, String)> = world
            .query::<Changed<&AssetSource>>()
            .iter()
            .map(|(id, source)| (id, source.path.clone()))
            .collect();

        for (entity, path) in requests {
            if let Some(old) = self.by_entity.remove(&entity) {
                self.pending.remove(&old);
                loader.cancel(old);
            }
            match loader.request(&path) {
                Ok(ticket) => {
                    loader.watch(&path);
                    self.by_entity.insert(entity, ticket);
                    self.pending.insert(ticket, PendingLoad { entity, path });
                    world.add_implicit_tag(entity, LOADING_TAG);
                }
                Err(error) => {
                    if world.has_tag(entity, LOADING_TAG) {
                        world.remove_implicit_tag(entity, LOADING_TAG);
                    }
                    fail(world, entity, path, error);
                }
            }
        }
    }

    fn collect(&mut self, world: &mut EntityWorld) {
        let Some(loader) = self.loader.as_mut() else {
            return;
        };
        let completed = loader.poll();

        for done in completed {
            let Some(PendingLoad { entity, path }) = self.pending.remove(&done.ticket) else {
                continue;
            };
            self.by_entity.remove(&entity);
            if !world.exists(entity) {
                continue;
            }
            world.remove_implicit_tag(entity, LOADING_TAG);

            match done.result {
                Ok(payload) => {
                    world.remove_component::<AssetFailed>(entity);
                    world.add_component(entity, AssetData { path, payload });
                }
                Err(error) => fail(world, entity, path, error),
            }
        }
    }
}

fn fail(world: &mut EntityWorld, entity: EntityId, path: String, error: AssetError) {
    log::warn!("asset load failed for {entity}: {error}");
    world.remove_component::<AssetData>(entity);
    world.add_component(entity, AssetFailed { path, error });
}

impl Default for AssetLoaderSystem {
    fn default() -> Self {
        Self::new(AssetConfig::default())
    }
}

impl System for AssetLoaderSystem {
    fn setup(&mut self, world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
        world.register_component_serde::<AssetSource>();
        world.register_component::<AssetData>();
        world.register_component::<AssetFailed>();
        world.mark_all_mutated::<AssetSource>();

        log::debug!(
            "asset loader rooted at '{}' with {} worker(s)",
            self.config.root,
            self.config.worker_threads.max(1)
        );
        self.loader = Some(AssetLoader::new(&self.config));

        schedule
            .on_pre_tick(
                "request_assets",
                Access::of::<Changed<&AssetSource>>().write_tag(LOADING_TAG),
                Self::request,
            )
            .on_pre_tick(
                "collect_assets",
                Access::new()
                    .write::<AssetData>()
                    .write::<AssetFailed>()
                    .write_tag(LOADING_TAG),
                Self::collect,
            );
    }

    fn destroy(&mut self, _world: &mut EntityWorld) {
        if let Some(mut loader) = self.loader.take() {
            loader.shutdown();
        }
        self.by_entity.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("skald-loader-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn world(root: &Path) -> EntityWorld {
        let mut world = EntityWorld::new();
        world.add_system(AssetLoaderSystem::new(AssetConfig {
            worker_threads: 1,
            hot_reload: false,
            root: root.display().to_string(),
        }));
        world
    }

    fn tick_until(world: &mut EntityWorld, done: impl Fn(&EntityWorld) -> bool) {
        for _ in 0..400 {
            world.tick();
            if done(world) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn loads_into_asset_data() {
        let root = temp_root("load");
        std::fs::write(root.join("config.json"), r#"{ "speed": 3 }"#).unwrap();
        let mut world = world(&root);
        let id = world.create_entity();
        world.add_component(id, AssetSource::new("config.json"));

        world.tick();
        assert!(world.has_tag(id, LOADING_TAG) || world.has_component::<AssetData>(id));

        tick_until(&mut world, |w| w.has_component::<AssetData>(id));
        let data = world.component::<AssetData>(id).unwrap();
        assert_eq!(data.payload, AssetPayload::Json(serde_json::json!({ "speed": 3 })));
        drop(data);
        assert!(!world.has_tag(id, LOADING_TAG));
        assert_eq!(world.find_system::<AssetLoaderSystem>().unwrap().pending(), 0);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn failures_become_asset_failed() {
        let root = temp_root("fail");
        let mut world = world(&root);
        let id = world.create_entity();
        world.add_component(id, AssetSource::new("nowhere.bin"));

        tick_until(&mut world, |w| w.has_component::<AssetFailed>(id));
        let failed = world.component::<AssetFailed>(id).unwrap();
        assert!(matches!(failed.error, AssetError::Io { .. }));
        drop(failed);
        assert!(!world.has_component::<AssetData>(id));
        assert!(!world.has_tag(id, LOADING_TAG));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn removed_entities_discard_results() {
        let root = temp_root("discard");
        std::fs::write(root.join("a.bin"), [9u8; 16]).unwrap();
        let mut world = world(&root);
        let doomed = world.create_entity();
        world.add_component(doomed, AssetSource::new("a.bin"));
        world.tick();

        world.remove_entity(doomed);
        let other = world.create_entity();
        world.add_component(other, AssetSource::new("a.bin"));
        tick_until(&mut world, |w| w.has_component::<AssetData>(other));

        assert!(!world.exists(doomed));
        assert_eq!(world.component_ids::<AssetData>(), vec![other]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn requests_on_a_stopped_loader_fail_at_once() {
        let root = temp_root("stopped");
        std::fs::write(root.join("a.bin"), [1u8]).unwrap();
        let mut world = world(&root);
        let system = world.find_system_mut::<AssetLoaderSystem>().unwrap();
        system.loader.as_mut().unwrap().shutdown();

        let id = world.create_entity();
        world.add_component(id, AssetSource::new("a.bin"));
        world.tick();

        let failed = world.component::<AssetFailed>(id).unwrap();
        assert!(matches!(failed.error, AssetError::ShutDown));
        assert_eq!(failed.path, "a.bin");
        drop(failed);
        assert!(!world.has_tag(id, LOADING_TAG));
        assert_eq!(world.find_system::<AssetLoaderSystem>().unwrap().pending(), 0);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn superseded_paths_are_dropped() {
        let root = temp_root("supersede");
        std::fs::write(root.join("old.bin"), [1u8]).unwrap();
        std::fs::write(root.join("new.bin"), [2u8, 2]).unwrap();
        let mut world = world(&root);
        let id = world.create_entity();
        world.add_component(id, AssetSource::new("old.bin"));
        world.tick();

        world.add_component(id, AssetSource::new("new.bin"));
        tick_until(&mut world, |w| {
            w.component::<AssetData>(id)
                .is_some_and(|data| data.path == "new.bin")
        });

        let data = world.component::<AssetData>(id).unwrap();
        assert_eq!(data.path, "new.bin");
        assert_eq!(data.payload, AssetPayload::Bytes(vec![2, 2]));
        std::fs::remove_dir_all(&root).ok();
    }
}
