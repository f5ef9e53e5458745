//! # World State: Save & Load
//!
//! The persisted layout is one JSON document:
//!
//! ```text
//! { "version": 1,
//!   "entities":   { "slots": [[gen, alive], ..], "free": [..], "parents": [[child, parent], ..] },
//!   "components": [ { "type": "Transformable", "entries": [[id, value], ..] }, .. ],
//!   "tags":       { "player": [id, ..] } }
//! ```
//!
//! Only types registered with `register_serde` are written, and only when
//! they hold at least one value. Implicit (`@`) tags are runtime state and
//! are not written.
//!
//! Loading replaces the world's contents:
//!
//! 1. parse and check the version
//! 2. clear the world
//! 3. rebuild the pool (validated)
//! 4. fill containers, skipping unknown type names
//! 5. rebuild matrix membership entity by entity
//! 6. run each type's post-load hook
//!
//! Any error clears the world again, so a failed load never leaves it half
//! populated.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{EntityId, EntityPool, EntityPoolState};
use super::registry::ComponentTypeIndex;
use super::world::{EntityWorld, IMPLICIT_TAG_PREFIX};

/// Format version written by [`EntityWorld::save_state`].
pub const STATE_VERSION: u64 = 1;

/// Errors from saving or loading world state.
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt state stream: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("unsupported state version {found} (expected {expected})")]
    VersionMismatch { found: u64, expected: u64 },

    #[error("inconsistent state: {0}")]
    Invalid(String),

    #[error("failed to encode component: {0}")]
    Encode(#[source] serde_json::Error),
}

/// What a successful load restored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub entities: usize,
    pub components: usize,
    /// Component records whose type name isn't registered as persistent.
    pub skipped_types: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct WorldState {
    version: u64,
    entities: EntityPoolState,
    components: Vec<ComponentRecord>,
    tags: BTreeMap<String, Vec<EntityId>>,
}

#[derive(Serialize, Deserialize)]
struct ComponentRecord {
    #[serde(rename = "type")]
    type_name: String,
    entries: Vec<(EntityId, Value)>,
}

fn read_error(err: serde_json::Error) -> StateError {
    if err.is_io() {
        StateError::Io(err.into())
    } else {
        StateError::Corrupt(err)
    }
}

fn write_error(err: serde_json::Error) -> StateError {
    if err.is_io() {
        StateError::Io(err.into())
    } else {
        StateError::Encode(err)
    }
}

impl EntityWorld {
    /// Write every entity, persisted component and user tag to `writer`.
    pub fn save_state<W: Write>(&self, writer: W) -> Result<(), StateError> {
        let state = self.capture_state()?;
        serde_json::to_writer(writer, &state).map_err(write_error)
    }

    pub fn save_state_to_file(&self, path: impl AsRef<Path>) -> Result<(), StateError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save_state(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn capture_state(&self) -> Result<WorldState, StateError> {
        let mut components = Vec::new();
        for info in self.registry.iter() {
            let container = self.containers[info.index()].as_ref();
            if container.len() == 0 {
                continue;
            }
            let Some(entries) = info.save(container) else {
                continue;
            };
            let mut entries = entries.map_err(StateError::Encode)?;
            entries.sort_by_key(|(id, _)| *id);
            components.push(ComponentRecord {
                type_name: info.short_name().to_string(),
                entries,
            });
        }

        let mut tags = BTreeMap::new();
        for name in self.matrix.tag_names() {
            if name.starts_with(IMPLICIT_TAG_PREFIX) {
                continue;
            }
            let mut ids = self.matrix.with_tag(&name).to_vec();
            if ids.is_empty() {
                continue;
            }
            ids.sort();
            tags.insert(name, ids);
        }

        Ok(WorldState {
            version: STATE_VERSION,
            entities: self.pool.state(),
            components,
            tags,
        })
    }

    /// Replace the world's contents with the state read from `reader`.
    ///
    /// Unknown component types are skipped and listed in the report. On
    /// error the world is left empty.
    pub fn load_state<R: Read>(&mut self, reader: R) -> Result<LoadReport, StateError> {
        let result = self.restore_state(reader);
        if result.is_err() {
            self.clear();
        }
        result
    }

    pub fn load_state_from_file(&mut self, path: impl AsRef<Path>) -> Result<LoadReport, StateError> {
        match File::open(path) {
            Ok(file) => self.load_state(BufReader::new(file)),
            Err(err) => {
                self.clear();
                Err(err.into())
            }
        }
    }

    fn restore_state<R: Read>(&mut self, reader: R) -> Result<LoadReport, StateError> {
        let value: Value = serde_json::from_reader(reader).map_err(read_error)?;
        let found = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| StateError::Invalid("missing `version` field".into()))?;
        if found != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                found,
                expected: STATE_VERSION,
            });
        }
        let state: WorldState = serde_json::from_value(value).map_err(StateError::Corrupt)?;

        self.clear();
        self.pool = EntityPool::from_state(state.entities)?;

        let mut report = LoadReport {
            entities: self.pool.len(),
            ..LoadReport::default()
        };

        let mut loaded: Vec<(ComponentTypeIndex, Vec<EntityId>)> = Vec::new();
        for record in state.components {
            let info = match self.registry.info_by_name(&record.type_name) {
                Some(info) if info.is_persistent() => info,
                _ => {
                    log::warn!(
                        "skipping unknown component type `{}` ({} entries)",
                        record.type_name,
                        record.entries.len()
                    );
                    report.skipped_types.push(record.type_name);
                    continue;
                }
            };
            let index = info.index();
            if loaded.iter().any(|(seen, _)| *seen == index) {
                return Err(StateError::Invalid(format!(
                    "component `{}` appears twice",
                    record.type_name
                )));
            }

            let ids: Vec<EntityId> = record.entries.iter().map(|(id, _)| *id).collect();
            let mut unique = HashSet::with_capacity(ids.len());
            for &id in &ids {
                if !self.pool.exists(id) {
                    return Err(StateError::Invalid(format!(
                        "component `{}` references dead entity {id}",
                        record.type_name
                    )));
                }
                if !unique.insert(id) {
                    return Err(StateError::Invalid(format!(
                        "component `{}` lists entity {id} twice",
                        record.type_name
                    )));
                }
            }

            let container = self.containers[index].as_ref();
            if let Some(result) = info.load(container, record.entries) {
                result.map_err(StateError::Corrupt)?;
            }
            report.components += ids.len();
            loaded.push((index, ids));
        }

        let mut entity_tags: HashMap<EntityId, Vec<&str>> = HashMap::new();
        for (tag, ids) in &state.tags {
            for &id in ids {
                if !self.pool.exists(id) {
                    return Err(StateError::Invalid(format!(
                        "tag `{tag}` references dead entity {id}"
                    )));
                }
                entity_tags.entry(id).or_default().push(tag);
            }
        }

        let alive: Vec<EntityId> = self.pool.ids().collect();
        for id in alive {
            self.matrix.add_entity(id);
            for (index, _) in &loaded {
                if self.containers[*index].contains(id) {
                    self.matrix.add_component(id, *index);
                }
            }
            if let Some(tags) = entity_tags.get(&id) {
                for tag in tags {
                    self.matrix.add_tag(id, tag);
                }
            }
        }

        for (index, ids) in &loaded {
            if let Some(hook) = self.registry.info(*index).and_then(|info| info.post_load()) {
                hook(self, ids);
            }
        }

        log::debug!(
            "loaded {} entities, {} components ({} types skipped)",
            report.entities,
            report.components,
            report.skipped_types.len()
        );
        Ok(report)
    }
}
