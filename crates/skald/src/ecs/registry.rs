//! # Component Registry: Explicit Type Registration
//!
//! The world needs to know, per component type, how to build its container,
//! how to persist it, and what extra capabilities systems may look for.
//! All of that lives in a [`ComponentInfo`], built once at startup:
//!
//! ```ignore
//! let mut registry = ComponentRegistry::new();
//! registry.register_serde::<Transformable>()
//!     .with_post_load(Transformable::after_load);
//! registry.register_serde::<MeshBounds>()
//!     .with_capability(AabbSource::of::<MeshBounds>());
//! registry.register::<ScratchData>();      // runtime only, never saved
//!
//! let world = EntityWorld::with_registry(registry);
//! ```
//!
//! Types used without registration are registered lazily by the world
//! (runtime only, no capabilities). Indices are dense and stable for the
//! lifetime of the world; they double as the column index of the
//! [`ComponentMatrix`](super::matrix::ComponentMatrix).

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::component::{Component, ComponentContainer, ComponentContainerBase, downcast};
use super::entity::EntityId;
use super::world::EntityWorld;

/// Dense index of a registered component type.
pub type ComponentTypeIndex = usize;

/// Upper bound on registered component types.
pub const MAX_COMPONENT_TYPES: usize = 256;

type FactoryFn = fn(ComponentTypeIndex, &'static str) -> Arc<dyn ComponentContainerBase>;
type SaveFn =
    fn(&dyn ComponentContainerBase) -> Result<Vec<(EntityId, serde_json::Value)>, serde_json::Error>;
type LoadFn = fn(
    &dyn ComponentContainerBase,
    Vec<(EntityId, serde_json::Value)>,
) -> Result<(), serde_json::Error>;
type InspectFn = fn(&dyn ComponentContainerBase, EntityId) -> Option<serde_json::Value>;

/// Hook run after a load has rebuilt the world, with the ids that received
/// this component.
pub type PostLoadFn = fn(&mut EntityWorld, &[EntityId]);

#[derive(Clone, Copy)]
struct SerdeFns {
    save: SaveFn,
    load: LoadFn,
    inspect: InspectFn,
}

/// Everything the world knows about one component type.
pub struct ComponentInfo {
    index: ComponentTypeIndex,
    type_id: TypeId,
    type_name: &'static str,
    short_name: String,
    factory: FactoryFn,
    serde: Option<SerdeFns>,
    post_load: Option<PostLoadFn>,
    capabilities: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ComponentInfo {
    pub fn index(&self) -> ComponentTypeIndex {
        self.index
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Name used in persisted state and diagnostics.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// True if this type is written by `save_state`.
    pub fn is_persistent(&self) -> bool {
        self.serde.is_some()
    }

    /// Attach a capability value that systems can look up by type.
    pub fn with_capability<C: Any + Send + Sync>(&mut self, capability: C) -> &mut Self {
        self.capabilities
            .insert(TypeId::of::<C>(), Box::new(capability));
        self
    }

    pub fn capability<C: Any>(&self) -> Option<&C> {
        self.capabilities
            .get(&TypeId::of::<C>())
            .and_then(|c| c.downcast_ref::<C>())
    }

    pub fn with_post_load(&mut self, hook: PostLoadFn) -> &mut Self {
        self.post_load = Some(hook);
        self
    }

    pub fn post_load(&self) -> Option<PostLoadFn> {
        self.post_load
    }

    pub(crate) fn create_container(&self) -> Arc<dyn ComponentContainerBase> {
        (self.factory)(self.index, self.type_name)
    }

    pub(crate) fn save(
        &self,
        container: &dyn ComponentContainerBase,
    ) -> Option<Result<Vec<(EntityId, serde_json::Value)>, serde_json::Error>> {
        self.serde.map(|fns| (fns.save)(container))
    }

    pub(crate) fn load(
        &self,
        container: &dyn ComponentContainerBase,
        entries: Vec<(EntityId, serde_json::Value)>,
    ) -> Option<Result<(), serde_json::Error>> {
        self.serde.map(|fns| (fns.load)(container, entries))
    }

    pub(crate) fn inspect(
        &self,
        container: &dyn ComponentContainerBase,
        id: EntityId,
    ) -> Option<serde_json::Value> {
        self.serde.and_then(|fns| (fns.inspect)(container, id))
    }
}

/// Maps component types to their [`ComponentInfo`].
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    by_type_id: HashMap<TypeId, ComponentTypeIndex>,
    by_name: HashMap<String, ComponentTypeIndex>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            infos: Vec::new(),
            by_type_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a runtime-only component type. Idempotent.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_COMPONENT_TYPES`] types get registered.
    pub fn register<T: Component>(&mut self) -> &mut ComponentInfo {
        let index = match self.by_type_id.get(&TypeId::of::<T>()) {
            Some(&index) => index,
            None => self.push_info::<T>(),
        };
        &mut self.infos[index]
    }

    /// Register a component type that is persisted by `save_state`.
    pub fn register_serde<T>(&mut self) -> &mut ComponentInfo
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let info = self.register::<T>();
        info.serde = Some(SerdeFns {
            save: save_entries::<T>,
            load: load_entries::<T>,
            inspect: inspect_entry::<T>,
        });
        info
    }

    fn push_info<T: Component>(&mut self) -> ComponentTypeIndex {
        assert!(
            self.infos.len() < MAX_COMPONENT_TYPES,
            "too many component types registered (max {MAX_COMPONENT_TYPES}) while adding `{}`",
            type_name::<T>()
        );

        let index = self.infos.len();
        let full = type_name::<T>();
        let mut short_name = short_type_name(full);
        if self.by_name.contains_key(&short_name) {
            log::warn!(
                "component name `{short_name}` is already taken, registering `{full}` under its full path"
            );
            short_name = full.to_string();
        }

        self.infos.push(ComponentInfo {
            index,
            type_id: TypeId::of::<T>(),
            type_name: full,
            short_name: short_name.clone(),
            factory: create_container::<T>,
            serde: None,
            post_load: None,
            capabilities: HashMap::new(),
        });
        self.by_type_id.insert(TypeId::of::<T>(), index);
        self.by_name.insert(short_name, index);
        index
    }

    pub fn index_of<T: 'static>(&self) -> Option<ComponentTypeIndex> {
        self.index_of_type_id(TypeId::of::<T>())
    }

    pub fn index_of_type_id(&self, type_id: TypeId) -> Option<ComponentTypeIndex> {
        self.by_type_id.get(&type_id).copied()
    }

    pub fn info(&self, index: ComponentTypeIndex) -> Option<&ComponentInfo> {
        self.infos.get(index)
    }

    pub(crate) fn info_mut(&mut self, index: ComponentTypeIndex) -> Option<&mut ComponentInfo> {
        self.infos.get_mut(index)
    }

    pub fn info_by_name(&self, name: &str) -> Option<&ComponentInfo> {
        self.by_name.get(name).map(|&i| &self.infos[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Monomorphized fn pointers ────────────────────────────────────────────

fn create_container<T: Component>(
    index: ComponentTypeIndex,
    name: &'static str,
) -> Arc<dyn ComponentContainerBase> {
    Arc::new(ComponentContainer::<T>::new(index, name))
}

fn save_entries<T: Component + Serialize>(
    container: &dyn ComponentContainerBase,
) -> Result<Vec<(EntityId, serde_json::Value)>, serde_json::Error> {
    let set = downcast::<T>(container).read();
    let entries = set
        .iter()
        .map(|(id, value)| Ok((id, serde_json::to_value(value)?)))
        .collect();
    entries
}

fn load_entries<T: Component + DeserializeOwned>(
    container: &dyn ComponentContainerBase,
    entries: Vec<(EntityId, serde_json::Value)>,
) -> Result<(), serde_json::Error> {
    // Decode everything first so a bad record leaves the container untouched.
    let values = entries
        .into_iter()
        .map(|(id, json)| Ok((id, serde_json::from_value::<T>(json)?)))
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    let typed = downcast::<T>(container);
    for (id, value) in values {
        typed.insert_untracked(id, value);
    }
    Ok(())
}

fn inspect_entry<T: Component + Serialize>(
    container: &dyn ComponentContainerBase,
    id: EntityId,
) -> Option<serde_json::Value> {
    let value = downcast::<T>(container).try_get(id)?;
    serde_json::to_value(&*value).ok()
}

/// Strip module paths from a type name, keeping generic arguments readable
/// (`alloc::vec::Vec<game::Tile>` → `Vec<Tile>`).
pub(crate) fn short_type_name(full: &str) -> String {
    if let Some(angle) = full.find('<') {
        let prefix = &full[..angle];
        let short_prefix = prefix.rsplit("::").next().unwrap_or(prefix);
        let inner = &full[angle + 1..full.len() - 1];
        let args: Vec<String> = split_generic_args(inner)
            .into_iter()
            .map(short_type_name)
            .collect();
        format!("{}<{}>", short_prefix, args.join(", "))
    } else {
        full.rsplit("::").next().unwrap_or(full).to_string()
    }
}

fn split_generic_args(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}
