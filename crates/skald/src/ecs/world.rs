//! # EntityWorld: The Top-Level ECS Container
//!
//! The world owns everything: the [`EntityPool`], one container per
//! registered component type, the [`ComponentMatrix`] that keeps groups up
//! to date, the memoized groups themselves, and the systems.
//!
//! ```text
//! EntityWorld
//!   pool        EntityPool                          ids, generations, hierarchy
//!   registry    ComponentRegistry                   type → ComponentInfo
//!   containers  Vec<Arc<dyn ComponentContainerBase>>  indexed by type index
//!   matrix      ComponentMatrix                     components/tags → groups
//!   groups      (TypeId, tags) → Arc<EntityGroup<P>>
//!   systems     SystemManager
//! ```
//!
//! ## Access Rules
//!
//! - Structural changes (add/remove component, entity, tag) take `&mut self`
//!   and keep the matrix and every group in sync before returning.
//! - Group queries are the tracked way to write components: `&mut T` in a
//!   signature marks the returned entities mutated.
//! - [`EntityWorld::component`] and [`EntityWorld::component_mut`] are raw
//!   point access and never mark anything.
//!
//! Operating on a dead entity or touching a reserved tag through the user
//! API is a programming error, caught by `debug_assert!`.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::component::{
    Component, ComponentContainer, ComponentContainerBase, ComponentMut, ComponentRef, downcast,
};
use super::entity::{EntityId, EntityPool};
use super::filter::{FilterKind, GroupParam};
use super::group::{EntityGroup, Query};
use super::matrix::{ComponentMatrix, Condition, ConditionKey, GroupMembership};
use super::registry::{ComponentRegistry, ComponentTypeIndex, PostLoadFn, short_type_name};
use super::system::SystemManager;

/// Prefix of system-managed tags.
pub const IMPLICIT_TAG_PREFIX: char = '@';
/// Prefix negating a tag inside a group's tag list.
pub const NOT_TAG_PREFIX: char = '!';

/// True for tag names user code may not add or remove directly.
pub fn is_implicit_tag(tag: &str) -> bool {
    tag.starts_with(IMPLICIT_TAG_PREFIX) || tag.starts_with(NOT_TAG_PREFIX)
}

type GroupKey = (TypeId, Vec<String>);
type GroupSignature = (Vec<(ComponentTypeIndex, FilterKind)>, Vec<String>);

/// Diagnostics view of one registered group.
#[derive(Clone)]
pub struct GroupInfo {
    pub label: String,
    pub membership: Arc<GroupMembership>,
}

/// The central container for all ECS state.
pub struct EntityWorld {
    pub(crate) pool: EntityPool,
    pub(crate) registry: ComponentRegistry,
    pub(crate) containers: Vec<Arc<dyn ComponentContainerBase>>,
    pub(crate) matrix: ComponentMatrix,
    groups: HashMap<GroupKey, Arc<dyn Any + Send + Sync>>,
    group_signatures: HashMap<GroupSignature, TypeId>,
    group_infos: Vec<GroupInfo>,
    pub(crate) systems: SystemManager,
}

impl EntityWorld {
    /// An empty world. Component types get registered lazily on first use.
    pub fn new() -> Self {
        Self::with_registry(ComponentRegistry::new())
    }

    /// A world with one container per type in `registry`.
    pub fn with_registry(registry: ComponentRegistry) -> Self {
        let containers = registry.iter().map(|info| info.create_container()).collect();
        Self {
            pool: EntityPool::new(),
            registry,
            containers,
            matrix: ComponentMatrix::new(),
            groups: HashMap::new(),
            group_signatures: HashMap::new(),
            group_infos: Vec::new(),
            systems: SystemManager::default(),
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a runtime-only component type. Idempotent.
    pub fn register_component<T: Component>(&mut self) -> ComponentTypeIndex {
        self.type_index::<T>()
    }

    /// Register a persisted component type. Idempotent; upgrades a type that
    /// was registered runtime-only.
    pub fn register_component_serde<T>(&mut self) -> ComponentTypeIndex
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let before = self.registry.len();
        let index = self.registry.register_serde::<T>().index();
        self.sync_containers(before);
        index
    }

    /// Attach a post-load hook to `T`, registering it runtime-only if it
    /// isn't known yet.
    pub fn set_post_load<T: Component>(&mut self, hook: PostLoadFn) {
        let index = self.type_index::<T>();
        if let Some(info) = self.registry.info_mut(index) {
            info.with_post_load(hook);
        }
    }

    fn type_index<T: Component>(&mut self) -> ComponentTypeIndex {
        if let Some(index) = self.registry.index_of::<T>() {
            return index;
        }
        log::debug!("registering component `{}` lazily", type_name::<T>());
        let before = self.registry.len();
        let index = self.registry.register::<T>().index();
        self.sync_containers(before);
        index
    }

    fn sync_containers(&mut self, before: usize) {
        if self.registry.len() == before {
            return;
        }
        for info in self.registry.iter().skip(before) {
            self.containers.push(info.create_container());
        }
        self.systems.announce_types(&self.registry);
    }

    pub(crate) fn container_arc<T: Component>(&mut self) -> Arc<dyn ComponentContainerBase> {
        let index = self.type_index::<T>();
        Arc::clone(&self.containers[index])
    }

    /// The typed container for `T`, if the type is registered.
    pub fn container<T: Component>(&self) -> Option<&ComponentContainer<T>> {
        let index = self.registry.index_of::<T>()?;
        Some(downcast::<T>(self.containers[index].as_ref()))
    }

    /// The type-erased container at `index`.
    pub fn container_by_index(&self, index: ComponentTypeIndex) -> Option<&dyn ComponentContainerBase> {
        self.containers.get(index).map(|c| c.as_ref())
    }

    pub fn containers(&self) -> impl Iterator<Item = &dyn ComponentContainerBase> {
        self.containers.iter().map(|c| c.as_ref())
    }

    // ── Entities ─────────────────────────────────────────────────────

    /// Create an entity with no components.
    pub fn create_entity(&mut self) -> EntityId {
        let id = self.pool.create();
        self.matrix.add_entity(id);
        id
    }

    /// Create an entity parented to `parent`.
    pub fn create_child(&mut self, parent: EntityId) -> EntityId {
        let id = self.create_entity();
        self.set_parent(id, Some(parent));
        id
    }

    /// Remove an entity with all its components and tags. Children are
    /// orphaned, not removed.
    pub fn remove_entity(&mut self, id: EntityId) {
        debug_assert!(self.exists(id), "remove_entity on dead entity {id}");
        if !self.pool.exists(id) {
            return;
        }
        self.remove_all_components(id);
        self.remove_all_tags(id);
        self.matrix.remove_entity(id);
        self.pool.recycle(id);
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.pool.exists(id)
    }

    pub fn entity_count(&self) -> usize {
        self.pool.len()
    }

    /// Ids of every live entity, ordered by index.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.pool.ids().collect()
    }

    pub fn pool(&self) -> &EntityPool {
        &self.pool
    }

    pub fn remove_all_entities(&mut self) {
        for id in self.entity_ids() {
            self.remove_entity(id);
        }
    }

    /// Remove every entity and forget all change tracking. Registered types,
    /// groups and systems survive.
    pub fn clear(&mut self) {
        self.remove_all_entities();
        for container in &self.containers {
            container.clear();
        }
        self.matrix.clear();
    }

    // ── Components ───────────────────────────────────────────────────

    /// Add or replace `T` on `id`, marking it mutated.
    pub fn add_component<T: Component>(&mut self, id: EntityId, value: T) {
        debug_assert!(self.exists(id), "add_component on dead entity {id}");
        let ty = self.type_index::<T>();
        if downcast::<T>(self.containers[ty].as_ref()).insert(id, value) {
            self.matrix.add_component(id, ty);
        }
    }

    /// Like [`add_component`](Self::add_component), returning the stored value.
    pub fn add_or_replace<T: Component>(&mut self, id: EntityId, value: T) -> ComponentMut<'_, T> {
        self.add_component(id, value);
        self.stored_mut::<T>(id)
    }

    /// The existing `T` on `id`, or a default-constructed one. Marks mutated
    /// either way.
    pub fn get_or_add<T: Component + Default>(&mut self, id: EntityId) -> ComponentMut<'_, T> {
        debug_assert!(self.exists(id), "get_or_add on dead entity {id}");
        let ty = self.type_index::<T>();
        if downcast::<T>(self.containers[ty].as_ref()).get_or_insert_with(id, T::default) {
            self.matrix.add_component(id, ty);
        }
        self.stored_mut::<T>(id)
    }

    fn stored_mut<T: Component>(&self, id: EntityId) -> ComponentMut<'_, T> {
        self.component_mut::<T>(id)
            .unwrap_or_else(|| panic!("`{}` missing on {id} right after insert", type_name::<T>()))
    }

    /// Remove `T` from `id`, recording it in the removed set.
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Option<T> {
        debug_assert!(self.exists(id), "remove_component on dead entity {id}");
        let ty = self.registry.index_of::<T>()?;
        let value = downcast::<T>(self.containers[ty].as_ref()).take(id)?;
        self.matrix.remove_component(id, ty);
        Some(value)
    }

    pub fn remove_all_components(&mut self, id: EntityId) {
        for ty in 0..self.containers.len() {
            if self.matrix.has_component(id, ty) {
                self.containers[ty].remove(id);
                self.matrix.remove_component(id, ty);
            }
        }
    }

    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        self.registry
            .index_of::<T>()
            .is_some_and(|ty| self.matrix.has_component(id, ty))
    }

    /// Raw shared access to one component.
    pub fn component<T: Component>(&self, id: EntityId) -> Option<ComponentRef<'_, T>> {
        self.container::<T>()?.try_get(id)
    }

    /// Raw mutable access to one component. Not tracked: use a group query
    /// (or [`make_mutated`](Self::make_mutated)) when other systems need to
    /// see the write.
    pub fn component_mut<T: Component>(&self, id: EntityId) -> Option<ComponentMut<'_, T>> {
        self.container::<T>()?.try_get_mut(id)
    }

    /// Ids of every entity carrying `T`, in storage order.
    pub fn component_ids<T: Component>(&self) -> Vec<EntityId> {
        self.container::<T>().map(|c| c.ids()).unwrap_or_default()
    }

    // ── Tags ─────────────────────────────────────────────────────────

    /// Attach a user tag.
    pub fn add_tag(&mut self, id: EntityId, tag: &str) {
        debug_assert!(
            !is_implicit_tag(tag),
            "`{tag}` is a reserved tag name and can't be added directly"
        );
        debug_assert!(self.exists(id), "add_tag on dead entity {id}");
        self.matrix.add_tag(id, tag);
    }

    pub fn remove_tag(&mut self, id: EntityId, tag: &str) {
        debug_assert!(
            !is_implicit_tag(tag),
            "`{tag}` is a reserved tag name and can't be removed directly"
        );
        debug_assert!(self.exists(id), "remove_tag on dead entity {id}");
        self.matrix.remove_tag(id, tag);
    }

    /// Attach a system-managed tag (must start with `@`).
    pub fn add_implicit_tag(&mut self, id: EntityId, tag: &str) {
        assert!(
            tag.starts_with(IMPLICIT_TAG_PREFIX),
            "implicit tag `{tag}` must start with `{IMPLICIT_TAG_PREFIX}`"
        );
        debug_assert!(self.exists(id), "add_implicit_tag on dead entity {id}");
        self.matrix.add_tag(id, tag);
    }

    pub fn remove_implicit_tag(&mut self, id: EntityId, tag: &str) {
        assert!(
            tag.starts_with(IMPLICIT_TAG_PREFIX),
            "implicit tag `{tag}` must start with `{IMPLICIT_TAG_PREFIX}`"
        );
        debug_assert!(self.exists(id), "remove_implicit_tag on dead entity {id}");
        self.matrix.remove_tag(id, tag);
    }

    pub fn has_tag(&self, id: EntityId, tag: &str) -> bool {
        self.matrix.has_tag(id, tag)
    }

    /// Every entity carrying `tag`.
    pub fn with_tag(&self, tag: &str) -> &[EntityId] {
        self.matrix.with_tag(tag)
    }

    /// Every tag on `id`, sorted.
    pub fn tags_of(&self, id: EntityId) -> Vec<String> {
        self.matrix.tags_of(id)
    }

    /// Remove a user tag from every entity.
    pub fn clear_tag(&mut self, tag: &str) {
        debug_assert!(
            !is_implicit_tag(tag),
            "`{tag}` is a reserved tag name and can't be cleared directly"
        );
        let ids = self.matrix.with_tag(tag).to_vec();
        for id in ids {
            self.matrix.remove_tag(id, tag);
        }
    }

    /// Remove every tag (implicit ones included) from `id`.
    pub fn remove_all_tags(&mut self, id: EntityId) {
        for tag in self.matrix.tags_of(id) {
            self.matrix.remove_tag(id, &tag);
        }
    }

    // ── Hierarchy ────────────────────────────────────────────────────

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.pool.parent(id)
    }

    /// Reparent `id`, or detach it with `None`.
    pub fn set_parent(&mut self, id: EntityId, parent: Option<EntityId>) {
        debug_assert!(self.exists(id), "set_parent on dead entity {id}");
        self.pool.set_parent(id, parent);
    }

    pub fn has_parent(&self, id: EntityId) -> bool {
        self.pool.has_parent(id)
    }

    pub fn children(&self, id: EntityId) -> &[EntityId] {
        self.pool.children(id)
    }

    pub fn has_children(&self, id: EntityId) -> bool {
        self.pool.has_children(id)
    }

    /// Ancestors of `id`, nearest first.
    pub fn parents(&self, id: EntityId) -> Vec<EntityId> {
        self.pool.parents(id)
    }

    pub fn is_parent(&self, id: EntityId, ancestor: EntityId) -> bool {
        self.pool.is_parent(id, ancestor)
    }

    // ── Groups & queries ─────────────────────────────────────────────

    /// The group for signature `P` filtered by `tags`, created on first
    /// request and shared afterwards.
    ///
    /// Tags may be negated with a `!` prefix. Tag order doesn't matter.
    ///
    /// # Panics
    ///
    /// Panics if `P` names the same component type twice.
    pub fn create_group<P: GroupParam>(&mut self, tags: &[&str]) -> Arc<EntityGroup<P>> {
        let mut tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        tags.sort();
        tags.dedup();

        let key = (TypeId::of::<P>(), tags.clone());
        if let Some(existing) = self.groups.get(&key) {
            if let Ok(group) = Arc::clone(existing).downcast::<EntityGroup<P>>() {
                return group;
            }
        }

        let mut terms = Vec::new();
        let containers = P::bind(self, &mut terms);

        let mut seen: Vec<ComponentTypeIndex> = terms.iter().map(|t| t.type_index).collect();
        seen.sort_unstable();
        let before = seen.len();
        seen.dedup();
        assert!(
            seen.len() == before,
            "group signature `{}` names the same component twice",
            type_name::<P>()
        );

        let mut conditions: Vec<Condition> = terms
            .iter()
            .filter_map(|t| {
                t.kind.presence().map(|required| Condition {
                    key: ConditionKey::Component(t.type_index),
                    required,
                })
            })
            .collect();
        for tag in &tags {
            conditions.push(match tag.strip_prefix(NOT_TAG_PREFIX) {
                Some(name) => Condition {
                    key: ConditionKey::Tag(name.to_string()),
                    required: false,
                },
                None => Condition {
                    key: ConditionKey::Tag(tag.clone()),
                    required: true,
                },
            });
        }

        let mut signature: Vec<(ComponentTypeIndex, FilterKind)> =
            terms.iter().map(|t| (t.type_index, t.kind)).collect();
        signature.sort();
        let signature = (signature, tags.clone());
        match self.group_signatures.get(&signature) {
            Some(other) if *other != TypeId::of::<P>() => log::warn!(
                "group `{}` {:?} matches an existing group with a different parameter order; \
                 membership will be maintained twice",
                type_name::<P>(),
                tags
            ),
            Some(_) => {}
            None => {
                self.group_signatures.insert(signature, TypeId::of::<P>());
            }
        }

        let label = {
            let params: Vec<String> = terms.iter().map(|t| t.label()).collect();
            if tags.is_empty() {
                format!("({})", params.join(", "))
            } else {
                format!("({}) [{}]", params.join(", "), tags.join(", "))
            }
        };
        log::debug!("creating group {label}");

        let membership = self.matrix.register_group(conditions, self.pool.ids());
        self.group_infos.push(GroupInfo {
            label,
            membership: Arc::clone(&membership),
        });

        let group = Arc::new(EntityGroup::<P>::new(containers, terms, tags, membership));
        let erased: Arc<dyn Any + Send + Sync> = group.clone();
        self.groups.insert(key, erased);
        group
    }

    /// Query the untagged group for `P`.
    pub fn query<P: GroupParam>(&mut self) -> Query<P> {
        self.create_group::<P>(&[]).query()
    }

    /// Query the group for `P` filtered by `tags`.
    pub fn query_tagged<P: GroupParam>(&mut self, tags: &[&str]) -> Query<P> {
        self.create_group::<P>(tags).query()
    }

    /// Query the untagged group for `P`, restricted to `ids` (in that order).
    pub fn query_subset<P: GroupParam>(&mut self, ids: &[EntityId]) -> Query<P> {
        self.create_group::<P>(&[]).query_subset(ids)
    }

    /// Every group created so far, in creation order.
    pub fn group_infos(&self) -> &[GroupInfo] {
        &self.group_infos
    }

    // ── Change tracking ──────────────────────────────────────────────

    /// Mark `T` on `ids` as mutated. Ids without `T` are ignored.
    pub fn make_mutated<T: Component>(&self, ids: &[EntityId]) {
        if let Some(container) = self.container::<T>() {
            ComponentContainerBase::mark_mutated(container, ids);
        }
    }

    /// Mark every `T` as mutated.
    pub fn mark_all_mutated<T: Component>(&self) {
        if let Some(container) = self.container::<T>() {
            ComponentContainerBase::mark_all_mutated(container);
        }
    }

    pub fn recently_mutated<T: Component>(&self) -> Vec<EntityId> {
        self.container::<T>()
            .map(ComponentContainerBase::recently_mutated)
            .unwrap_or_default()
    }

    pub fn recently_mutated_by_index(&self, index: ComponentTypeIndex) -> Vec<EntityId> {
        self.containers
            .get(index)
            .map(|c| c.recently_mutated())
            .unwrap_or_default()
    }

    pub fn recently_removed<T: Component>(&self) -> Vec<EntityId> {
        self.container::<T>()
            .map(ComponentContainerBase::recently_removed)
            .unwrap_or_default()
    }

    /// Clear every mutated and removed set. Run once per tick, after all
    /// systems have observed the changes.
    pub fn end_tick(&mut self) {
        for container in &self.containers {
            container.clear_tracking();
        }
    }

    // ── Inspection ───────────────────────────────────────────────────

    /// Registered short name of the component type at `index`.
    pub fn component_type_name(&self, index: ComponentTypeIndex) -> Option<&str> {
        self.registry.info(index).map(|info| info.short_name())
    }

    /// JSON values of every persisted component on `id`, by short name.
    /// Runtime-only components are listed with a `null` value.
    pub fn inspect_components(&self, id: EntityId) -> Vec<(String, serde_json::Value)> {
        self.registry
            .iter()
            .filter(|info| self.matrix.has_component(id, info.index()))
            .map(|info| {
                let container = self.containers[info.index()].as_ref();
                let value = info.inspect(container, id).unwrap_or(serde_json::Value::Null);
                (info.short_name().to_string(), value)
            })
            .collect()
    }

    /// Short name used for a type in diagnostics, whether registered or not.
    pub fn display_type_name<T: 'static>(&self) -> String {
        match self.registry.index_of::<T>() {
            Some(index) => self.registry.info(index).map(|i| i.short_name().to_string()).unwrap_or_default(),
            None => short_type_name(type_name::<T>()),
        }
    }
}

impl Default for EntityWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EntityWorld {
    fn drop(&mut self) {
        self.destroy_systems();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::filter::Changed;

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    struct Position(i32);
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    struct Velocity(i32);
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Name(String);

    impl Component for Position {}
    impl Component for Velocity {}
    impl Component for Name {}

    #[test]
    fn add_get_remove_component() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_component(e, Position(3));
        assert!(world.has_component::<Position>(e));
        assert_eq!(*world.component::<Position>(e).unwrap(), Position(3));

        assert_eq!(world.remove_component::<Position>(e), Some(Position(3)));
        assert!(!world.has_component::<Position>(e));
        assert!(world.component::<Position>(e).is_none());
        assert_eq!(world.recently_removed::<Position>(), vec![e]);
    }

    #[test]
    fn get_or_add_keeps_existing() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.get_or_add::<Velocity>(e).0 = 7;
        assert_eq!(world.get_or_add::<Velocity>(e).0, 7);
        world.add_or_replace(e, Velocity(1)).0 += 1;
        assert_eq!(*world.component::<Velocity>(e).unwrap(), Velocity(2));
    }

    #[test]
    fn raw_mutation_is_untracked() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_component(e, Position(0));
        world.end_tick();
        world.component_mut::<Position>(e).unwrap().0 = 9;
        assert!(world.recently_mutated::<Position>().is_empty());
    }

    #[test]
    fn remove_entity_cascades() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        let other = world.create_entity();
        world.add_component(e, Position(1));
        world.add_component(e, Velocity(2));
        world.add_tag(e, "t");
        world.add_tag(other, "t");
        let group = world.create_group::<(&Position, &Velocity)>(&[]);
        assert_eq!(group.len(), 1);

        world.remove_entity(e);
        assert!(!world.exists(e));
        assert_eq!(world.with_tag("t"), &[other]);
        assert!(group.is_empty());
        assert!(world.component_ids::<Position>().is_empty());
    }

    #[test]
    fn groups_are_memoized() {
        let mut world = EntityWorld::new();
        let a = world.create_group::<(&Position, &Velocity)>(&["x", "y"]);
        let b = world.create_group::<(&Position, &Velocity)>(&["y", "x"]);
        let c = world.create_group::<(&Position, &Velocity)>(&["x"]);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(world.group_infos().len(), 2);
    }

    #[test]
    #[should_panic(expected = "names the same component twice")]
    fn duplicate_type_in_signature_panics() {
        let mut world = EntityWorld::new();
        world.create_group::<(&Position, Changed<&Position>)>(&[]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "reserved tag name")]
    fn implicit_tag_is_rejected_by_user_api() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_tag(e, "@loading");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "reserved tag name")]
    fn implicit_tag_removal_is_rejected_by_user_api() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_implicit_tag(e, "@loading");
        world.remove_tag(e, "@loading");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "remove_tag on dead entity")]
    fn tag_removal_on_dead_entity_panics() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_tag(e, "player");
        world.remove_entity(e);
        world.remove_tag(e, "player");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "remove_implicit_tag on dead entity")]
    fn implicit_tag_removal_on_dead_entity_panics() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_implicit_tag(e, "@loading");
        world.remove_entity(e);
        world.remove_implicit_tag(e, "@loading");
    }

    #[test]
    fn implicit_tags_through_system_api() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_implicit_tag(e, "@loading");
        assert!(world.has_tag(e, "@loading"));
        world.remove_implicit_tag(e, "@loading");
        assert!(world.tags_of(e).is_empty());
    }

    #[test]
    fn thousand_entities_hundred_mutated() {
        let mut world = EntityWorld::new();
        let ids: Vec<_> = (0..1000)
            .map(|i| {
                let e = world.create_entity();
                world.add_component(e, Position(i));
                e
            })
            .collect();
        assert_eq!(world.query::<&Position>().len(), 1000);
        world.end_tick();

        let every_tenth: Vec<_> = ids.iter().copied().step_by(10).collect();
        world
            .query_subset::<&mut Position>(&every_tenth)
            .for_each(|_, pos| pos.0 += 1);

        let mut changed = world.query::<Changed<&Position>>().ids().to_vec();
        changed.sort();
        assert_eq!(changed, every_tenth);

        world.end_tick();
        assert!(world.query::<Changed<&Position>>().is_empty());
    }

    #[test]
    fn changed_write_is_visible_to_next_query_only() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_component(e, Position(0));
        world.end_tick();

        let mut first = world.query::<Changed<&mut Position>>();
        assert!(first.is_empty());
        first.for_each(|_, p| p.0 += 1);
        drop(first);

        world.query::<&mut Position>().for_each(|_, p| p.0 += 1);
        assert_eq!(world.query::<Changed<&mut Position>>().ids(), &[e]);
    }

    #[test]
    fn hierarchy_delegates_to_pool() {
        let mut world = EntityWorld::new();
        let root = world.create_entity();
        let child = world.create_child(root);
        let grandchild = world.create_child(child);
        assert_eq!(world.parents(grandchild), vec![child, root]);
        assert!(world.is_parent(grandchild, root));

        world.remove_entity(child);
        assert!(!world.has_parent(grandchild));
        assert!(!world.has_children(root));
    }

    #[test]
    fn inspect_lists_components() {
        let mut world = EntityWorld::new();
        world.register_component_serde::<Name>();
        let e = world.create_entity();
        world.add_component(e, Name("crate".into()));
        world.add_component(e, Position(1));
        let fields = world.inspect_components(e);
        assert_eq!(fields[0], ("Name".to_string(), serde_json::json!("crate")));
        assert_eq!(fields[1], ("Position".to_string(), serde_json::Value::Null));
        assert_eq!(world.component_type_name(0), Some("Name"));
    }

    #[test]
    fn clear_resets_everything() {
        let mut world = EntityWorld::new();
        let e = world.create_entity();
        world.add_component(e, Position(1));
        world.add_tag(e, "t");
        let group = world.create_group::<&Position>(&[]);
        world.clear();
        assert_eq!(world.entity_count(), 0);
        assert!(group.is_empty());
        assert!(world.with_tag("t").is_empty());
        assert!(world.recently_removed::<Position>().is_empty());
    }
}
