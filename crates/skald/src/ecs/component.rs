//! # Component Containers: Per-Type Sparse Storage
//!
//! Each component type gets exactly one [`ComponentContainer<T>`] holding a
//! [`SparseComponentSet<T>`] plus two tracking sets:
//!
//! ```text
//! ComponentContainer<Position>
//!   components: Arc<RwLock<SparseComponentSet<Position>>>   ← values
//!   mutated:    Arc<Mutex<SparseIdSet>>                      ← written since end_tick
//!   removed:    Mutex<SparseIdSet>                           ← removed since end_tick
//! ```
//!
//! ## Locking
//!
//! The value store and the mutated set have separate locks. A
//! [`Query`](super::group::Query) takes owned (`Arc`) guards on both and
//! keeps them for its whole lifetime, so the world can't restructure a
//! container while someone iterates it. World-side operations use `try_*`
//! and panic with a clear message instead of deadlocking on the same thread.
//!
//! Queries block instead. A group visits its types in ascending
//! [`ComponentTypeIndex`], taking the mutated set before the values of each
//! type, so two queries over overlapping types always lock in the same
//! order. Readers share; a writer waits for every other query on its type.
//! Two overlapping queries held by the *same* thread never finish waiting,
//! so drop one before building the next.
//!
//! ## Raw Access
//!
//! [`ComponentContainer::try_get_mut`] writes without marking anything.
//! Only the group query path records mutations; raw access is for trusted
//! callers such as deserialization and handle bookkeeping.

use std::any::{Any, type_name};
use std::sync::Arc;

use parking_lot::lock_api::{ArcMutexGuard, ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RawMutex, RawRwLock, RwLock,
    RwLockReadGuard, RwLockWriteGuard,
};

use super::entity::EntityId;
use super::registry::ComponentTypeIndex;
use super::sparse::{SparseComponentSet, SparseIdSet};

/// Anything that can be stored as a component.
///
/// Opt in with an empty impl:
///
/// ```
/// struct Position(f32);
/// impl skald::ecs::Component for Position {}
/// ```
///
/// There is no blanket impl, so references and the query markers
/// ([`Not`](super::Not), [`Removed`](super::Removed),
/// [`Changed`](super::Changed)) are never components themselves.
pub trait Component: Send + Sync + 'static {}

/// Shared borrow of a single component, released on drop.
pub type ComponentRef<'a, T> = MappedRwLockReadGuard<'a, T>;
/// Exclusive borrow of a single component, released on drop.
pub type ComponentMut<'a, T> = MappedRwLockWriteGuard<'a, T>;

pub(crate) type ReadFetch<T> = ArcRwLockReadGuard<RawRwLock, SparseComponentSet<T>>;
pub(crate) type WriteFetch<T> = ArcRwLockWriteGuard<RawRwLock, SparseComponentSet<T>>;
pub(crate) type MutatedGuard = ArcMutexGuard<RawMutex, SparseIdSet>;

/// Storage for every instance of one component type.
pub struct ComponentContainer<T> {
    type_index: ComponentTypeIndex,
    type_name: &'static str,
    components: Arc<RwLock<SparseComponentSet<T>>>,
    mutated: Arc<Mutex<SparseIdSet>>,
    removed: Mutex<SparseIdSet>,
}

impl<T: Component> ComponentContainer<T> {
    pub(crate) fn new(type_index: ComponentTypeIndex, type_name: &'static str) -> Self {
        Self {
            type_index,
            type_name,
            components: Arc::new(RwLock::new(SparseComponentSet::new())),
            mutated: Arc::new(Mutex::new(SparseIdSet::new())),
            removed: Mutex::new(SparseIdSet::new()),
        }
    }

    pub fn type_index(&self) -> ComponentTypeIndex {
        self.type_index
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SparseComponentSet<T>> {
        self.components.try_read().unwrap_or_else(|| {
            panic!(
                "component `{}` is mutably borrowed by a live query",
                self.type_name
            )
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, SparseComponentSet<T>> {
        self.components.try_write().unwrap_or_else(|| {
            panic!("component `{}` is borrowed by a live query", self.type_name)
        })
    }

    fn mutated(&self) -> parking_lot::MutexGuard<'_, SparseIdSet> {
        self.mutated.try_lock().unwrap_or_else(|| {
            panic!(
                "mutated set of `{}` is held by a live query",
                self.type_name
            )
        })
    }

    // ── Point access ─────────────────────────────────────────────────

    pub fn contains(&self, id: EntityId) -> bool {
        self.read().contains(id)
    }

    pub fn try_get(&self, id: EntityId) -> Option<ComponentRef<'_, T>> {
        RwLockReadGuard::try_map(self.read(), |s| s.get(id)).ok()
    }

    /// Raw mutable access. Does not mark the entity as mutated.
    pub fn try_get_mut(&self, id: EntityId) -> Option<ComponentMut<'_, T>> {
        RwLockWriteGuard::try_map(self.write(), |s| s.get_mut(id)).ok()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.read().ids().to_vec()
    }

    // ── Structural changes (driven by EntityWorld) ───────────────────

    /// Insert or replace, marking the entity mutated. Returns `true` if the
    /// entity didn't have the component before.
    pub(crate) fn insert(&self, id: EntityId, value: T) -> bool {
        let added = self.write().insert(id, value).is_none();
        self.mutated().insert(id);
        self.removed.lock().remove(id);
        added
    }

    /// Insert `make()` only if absent, marking the entity mutated either way.
    pub(crate) fn get_or_insert_with(&self, id: EntityId, make: impl FnOnce() -> T) -> bool {
        let added = {
            let mut set = self.write();
            if set.contains(id) {
                false
            } else {
                set.insert(id, make());
                true
            }
        };
        self.mutated().insert(id);
        if added {
            self.removed.lock().remove(id);
        }
        added
    }

    /// Insert without touching the tracking sets (deserialization path).
    pub(crate) fn insert_untracked(&self, id: EntityId, value: T) -> bool {
        self.write().insert(id, value).is_none()
    }

    pub(crate) fn take(&self, id: EntityId) -> Option<T> {
        let value = self.write().remove(id)?;
        self.mutated().remove(id);
        self.removed.lock().insert(id);
        Some(value)
    }

    // ── Query support ────────────────────────────────────────────────

    /// Blocks until no query holds the values mutably.
    pub(crate) fn read_arc(&self) -> ReadFetch<T> {
        self.components.read_arc()
    }

    /// Blocks until no other query holds the values.
    pub(crate) fn write_arc(&self) -> WriteFetch<T> {
        self.components.write_arc()
    }
}

/// Value guards taken by a group before its typed fetch is assembled.
///
/// The group locks in type-index order and parks each guard here; every
/// query parameter then claims its own by index.
#[derive(Default)]
pub struct QueryLocks {
    guards: Vec<(ComponentTypeIndex, Box<dyn Any>)>,
}

impl QueryLocks {
    pub(crate) fn push(&mut self, type_index: ComponentTypeIndex, guard: Box<dyn Any>) {
        self.guards.push((type_index, guard));
    }

    /// Claim the guard parked for `type_index`.
    ///
    /// # Panics
    ///
    /// Panics if no guard of type `G` was parked for that index.
    pub(crate) fn take<G: 'static>(&mut self, type_index: ComponentTypeIndex) -> G {
        let pos = self
            .guards
            .iter()
            .position(|(index, _)| *index == type_index)
            .unwrap_or_else(|| panic!("no value lock taken for component type {type_index}"));
        let (_, guard) = self.guards.swap_remove(pos);
        match guard.downcast::<G>() {
            Ok(guard) => *guard,
            Err(_) => panic!("value lock for component type {type_index} has the wrong access"),
        }
    }
}

/// Type-erased view of a [`ComponentContainer<T>`], used wherever the world
/// handles "some component type" by index.
pub trait ComponentContainerBase: Any + Send + Sync {
    fn type_index(&self) -> ComponentTypeIndex;
    fn type_name(&self) -> &'static str;
    fn contains(&self, id: EntityId) -> bool;
    fn len(&self) -> usize;
    fn ids(&self) -> Vec<EntityId>;
    /// Remove the entity's component, recording it in the removed set.
    fn remove(&self, id: EntityId) -> bool;
    /// Drop every value and both tracking sets.
    fn clear(&self);

    fn mark_mutated(&self, ids: &[EntityId]);
    fn mark_all_mutated(&self);
    fn recently_mutated(&self) -> Vec<EntityId>;
    fn recently_removed(&self) -> Vec<EntityId>;
    fn mutated_count(&self) -> usize;
    fn removed_count(&self) -> usize;
    fn mutated_snapshot(&self) -> SparseIdSet;
    fn removed_snapshot(&self) -> SparseIdSet;
    /// Blocking, owned lock on the mutated set (held by queries).
    fn lock_mutated(&self) -> MutatedGuard;
    /// Blocking, owned lock on the values: a boxed [`WriteFetch`] when
    /// `write`, else a boxed [`ReadFetch`].
    fn lock_values(&self, write: bool) -> Box<dyn Any>;
    fn clear_tracking(&self);

    fn as_any(&self) -> &dyn Any;
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Component> ComponentContainerBase for ComponentContainer<T> {
    fn type_index(&self) -> ComponentTypeIndex {
        self.type_index
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn contains(&self, id: EntityId) -> bool {
        ComponentContainer::contains(self, id)
    }

    fn len(&self) -> usize {
        ComponentContainer::len(self)
    }

    fn ids(&self) -> Vec<EntityId> {
        ComponentContainer::ids(self)
    }

    fn remove(&self, id: EntityId) -> bool {
        self.take(id).is_some()
    }

    fn clear(&self) {
        self.write().clear();
        self.mutated().clear();
        self.removed.lock().clear();
    }

    fn mark_mutated(&self, ids: &[EntityId]) {
        let set = self.read();
        let mut mutated = self.mutated();
        for &id in ids {
            if set.contains(id) {
                mutated.insert(id);
            }
        }
    }

    fn mark_all_mutated(&self) {
        let set = self.read();
        let mut mutated = self.mutated();
        for &id in set.ids() {
            mutated.insert(id);
        }
    }

    fn recently_mutated(&self) -> Vec<EntityId> {
        self.mutated().as_slice().to_vec()
    }

    fn recently_removed(&self) -> Vec<EntityId> {
        self.removed.lock().as_slice().to_vec()
    }

    fn mutated_count(&self) -> usize {
        self.mutated().len()
    }

    fn removed_count(&self) -> usize {
        self.removed.lock().len()
    }

    fn mutated_snapshot(&self) -> SparseIdSet {
        self.mutated.lock().clone()
    }

    fn removed_snapshot(&self) -> SparseIdSet {
        self.removed.lock().clone()
    }

    fn lock_mutated(&self) -> MutatedGuard {
        self.mutated.lock_arc()
    }

    fn lock_values(&self, write: bool) -> Box<dyn Any> {
        if write {
            Box::new(self.write_arc())
        } else {
            Box::new(self.read_arc())
        }
    }

    fn clear_tracking(&self) {
        self.mutated().clear();
        self.removed.lock().clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Recover the typed container behind a type-erased one.
///
/// # Panics
///
/// Panics if `container` does not store `T`.
pub(crate) fn downcast<T: Component>(container: &dyn ComponentContainerBase) -> &ComponentContainer<T> {
    container
        .as_any()
        .downcast_ref::<ComponentContainer<T>>()
        .unwrap_or_else(|| {
            panic!(
                "container `{}` does not store `{}`",
                container.type_name(),
                type_name::<T>()
            )
        })
}

/// Owned variant of [`downcast`].
pub(crate) fn downcast_arc<T: Component>(
    container: &Arc<dyn ComponentContainerBase>,
) -> Arc<ComponentContainer<T>> {
    let name = container.type_name();
    Arc::clone(container)
        .as_any_arc()
        .downcast::<ComponentContainer<T>>()
        .unwrap_or_else(|_| panic!("container `{}` does not store `{}`", name, type_name::<T>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::entity::EntityPool;

    #[derive(Debug, PartialEq, Default)]
    struct Health(u32);

    impl Component for Health {}

    fn container() -> ComponentContainer<Health> {
        ComponentContainer::new(0, "Health")
    }

    #[test]
    fn insert_marks_mutated_and_reports_addition() {
        let mut pool = EntityPool::new();
        let e = pool.create();
        let c = container();

        assert!(c.insert(e, Health(10)));
        assert!(!c.insert(e, Health(20)));
        assert_eq!(*c.try_get(e).unwrap(), Health(20));
        assert_eq!(c.recently_mutated(), vec![e]);
    }

    #[test]
    fn raw_mutation_is_not_tracked() {
        let mut pool = EntityPool::new();
        let e = pool.create();
        let c = container();
        c.insert_untracked(e, Health(1));

        c.try_get_mut(e).unwrap().0 = 5;
        assert_eq!(c.try_get(e).unwrap().0, 5);
        assert!(c.recently_mutated().is_empty());
    }

    #[test]
    fn take_moves_entity_to_removed_set() {
        let mut pool = EntityPool::new();
        let e = pool.create();
        let c = container();
        c.insert(e, Health(3));

        assert_eq!(c.take(e), Some(Health(3)));
        assert!(c.try_get(e).is_none());
        assert!(c.recently_mutated().is_empty());
        assert_eq!(c.recently_removed(), vec![e]);

        c.insert(e, Health(4));
        assert!(c.recently_removed().is_empty());
    }

    #[test]
    fn get_or_insert_keeps_existing_value() {
        let mut pool = EntityPool::new();
        let e = pool.create();
        let c = container();
        assert!(c.get_or_insert_with(e, Health::default));
        c.try_get_mut(e).unwrap().0 = 9;
        assert!(!c.get_or_insert_with(e, Health::default));
        assert_eq!(c.try_get(e).unwrap().0, 9);
    }

    #[test]
    #[should_panic(expected = "is borrowed by a live query")]
    fn structural_change_during_read_panics() {
        let mut pool = EntityPool::new();
        let e = pool.create();
        let c = container();
        c.insert(e, Health(1));
        let _guard = c.read_arc();
        c.take(e);
    }

    #[test]
    fn parked_locks_are_claimed_by_index() {
        let mut pool = EntityPool::new();
        let e = pool.create();
        let c = container();
        c.insert(e, Health(7));

        let mut locks = QueryLocks::default();
        locks.push(c.type_index(), c.lock_values(false));
        let fetch: ReadFetch<Health> = locks.take(c.type_index());
        assert_eq!(fetch.get(e), Some(&Health(7)));
        assert!(locks.guards.is_empty());
    }

    #[test]
    #[should_panic(expected = "has the wrong access")]
    fn claiming_a_read_lock_as_write_panics() {
        let c = container();
        let mut locks = QueryLocks::default();
        locks.push(c.type_index(), c.lock_values(false));
        let _fetch: WriteFetch<Health> = locks.take(c.type_index());
    }

    #[test]
    fn downcast_round_trip() {
        let erased: Arc<dyn ComponentContainerBase> = Arc::new(container());
        let typed = downcast_arc::<Health>(&erased);
        assert_eq!(typed.type_index(), 0);
        assert_eq!(downcast::<Health>(&*erased).type_index(), 0);
    }
}
