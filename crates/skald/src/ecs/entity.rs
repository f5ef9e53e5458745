//! # Entity: Identifiers and the Entity Pool
//!
//! An [`EntityId`] is just a number pair. It doesn't "contain" anything; the
//! [`EntityWorld`](super::world::EntityWorld) maps ids to components and
//! tags. The [`EntityPool`] hands ids out, takes them back, and keeps the
//! parent/child hierarchy.
//!
//! ## Generational Indices
//!
//! Indices are recycled, so each slot carries a generation that is bumped
//! every time the slot is freed. A stale id still holds the old generation
//! and fails [`EntityPool::exists`].
//!
//! ```text
//! EntityId { index: 5, generation: 0 }  ← original
//! EntityId { index: 5, generation: 1 }  ← after recycle
//! ```
//!
//! A slot whose generation has reached `u32::MAX` is retired when freed
//! instead of wrapping back to 0, so an old id can never come back to life.
//! Retired slots stay dead and are never handed out again.
//!
//! ## Free List Policy
//!
//! Freed indices go into a min-heap, so `create()` always reuses the lowest
//! free index first. Every freed index is eventually handed out again before
//! the pool grows past it, which keeps reuse starvation-free and the sparse
//! arrays in the component containers dense.
//!
//! ```text
//! slots: [g0 alive, g1 free, g0 alive, g2 free]
//! free:  {1, 3}      ← create() pops 1, then 3, then grows to 4
//! ```
//!
//! ## Hierarchy
//!
//! Parent links live here instead of in a component, so hierarchy queries
//! work on any entity. The pool keeps both directions (parent per index and
//! a children list per index) so `children()` doesn't need a scan.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::StateError;

/// A lightweight handle to an entity in an
/// [`EntityWorld`](super::world::EntityWorld).
///
/// Only valid for the world that created it, and only while its generation
/// matches the pool slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl EntityId {
    /// Returns the raw slot index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation of the slot when this id was handed out.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Allocates and recycles [`EntityId`]s and stores the entity hierarchy.
pub struct EntityPool {
    slots: Vec<Slot>,
    free: BinaryHeap<Reverse<u32>>,
    parents: Vec<Option<EntityId>>,
    children: Vec<Vec<EntityId>>,
    alive: usize,
}

impl EntityPool {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BinaryHeap::new(),
            parents: Vec::new(),
            children: Vec::new(),
            alive: 0,
        }
    }

    /// Allocate an id, reusing the lowest free index if there is one.
    pub fn create(&mut self) -> EntityId {
        self.alive += 1;
        if let Some(Reverse(index)) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(!slot.alive, "free list holds live slot {index}");
            slot.alive = true;
            return EntityId {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
            panic!("EntityPool exhausted: more than {} slots", u32::MAX)
        });
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        self.parents.push(None);
        self.children.push(Vec::new());
        EntityId {
            index,
            generation: 0,
        }
    }

    /// Invalidate `id` and return its index to the free list.
    ///
    /// The entity is detached from its parent and its children become roots.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not alive.
    pub fn recycle(&mut self, id: EntityId) {
        assert!(self.exists(id), "recycle of dead entity {:?}", id);

        self.detach(id);
        let orphans = std::mem::take(&mut self.children[id.index as usize]);
        for child in orphans {
            self.parents[child.index as usize] = None;
        }

        let slot = &mut self.slots[id.index as usize];
        slot.alive = false;
        self.alive -= 1;
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.push(Reverse(id.index));
            }
            None => log::warn!("entity slot {} exhausted its generations, retired", id.index),
        }
    }

    /// O(1) liveness check, generation included.
    pub fn exists(&self, id: EntityId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|s| s.alive && s.generation == id.generation)
    }

    /// The live id currently occupying `index`, if any.
    pub fn id_from_index(&self, index: u32) -> Option<EntityId> {
        let slot = self.slots.get(index as usize)?;
        slot.alive.then_some(EntityId {
            index,
            generation: slot.generation,
        })
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.alive
    }

    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Total number of slots ever allocated.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of recycled slots waiting for reuse.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of slots retired after exhausting their generations.
    pub fn retired_count(&self) -> usize {
        self.slots.len() - self.alive - self.free.len()
    }

    /// Iterate over every live id in index order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.alive.then_some(EntityId {
                index: i as u32,
                generation: s.generation,
            })
        })
    }

    // ── Hierarchy ────────────────────────────────────────────────────

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        debug_assert!(self.exists(id), "parent of dead entity {:?}", id);
        self.parents[id.index as usize]
    }

    pub fn has_parent(&self, id: EntityId) -> bool {
        self.parent(id).is_some()
    }

    pub fn children(&self, id: EntityId) -> &[EntityId] {
        debug_assert!(self.exists(id), "children of dead entity {:?}", id);
        &self.children[id.index as usize]
    }

    pub fn has_children(&self, id: EntityId) -> bool {
        !self.children(id).is_empty()
    }

    /// Ancestor chain, nearest parent first.
    pub fn parents(&self, id: EntityId) -> Vec<EntityId> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            chain.push(p);
            current = self.parents[p.index as usize];
        }
        chain
    }

    /// True if `ancestor` appears anywhere in the parent chain of `id`.
    pub fn is_parent(&self, id: EntityId, ancestor: EntityId) -> bool {
        let mut current = self.parent(id);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parents[p.index as usize];
        }
        false
    }

    /// Re-parent `id`, or make it a root with `None`.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if either id is dead or if the link would
    /// create a cycle.
    pub fn set_parent(&mut self, id: EntityId, parent: Option<EntityId>) {
        debug_assert!(self.exists(id), "set_parent on dead entity {:?}", id);
        if let Some(p) = parent {
            debug_assert!(self.exists(p), "set_parent to dead parent {:?}", p);
            debug_assert!(
                p != id && !self.is_parent(p, id),
                "set_parent({:?}, {:?}) would create a cycle",
                id,
                p
            );
        }

        self.detach(id);
        self.parents[id.index as usize] = parent;
        if let Some(p) = parent {
            self.children[p.index as usize].push(id);
        }
    }

    fn detach(&mut self, id: EntityId) {
        if let Some(old) = self.parents[id.index as usize].take() {
            self.children[old.index as usize].retain(|&c| c != id);
        }
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Snapshot of slots, free list and parent links.
    pub fn state(&self) -> EntityPoolState {
        let mut free: Vec<u32> = self.free.iter().map(|Reverse(i)| *i).collect();
        free.sort_unstable();
        let parents = self
            .ids()
            .filter_map(|id| self.parents[id.index as usize].map(|p| (id, p)))
            .collect();
        EntityPoolState {
            slots: self.slots.iter().map(|s| (s.generation, s.alive)).collect(),
            free,
            parents,
        }
    }

    /// Rebuild a pool from a snapshot, rejecting inconsistent input.
    pub fn from_state(state: EntityPoolState) -> Result<Self, StateError> {
        let mut pool = EntityPool::new();
        pool.slots = state
            .slots
            .iter()
            .map(|&(generation, alive)| Slot { generation, alive })
            .collect();
        pool.parents = vec![None; pool.slots.len()];
        pool.children = vec![Vec::new(); pool.slots.len()];
        pool.alive = pool.slots.iter().filter(|s| s.alive).count();

        let mut seen = vec![false; pool.slots.len()];
        for &index in &state.free {
            let Some(slot) = pool.slots.get(index as usize) else {
                return Err(StateError::Invalid(format!(
                    "free index {index} out of range"
                )));
            };
            if slot.alive {
                return Err(StateError::Invalid(format!(
                    "free index {index} refers to a live slot"
                )));
            }
            if std::mem::replace(&mut seen[index as usize], true) {
                return Err(StateError::Invalid(format!(
                    "free index {index} listed twice"
                )));
            }
            pool.free.push(Reverse(index));
        }
        let unlisted = pool
            .slots
            .iter()
            .zip(&seen)
            .any(|(slot, &free)| !slot.alive && !free && slot.generation != u32::MAX);
        if unlisted {
            return Err(StateError::Invalid(
                "dead slots missing from the free list".into(),
            ));
        }

        for (child, parent) in state.parents {
            if !pool.exists(child) || !pool.exists(parent) {
                return Err(StateError::Invalid(format!(
                    "parent link {child} -> {parent} names a dead entity"
                )));
            }
            if pool.parents[child.index as usize].is_some() {
                return Err(StateError::Invalid(format!(
                    "entity {child} has two parents"
                )));
            }
            if child == parent || pool.is_parent(parent, child) {
                return Err(StateError::Invalid(format!(
                    "parent link {child} -> {parent} forms a cycle"
                )));
            }
            pool.set_parent(child, Some(parent));
        }

        Ok(pool)
    }
}

impl Default for EntityPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form of an [`EntityPool`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPoolState {
    /// `(generation, alive)` per slot.
    pub slots: Vec<(u32, bool)>,
    pub free: Vec<u32>,
    /// `(child, parent)` pairs.
    pub parents: Vec<(EntityId, EntityId)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sequential() {
        let mut pool = EntityPool::new();
        let e0 = pool.create();
        let e1 = pool.create();
        assert_eq!(e0.index, 0);
        assert_eq!(e1.index, 1);
        assert_eq!(e0.generation, 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn recycle_bumps_generation() {
        let mut pool = EntityPool::new();
        let e0 = pool.create();
        pool.recycle(e0);
        let reused = pool.create();
        assert_eq!(reused.index, 0);
        assert_eq!(reused.generation, 1);
        assert!(!pool.exists(e0));
        assert!(pool.exists(reused));
    }

    #[test]
    fn reuses_lowest_free_index_first() {
        let mut pool = EntityPool::new();
        let ids: Vec<_> = (0..5).map(|_| pool.create()).collect();
        pool.recycle(ids[3]);
        pool.recycle(ids[1]);
        pool.recycle(ids[4]);
        assert_eq!(pool.create().index, 1);
        assert_eq!(pool.create().index, 3);
        assert_eq!(pool.create().index, 4);
        assert_eq!(pool.create().index, 5);
    }

    #[test]
    fn exists_tracks_most_recent_create() {
        let mut pool = EntityPool::new();
        let mut live = Vec::new();
        let mut dead = Vec::new();
        for round in 0..10 {
            for _ in 0..7 {
                live.push(pool.create());
            }
            // Free every third live entity.
            let mut i = round % 3;
            while i < live.len() {
                let id = live.remove(i);
                pool.recycle(id);
                dead.push(id);
                i += 2;
            }
        }
        assert!(live.iter().all(|&id| pool.exists(id)));
        assert!(dead.iter().all(|&id| !pool.exists(id)));
        assert_eq!(pool.len(), live.len());
    }

    #[test]
    #[should_panic(expected = "recycle of dead entity")]
    fn double_recycle_panics() {
        let mut pool = EntityPool::new();
        let e0 = pool.create();
        pool.recycle(e0);
        pool.recycle(e0);
    }

    #[test]
    fn hierarchy_links_both_ways() {
        let mut pool = EntityPool::new();
        let root = pool.create();
        let mid = pool.create();
        let leaf = pool.create();
        pool.set_parent(mid, Some(root));
        pool.set_parent(leaf, Some(mid));

        assert_eq!(pool.parent(leaf), Some(mid));
        assert_eq!(pool.children(root), &[mid]);
        assert_eq!(pool.parents(leaf), vec![mid, root]);
        assert!(pool.is_parent(leaf, root));
        assert!(!pool.is_parent(root, leaf));

        pool.set_parent(leaf, None);
        assert!(!pool.has_children(mid));
        assert!(!pool.has_parent(leaf));
    }

    #[test]
    fn recycle_orphans_children() {
        let mut pool = EntityPool::new();
        let parent = pool.create();
        let child = pool.create();
        pool.set_parent(child, Some(parent));
        pool.recycle(parent);
        assert!(!pool.has_parent(child));
    }

    #[test]
    #[should_panic(expected = "would create a cycle")]
    fn cycle_rejected() {
        let mut pool = EntityPool::new();
        let a = pool.create();
        let b = pool.create();
        pool.set_parent(b, Some(a));
        pool.set_parent(a, Some(b));
    }

    #[test]
    fn state_round_trip() {
        let mut pool = EntityPool::new();
        let a = pool.create();
        let b = pool.create();
        let c = pool.create();
        pool.set_parent(c, Some(a));
        pool.recycle(b);

        let restored = EntityPool::from_state(pool.state()).unwrap();
        assert!(restored.exists(a));
        assert!(!restored.exists(b));
        assert_eq!(restored.parent(c), Some(a));
        assert_eq!(restored.free_count(), 1);
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn exhausted_slot_is_retired_not_wrapped() {
        let mut pool = EntityPool::new();
        let first = pool.create();
        pool.slots[first.index as usize].generation = u32::MAX;
        let last = EntityId {
            index: first.index,
            generation: u32::MAX,
        };

        pool.recycle(last);
        assert!(!pool.exists(last));
        assert!(!pool.exists(first));
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.retired_count(), 1);

        let next = pool.create();
        assert_eq!(next.index, 1);
        assert!(pool.id_from_index(first.index).is_none());

        let restored = EntityPool::from_state(pool.state()).unwrap();
        assert_eq!(restored.retired_count(), 1);
        assert!(restored.exists(next));
        assert!(!restored.exists(last));
    }

    #[test]
    fn state_with_unlisted_dead_slot_is_invalid() {
        let state = EntityPoolState {
            slots: vec![(3, false)],
            free: Vec::new(),
            parents: Vec::new(),
        };
        assert!(matches!(
            EntityPool::from_state(state),
            Err(StateError::Invalid(_))
        ));
    }

    #[test]
    fn state_with_live_free_slot_is_invalid() {
        let state = EntityPoolState {
            slots: vec![(0, true)],
            free: vec![0],
            parents: Vec::new(),
        };
        assert!(matches!(
            EntityPool::from_state(state),
            Err(StateError::Invalid(_))
        ));
    }
}
