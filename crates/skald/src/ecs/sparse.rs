//! # Sparse Sets: Dense Storage Keyed by Entity Index
//!
//! Every per-type structure in the ECS (component values, mutated/removed
//! sets, tag sets, group membership) is a sparse set:
//!
//! ```text
//! sparse: [None, Some(1), None, Some(0)]   ← indexed by EntityId::index
//! dense:  [e3, e1]                         ← packed ids, iteration order
//! values: [v3, v1]                         ← parallel to dense (components only)
//! ```
//!
//! Insert pushes to the back, remove swaps the last element into the hole.
//! Both are O(1); iteration walks `dense` with no gaps.

use std::mem;

use super::entity::EntityId;

/// A set of entity ids with O(1) insert, remove and membership test.
#[derive(Clone, Default, Debug)]
pub struct SparseIdSet {
    sparse: Vec<Option<u32>>,
    dense: Vec<EntityId>,
}

impl SparseIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dense position of `id`, if present (generation included).
    pub fn index_of(&self, id: EntityId) -> Option<usize> {
        let pos = (*self.sparse.get(id.index as usize)?)? as usize;
        (self.dense[pos] == id).then_some(pos)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index_of(id).is_some()
    }

    /// Returns `true` if the id was newly inserted.
    ///
    /// A stale id occupying the same index is replaced in place.
    pub fn insert(&mut self, id: EntityId) -> bool {
        let idx = id.index as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        if let Some(pos) = self.sparse[idx] {
            let slot = &mut self.dense[pos as usize];
            if *slot == id {
                return false;
            }
            *slot = id;
            return true;
        }
        self.sparse[idx] = Some(self.dense.len() as u32);
        self.dense.push(id);
        true
    }

    /// Swap-remove `id`, returning the dense position it occupied.
    pub fn remove(&mut self, id: EntityId) -> Option<usize> {
        let pos = self.index_of(id)?;
        self.dense.swap_remove(pos);
        if let Some(&moved) = self.dense.get(pos) {
            self.sparse[moved.index as usize] = Some(pos as u32);
        }
        self.sparse[id.index as usize] = None;
        Some(pos)
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.dense
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.dense.iter().copied()
    }

    pub fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
    }
}

/// Component values stored densely alongside their [`SparseIdSet`].
pub struct SparseComponentSet<T> {
    ids: SparseIdSet,
    values: Vec<T>,
}

impl<T> SparseComponentSet<T> {
    pub fn new() -> Self {
        Self {
            ids: SparseIdSet::new(),
            values: Vec::new(),
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.ids.index_of(id).map(|pos| &self.values[pos])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.ids.index_of(id).map(|pos| &mut self.values[pos])
    }

    /// Insert or overwrite. Returns the previous value if there was one.
    ///
    /// A value left behind by a stale id at the same index is dropped.
    pub fn insert(&mut self, id: EntityId, value: T) -> Option<T> {
        let occupied = self.ids.sparse.get(id.index as usize).copied().flatten();
        match occupied {
            Some(pos) => {
                let pos = pos as usize;
                let stale = self.ids.dense[pos] != id;
                self.ids.dense[pos] = id;
                let old = mem::replace(&mut self.values[pos], value);
                (!stale).then_some(old)
            }
            None => {
                self.ids.insert(id);
                self.values.push(value);
                None
            }
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let pos = self.ids.remove(id)?;
        Some(self.values.swap_remove(pos))
    }

    pub fn ids(&self) -> &[EntityId] {
        self.ids.as_slice()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.ids.iter().zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.values.clear();
    }
}

impl<T> Default for SparseComponentSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
