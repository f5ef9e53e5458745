//! # Entity Groups & Queries
//!
//! An [`EntityGroup<P>`] is a live, incrementally maintained set of entities
//! matching the signature `P` plus an optional tag filter. Membership comes
//! from the [`ComponentMatrix`](super::matrix::ComponentMatrix) and is never
//! recomputed from scratch.
//!
//! A [`Query<P>`] is one pass over a group:
//!
//! ```text
//! group.query()
//!   1. walk the terms in ascending type index, per type:
//!        &mut T       lock its mutated set, then its values (write)
//!        &T           lock its values (read)
//!        Changed<&T>  snapshot its mutated set first
//!        Removed<T>   snapshot its removed set
//!   2. hand each parameter its value guard
//!   3. intersect membership with Changed/Removed sets, smallest first
//!   4. mark the result ids mutated for every &mut T
//!   5. hand out items until the query drops
//! ```
//!
//! Every lock in step 1 blocks, and the fixed order means queries on
//! different threads wait for each other instead of deadlocking.
//!
//! Step 4 happens up front: every entity a query *could* hand out as
//! `&mut T` counts as mutated, whether or not the closure writes to it.

use std::sync::Arc;

use super::component::{MutatedGuard, QueryLocks};
use super::entity::EntityId;
use super::filter::{FilterKind, FilterTerm, GroupParam, ReadOnlyGroupParam};
use super::matrix::GroupMembership;
use super::sparse::SparseIdSet;

/// A memoized, incrementally maintained set of matching entities.
pub struct EntityGroup<P: GroupParam> {
    containers: P::Containers,
    terms: Vec<FilterTerm>,
    tags: Vec<String>,
    membership: Arc<GroupMembership>,
}

impl<P: GroupParam> EntityGroup<P> {
    pub(crate) fn new(
        containers: P::Containers,
        terms: Vec<FilterTerm>,
        tags: Vec<String>,
        membership: Arc<GroupMembership>,
    ) -> Self {
        Self {
            containers,
            terms,
            tags,
            membership,
        }
    }

    /// Number of entities that satisfy the structural conditions. Changed
    /// and Removed filters are applied per query, not here.
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.membership.contains(id)
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.membership.ids()
    }

    pub fn terms(&self) -> &[FilterTerm] {
        &self.terms
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn membership(&self) -> &Arc<GroupMembership> {
        &self.membership
    }

    /// Query every matching entity.
    pub fn query(&self) -> Query<P> {
        self.build_query(None)
    }

    /// Query the given ids, in the given order, skipping those that don't
    /// match. Only returned ids are marked mutated.
    pub fn query_subset(&self, ids: &[EntityId]) -> Query<P> {
        self.build_query(Some(ids))
    }

    fn build_query(&self, subset: Option<&[EntityId]>) -> Query<P> {
        let mut order: Vec<&FilterTerm> = self.terms.iter().collect();
        order.sort_by_key(|t| t.type_index);

        // Changed sets of types we hold are read through the guard,
        // everything else is snapshotted.
        let mut locks = QueryLocks::default();
        let mut held: Vec<MutatedGuard> = Vec::new();
        let mut snapshots: Vec<SparseIdSet> = Vec::new();
        let mut sources: Vec<FilterSource> = Vec::new();
        for term in order {
            match term.kind {
                FilterKind::Write | FilterKind::ChangedWrite => {
                    if term.kind.is_changed() {
                        sources.push(FilterSource::Held(held.len()));
                    }
                    held.push(term.container.lock_mutated());
                }
                FilterKind::Changed => {
                    sources.push(FilterSource::Snapshot(snapshots.len()));
                    snapshots.push(term.container.mutated_snapshot());
                }
                FilterKind::Removed => {
                    sources.push(FilterSource::Snapshot(snapshots.len()));
                    snapshots.push(term.container.removed_snapshot());
                }
                FilterKind::Read | FilterKind::Not => {}
            }
            if let Some(write) = term.kind.value_access() {
                locks.push(term.type_index, term.container.lock_values(write));
            }
        }
        let fetch = P::acquire(&self.containers, &mut locks);

        let ids = {
            let filters: Vec<&SparseIdSet> = sources
                .iter()
                .map(|source| match *source {
                    FilterSource::Held(slot) => &*held[slot],
                    FilterSource::Snapshot(slot) => &snapshots[slot],
                })
                .collect();
            self.membership
                .with_ids(|members| select_ids(members, &filters, subset))
        };

        for mutated in &mut held {
            for &id in &ids {
                mutated.insert(id);
            }
        }

        let mut lookup = SparseIdSet::new();
        for &id in &ids {
            lookup.insert(id);
        }

        Query {
            ids,
            lookup,
            fetch,
            _mutated: held,
        }
    }
}

enum FilterSource {
    Held(usize),
    Snapshot(usize),
}

fn select_ids(
    members: &SparseIdSet,
    filters: &[&SparseIdSet],
    subset: Option<&[EntityId]>,
) -> Vec<EntityId> {
    let mut sets: Vec<&SparseIdSet> = Vec::with_capacity(filters.len() + 1);
    sets.push(members);
    sets.extend_from_slice(filters);
    sets.sort_by_key(|s| s.len());

    match subset {
        Some(ids) => ids
            .iter()
            .copied()
            .filter(|&id| sets.iter().all(|s| s.contains(id)))
            .collect(),
        None => match sets.split_first() {
            Some((smallest, rest)) => smallest
                .iter()
                .filter(|&id| rest.iter().all(|s| s.contains(id)))
                .collect(),
            None => Vec::new(),
        },
    }
}

/// One pass over a group. Holds its locks until dropped.
pub struct Query<P: GroupParam> {
    ids: Vec<EntityId>,
    lookup: SparseIdSet,
    fetch: P::Fetch,
    _mutated: Vec<MutatedGuard>,
}

impl<P: GroupParam> Query<P> {
    /// Matching ids, in iteration order.
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Visit every matching entity with its items.
    pub fn for_each(&mut self, mut f: impl FnMut(EntityId, P::Item<'_>)) {
        for &id in &self.ids {
            f(id, P::fetch(&mut self.fetch, id));
        }
    }

    /// Items of one matching entity, or `None` if it isn't part of this query.
    pub fn get(&mut self, id: EntityId) -> Option<P::Item<'_>> {
        if self.lookup.contains(id) {
            Some(P::fetch(&mut self.fetch, id))
        } else {
            None
        }
    }
}

impl<P: ReadOnlyGroupParam> Query<P> {
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, P::Item<'_>)> + '_ {
        self.ids
            .iter()
            .map(move |&id| (id, P::fetch_ref(&self.fetch, id)))
    }

    /// Visit every matching entity on the rayon thread pool.
    #[cfg(feature = "parallel")]
    pub fn par_for_each<F>(&self, f: F)
    where
        P::Fetch: Sync,
        F: for<'a> Fn(EntityId, P::Item<'a>) + Send + Sync,
    {
        use rayon::prelude::*;

        let fetch = &self.fetch;
        self.ids
            .par_iter()
            .for_each(|&id| f(id, P::fetch_ref(fetch, id)));
    }
}
