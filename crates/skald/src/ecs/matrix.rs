//! # Component Matrix: Who Has What
//!
//! Conceptually a boolean matrix of entities × (component types ∪ tags).
//! Stored sparsely: one [`SparseIdSet`] per component type and per tag.
//!
//! ## Group Maintenance
//!
//! Every registered group is a list of conditions ("has `Position`", "lacks
//! `Hidden`", "tagged `player`"). For each group and each entity the matrix
//! keeps a count of conditions currently satisfied:
//!
//! ```text
//! group (&Position, Not<Hidden>, "player")     required = 3
//!
//! entity 7: has Position ✓  lacks Hidden ✓  tagged ✗   → count 2, not a member
//! add_tag(7, "player")                                  → count 3, member
//! ```
//!
//! A change to one column touches only the groups watching it, adjusting
//! each count by one. Membership is `count == required`, so nothing is ever
//! rescanned. The count is a `u8`: a group may have at most 255 conditions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::entity::EntityId;
use super::registry::ComponentTypeIndex;
use super::sparse::SparseIdSet;

/// What a group condition looks at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConditionKey {
    Component(ComponentTypeIndex),
    Tag(String),
}

/// One group condition: `key` must be present (`required == true`) or
/// absent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Condition {
    pub key: ConditionKey,
    pub required: bool,
}

#[derive(Default)]
struct MembershipState {
    ids: SparseIdSet,
    counts: Vec<u8>,
}

impl MembershipState {
    fn count_mut(&mut self, id: EntityId) -> &mut u8 {
        let idx = id.index as usize;
        if idx >= self.counts.len() {
            self.counts.resize(idx + 1, 0);
        }
        &mut self.counts[idx]
    }
}

/// The incrementally maintained id set of one group.
pub struct GroupMembership {
    conditions: Vec<Condition>,
    required: u8,
    negatives: u8,
    state: RwLock<MembershipState>,
}

impl GroupMembership {
    fn new(conditions: Vec<Condition>) -> Self {
        assert!(
            conditions.len() <= u8::MAX as usize,
            "group has {} conditions, the satisfied-count limit is {}",
            conditions.len(),
            u8::MAX
        );
        let required = conditions.len() as u8;
        let negatives = conditions.iter().filter(|c| !c.required).count() as u8;
        Self {
            conditions,
            required,
            negatives,
            state: RwLock::new(MembershipState::default()),
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.state.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.state.read().ids.contains(id)
    }

    /// Copy of the member ids in iteration order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.state.read().ids.as_slice().to_vec()
    }

    /// Run `f` against the live member set under the read lock.
    pub(crate) fn with_ids<R>(&self, f: impl FnOnce(&SparseIdSet) -> R) -> R {
        f(&self.state.read().ids)
    }

    fn reset(&self, id: EntityId, count: u8) {
        let mut state = self.state.write();
        *state.count_mut(id) = count;
        if count == self.required {
            state.ids.insert(id);
        } else {
            state.ids.remove(id);
        }
    }

    fn evict(&self, id: EntityId) {
        let mut state = self.state.write();
        *state.count_mut(id) = 0;
        state.ids.remove(id);
    }

    fn satisfy(&self, id: EntityId) {
        let mut state = self.state.write();
        let count = state.count_mut(id);
        debug_assert!(*count < self.required, "satisfied-count overflow for {:?}", id);
        *count += 1;
        if *count == self.required {
            state.ids.insert(id);
        }
    }

    fn unsatisfy(&self, id: EntityId) {
        let mut state = self.state.write();
        let count = state.count_mut(id);
        debug_assert!(*count > 0, "satisfied-count underflow for {:?}", id);
        let was_member = *count == self.required;
        *count = count.saturating_sub(1);
        if was_member {
            state.ids.remove(id);
        }
    }

    fn clear(&self) {
        let mut state = self.state.write();
        state.ids.clear();
        state.counts.clear();
    }
}

/// Per-type and per-tag id sets plus the groups that watch them.
pub struct ComponentMatrix {
    components: Vec<SparseIdSet>,
    tags: HashMap<String, SparseIdSet>,
    groups: Vec<Arc<GroupMembership>>,
    component_watchers: Vec<Vec<(usize, bool)>>,
    tag_watchers: HashMap<String, Vec<(usize, bool)>>,
}

impl ComponentMatrix {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            tags: HashMap::new(),
            groups: Vec::new(),
            component_watchers: Vec::new(),
            tag_watchers: HashMap::new(),
        }
    }

    fn ensure_type(&mut self, ty: ComponentTypeIndex) {
        if ty >= self.components.len() {
            self.components.resize_with(ty + 1, SparseIdSet::new);
            self.component_watchers.resize_with(ty + 1, Vec::new);
        }
    }

    // ── Entities ─────────────────────────────────────────────────────

    /// Start tracking a fresh entity with no components and no tags.
    pub fn add_entity(&mut self, id: EntityId) {
        for group in &self.groups {
            group.reset(id, group.negatives);
        }
    }

    /// Stop tracking an entity. Components and tags should already be gone;
    /// leftovers are dropped without notifying groups.
    pub fn remove_entity(&mut self, id: EntityId) {
        for set in &mut self.components {
            set.remove(id);
        }
        for set in self.tags.values_mut() {
            set.remove(id);
        }
        for group in &self.groups {
            group.evict(id);
        }
    }

    // ── Components ───────────────────────────────────────────────────

    pub fn add_component(&mut self, id: EntityId, ty: ComponentTypeIndex) {
        self.ensure_type(ty);
        if self.components[ty].insert(id) {
            notify(&self.groups, &self.component_watchers[ty], id, true);
        }
    }

    pub fn remove_component(&mut self, id: EntityId, ty: ComponentTypeIndex) {
        if ty >= self.components.len() {
            return;
        }
        if self.components[ty].remove(id).is_some() {
            notify(&self.groups, &self.component_watchers[ty], id, false);
        }
    }

    pub fn has_component(&self, id: EntityId, ty: ComponentTypeIndex) -> bool {
        self.components.get(ty).is_some_and(|s| s.contains(id))
    }

    pub fn with_component(&self, ty: ComponentTypeIndex) -> &[EntityId] {
        self.components.get(ty).map(|s| s.as_slice()).unwrap_or(&[])
    }

    // ── Tags ─────────────────────────────────────────────────────────

    /// Returns `true` if the tag was newly added.
    pub fn add_tag(&mut self, id: EntityId, tag: &str) -> bool {
        let added = self.tags.entry(tag.to_string()).or_default().insert(id);
        if added {
            if let Some(watchers) = self.tag_watchers.get(tag) {
                notify(&self.groups, watchers, id, true);
            }
        }
        added
    }

    /// Returns `true` if the entity had the tag.
    pub fn remove_tag(&mut self, id: EntityId, tag: &str) -> bool {
        let Some(set) = self.tags.get_mut(tag) else {
            return false;
        };
        if set.remove(id).is_none() {
            return false;
        }
        if set.is_empty() {
            self.tags.remove(tag);
        }
        if let Some(watchers) = self.tag_watchers.get(tag) {
            notify(&self.groups, watchers, id, false);
        }
        true
    }

    pub fn has_tag(&self, id: EntityId, tag: &str) -> bool {
        self.tags.get(tag).is_some_and(|s| s.contains(id))
    }

    pub fn with_tag(&self, tag: &str) -> &[EntityId] {
        self.tags.get(tag).map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// Every tag carried by `id`, sorted.
    pub fn tags_of(&self, id: EntityId) -> Vec<String> {
        let mut tags: Vec<String> = self
            .tags
            .iter()
            .filter(|(_, set)| set.contains(id))
            .map(|(name, _)| name.clone())
            .collect();
        tags.sort();
        tags
    }

    /// All tag names currently in use, sorted.
    pub fn tag_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tags.keys().cloned().collect();
        names.sort();
        names
    }

    // ── Groups ───────────────────────────────────────────────────────

    /// Subscribe a new group and populate it from the current state.
    pub fn register_group(
        &mut self,
        conditions: Vec<Condition>,
        alive: impl Iterator<Item = EntityId>,
    ) -> Arc<GroupMembership> {
        let group = Arc::new(GroupMembership::new(conditions));
        let slot = self.groups.len();

        for cond in &group.conditions {
            match &cond.key {
                ConditionKey::Component(ty) => {
                    self.ensure_type(*ty);
                    self.component_watchers[*ty].push((slot, cond.required));
                }
                ConditionKey::Tag(name) => {
                    self.tag_watchers
                        .entry(name.clone())
                        .or_default()
                        .push((slot, cond.required));
                }
            }
        }

        for id in alive {
            let count = group
                .conditions
                .iter()
                .filter(|c| self.is_present(id, &c.key) == c.required)
                .count() as u8;
            group.reset(id, count);
        }

        self.groups.push(Arc::clone(&group));
        group
    }

    fn is_present(&self, id: EntityId, key: &ConditionKey) -> bool {
        match key {
            ConditionKey::Component(ty) => self.has_component(id, *ty),
            ConditionKey::Tag(name) => self.has_tag(id, name),
        }
    }

    pub fn groups(&self) -> &[Arc<GroupMembership>] {
        &self.groups
    }

    /// Forget every entity, tag and group member. Groups stay registered.
    pub fn clear(&mut self) {
        for set in &mut self.components {
            set.clear();
        }
        self.tags.clear();
        for group in &self.groups {
            group.clear();
        }
    }
}

impl Default for ComponentMatrix {
    fn default() -> Self {
        Self::new()
    }
}

fn notify(
    groups: &[Arc<GroupMembership>],
    watchers: &[(usize, bool)],
    id: EntityId,
    now_present: bool,
) {
    for &(slot, required) in watchers {
        if required == now_present {
            groups[slot].satisfy(id);
        } else {
            groups[slot].unsatisfy(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::entity::EntityPool;

    fn has(ty: usize) -> Condition {
        Condition {
            key: ConditionKey::Component(ty),
            required: true,
        }
    }

    fn lacks(ty: usize) -> Condition {
        Condition {
            key: ConditionKey::Component(ty),
            required: false,
        }
    }

    fn tagged(name: &str) -> Condition {
        Condition {
            key: ConditionKey::Tag(name.to_string()),
            required: true,
        }
    }

    #[test]
    fn membership_follows_component_changes() {
        let mut pool = EntityPool::new();
        let mut matrix = ComponentMatrix::new();
        let group = matrix.register_group(vec![has(0), has(1)], std::iter::empty());

        let e = pool.create();
        matrix.add_entity(e);
        matrix.add_component(e, 0);
        assert!(!group.contains(e));
        matrix.add_component(e, 1);
        assert!(group.contains(e));
        matrix.remove_component(e, 0);
        assert!(!group.contains(e));
    }

    #[test]
    fn negative_condition_counts_from_entity_creation() {
        let mut pool = EntityPool::new();
        let mut matrix = ComponentMatrix::new();
        let group = matrix.register_group(vec![has(0), lacks(1)], std::iter::empty());

        let e = pool.create();
        matrix.add_entity(e);
        matrix.add_component(e, 0);
        assert!(group.contains(e));
        matrix.add_component(e, 1);
        assert!(!group.contains(e));
        matrix.remove_component(e, 1);
        assert!(group.contains(e));
    }

    #[test]
    fn tags_drive_membership() {
        let mut pool = EntityPool::new();
        let mut matrix = ComponentMatrix::new();
        let group = matrix.register_group(vec![has(0), tagged("player")], std::iter::empty());

        let e = pool.create();
        matrix.add_entity(e);
        matrix.add_component(e, 0);
        assert!(matrix.add_tag(e, "player"));
        assert!(!matrix.add_tag(e, "player"));
        assert!(group.contains(e));
        assert_eq!(matrix.with_tag("player"), &[e]);

        assert!(matrix.remove_tag(e, "player"));
        assert!(!group.contains(e));
        assert!(matrix.with_tag("player").is_empty());
    }

    #[test]
    fn late_group_is_populated_from_existing_entities() {
        let mut pool = EntityPool::new();
        let mut matrix = ComponentMatrix::new();
        let ids: Vec<_> = (0..4).map(|_| pool.create()).collect();
        for (i, &id) in ids.iter().enumerate() {
            matrix.add_entity(id);
            if i % 2 == 0 {
                matrix.add_component(id, 3);
            }
        }

        let group = matrix.register_group(vec![has(3)], pool.ids());
        assert_eq!(group.len(), 2);
        assert!(group.contains(ids[0]) && group.contains(ids[2]));
    }

    #[test]
    fn empty_group_holds_every_entity() {
        let mut pool = EntityPool::new();
        let mut matrix = ComponentMatrix::new();
        let group = matrix.register_group(Vec::new(), std::iter::empty());
        let e = pool.create();
        matrix.add_entity(e);
        assert!(group.contains(e));
        matrix.remove_entity(e);
        assert!(!group.contains(e));
    }

    #[test]
    fn clear_empties_groups() {
        let mut pool = EntityPool::new();
        let mut matrix = ComponentMatrix::new();
        let group = matrix.register_group(vec![has(0)], std::iter::empty());
        let e = pool.create();
        matrix.add_entity(e);
        matrix.add_component(e, 0);
        matrix.add_tag(e, "t");

        matrix.clear();
        assert!(group.is_empty());
        assert!(!matrix.has_component(e, 0));
        assert!(matrix.with_tag("t").is_empty());
    }

    #[test]
    #[should_panic(expected = "satisfied-count limit")]
    fn too_many_conditions_panics() {
        let mut matrix = ComponentMatrix::new();
        let conditions = (0..300).map(has).collect();
        matrix.register_group(conditions, std::iter::empty());
    }
}
