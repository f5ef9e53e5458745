//! # Group Parameters: The Filter Algebra
//!
//! A group signature is a tuple of parameters. Each parameter names one
//! component type and says what the group does with it:
//!
//! | Parameter            | [`FilterKind`]   | Membership       | Item per entity |
//! |----------------------|------------------|------------------|-----------------|
//! | `&T`                 | `Read`           | has `T`          | `&T`            |
//! | `&mut T`             | `Write`          | has `T`          | `&mut T`        |
//! | `Changed<&T>`        | `Changed`        | has `T`          | `&T`            |
//! | `Changed<&mut T>`    | `ChangedWrite`   | has `T`          | `&mut T`        |
//! | `Not<T>`             | `Not`            | lacks `T`        | `()`            |
//! | `Removed<T>`         | `Removed`        | none             | `()`            |
//!
//! `Changed<_>` only accepts `&T` and `&mut T` (sealed), and `Not`/`Removed`
//! take a bare [`Component`]. Components are opt-in, and neither references
//! nor the markers themselves implement it, so contradictions are rejected
//! by the compiler rather than at runtime. Naming the same component twice
//! in one signature is caught when the group is created.
//!
//! ```
//! use skald::ecs::{Changed, EntityWorld, Not, Removed};
//!
//! struct Position;
//! impl skald::ecs::Component for Position {}
//! struct Frozen;
//! impl skald::ecs::Component for Frozen {}
//!
//! let mut world = EntityWorld::new();
//! world.query::<(Changed<&mut Position>, Not<Frozen>)>();
//! world.query::<(&Position, Removed<Frozen>)>();
//! ```
//!
//! A marker can't wrap a reference or another marker:
//!
//! ```compile_fail
//! use skald::ecs::{Changed, EntityWorld, Not};
//!
//! struct Position;
//! impl skald::ecs::Component for Position {}
//!
//! let mut world = EntityWorld::new();
//! world.query::<Changed<&Not<Position>>>();
//! ```
//!
//! ```compile_fail
//! use skald::ecs::{EntityWorld, Not, Removed};
//!
//! struct Position;
//! impl skald::ecs::Component for Position {}
//!
//! let mut world = EntityWorld::new();
//! world.query::<Not<Removed<Position>>>();
//! ```
//!
//! ```compile_fail
//! use skald::ecs::{EntityWorld, Not};
//!
//! struct Position;
//! impl skald::ecs::Component for Position {}
//!
//! let mut world = EntityWorld::new();
//! world.query::<(&Position, Not<&'static mut Position>)>();
//! ```
//!
//! ## The `GroupParam` Trait
//!
//! Same shape as a classic tuple query: each parameter binds to its
//! container once (at group creation), claims its lock guard per query from
//! the [`QueryLocks`] the group filled in type-index order, and fetches one
//! item per entity from that guard. Tuples of parameters are
//! parameters, so `(&A, &mut B, Not<C>)` just works.

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use super::component::{
    Component, ComponentContainer, ComponentContainerBase, QueryLocks, ReadFetch, WriteFetch,
    downcast_arc,
};
use super::entity::EntityId;
use super::registry::{ComponentTypeIndex, short_type_name};
use super::system::Access;
use super::world::EntityWorld;

/// The legal ways a group parameter can refer to a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterKind {
    Read,
    Write,
    Changed,
    ChangedWrite,
    Not,
    Removed,
}

impl FilterKind {
    /// `Some(true)` if the entity must have the component, `Some(false)` if
    /// it must not, `None` if membership doesn't depend on it.
    pub fn presence(self) -> Option<bool> {
        match self {
            FilterKind::Read | FilterKind::Write | FilterKind::Changed | FilterKind::ChangedWrite => {
                Some(true)
            }
            FilterKind::Not => Some(false),
            FilterKind::Removed => None,
        }
    }

    /// True if the query hands out `&mut T` and must mark what it returns.
    pub fn is_write(self) -> bool {
        matches!(self, FilterKind::Write | FilterKind::ChangedWrite)
    }

    pub fn is_changed(self) -> bool {
        matches!(self, FilterKind::Changed | FilterKind::ChangedWrite)
    }

    /// `Some(write)` if queries lock the component values, `None` for the
    /// data-less markers.
    pub fn value_access(self) -> Option<bool> {
        match self {
            FilterKind::Read | FilterKind::Changed => Some(false),
            FilterKind::Write | FilterKind::ChangedWrite => Some(true),
            FilterKind::Not | FilterKind::Removed => None,
        }
    }
}

/// One component reference in a bound group signature.
pub struct FilterTerm {
    pub kind: FilterKind,
    pub type_index: ComponentTypeIndex,
    pub type_name: &'static str,
    pub(crate) container: Arc<dyn ComponentContainerBase>,
}

impl FilterTerm {
    /// Human-readable form, e.g. `Changed<&mut Transformable>`.
    pub fn label(&self) -> String {
        let name = short_type_name(self.type_name);
        match self.kind {
            FilterKind::Read => format!("&{name}"),
            FilterKind::Write => format!("&mut {name}"),
            FilterKind::Changed => format!("Changed<&{name}>"),
            FilterKind::ChangedWrite => format!("Changed<&mut {name}>"),
            FilterKind::Not => format!("Not<{name}>"),
            FilterKind::Removed => format!("Removed<{name}>"),
        }
    }
}

/// A type usable in a group signature.
pub trait GroupParam: 'static {
    /// Typed container handles kept by the group.
    type Containers: Send + Sync;
    /// Lock guards held by a live query.
    type Fetch;
    /// The item yielded per entity.
    type Item<'a>;

    /// Resolve containers (registering types lazily) and describe each
    /// component reference in `terms`.
    fn bind(world: &mut EntityWorld, terms: &mut Vec<FilterTerm>) -> Self::Containers;

    /// Claim this parameter's lock guards for one query.
    fn acquire(containers: &Self::Containers, locks: &mut QueryLocks) -> Self::Fetch;

    /// Fetch the item for `id` from the held guards.
    fn fetch<'a>(fetch: &'a mut Self::Fetch, id: EntityId) -> Self::Item<'a>;

    /// Record the component types this parameter reads or writes.
    fn access(access: &mut Access);
}

/// Parameters whose items can be fetched through a shared reference, which
/// allows plain iterators and parallel iteration.
pub trait ReadOnlyGroupParam: GroupParam {
    fn fetch_ref<'a>(fetch: &'a Self::Fetch, id: EntityId) -> Self::Item<'a>;
}

fn bind_term<T: Component>(
    world: &mut EntityWorld,
    terms: &mut Vec<FilterTerm>,
    kind: FilterKind,
) -> Arc<ComponentContainer<T>> {
    let container = world.container_arc::<T>();
    terms.push(FilterTerm {
        kind,
        type_index: container.type_index(),
        type_name: type_name::<T>(),
        container: Arc::clone(&container),
    });
    downcast_arc::<T>(&container)
}

fn missing<T>(id: EntityId) -> ! {
    panic!("entity {id} in query has no `{}` component", type_name::<T>())
}

// ── &T / &mut T ──────────────────────────────────────────────────────────

impl<T: Component> GroupParam for &'static T {
    type Containers = Arc<ComponentContainer<T>>;
    type Fetch = ReadFetch<T>;
    type Item<'a> = &'a T;

    fn bind(world: &mut EntityWorld, terms: &mut Vec<FilterTerm>) -> Self::Containers {
        bind_term::<T>(world, terms, FilterKind::Read)
    }

    fn acquire(containers: &Self::Containers, locks: &mut QueryLocks) -> Self::Fetch {
        locks.take(containers.type_index())
    }

    fn fetch<'a>(fetch: &'a mut Self::Fetch, id: EntityId) -> Self::Item<'a> {
        fetch.get(id).unwrap_or_else(|| missing::<T>(id))
    }

    fn access(access: &mut Access) {
        access.add_read::<T>();
    }
}

impl<T: Component> ReadOnlyGroupParam for &'static T {
    fn fetch_ref<'a>(fetch: &'a Self::Fetch, id: EntityId) -> Self::Item<'a> {
        fetch.get(id).unwrap_or_else(|| missing::<T>(id))
    }
}

impl<T: Component> GroupParam for &'static mut T {
    type Containers = Arc<ComponentContainer<T>>;
    type Fetch = WriteFetch<T>;
    type Item<'a> = &'a mut T;

    fn bind(world: &mut EntityWorld, terms: &mut Vec<FilterTerm>) -> Self::Containers {
        bind_term::<T>(world, terms, FilterKind::Write)
    }

    fn acquire(containers: &Self::Containers, locks: &mut QueryLocks) -> Self::Fetch {
        locks.take(containers.type_index())
    }

    fn fetch<'a>(fetch: &'a mut Self::Fetch, id: EntityId) -> Self::Item<'a> {
        fetch.get_mut(id).unwrap_or_else(|| missing::<T>(id))
    }

    fn access(access: &mut Access) {
        access.add_write::<T>();
    }
}

// ── Changed<P> ───────────────────────────────────────────────────────────

mod sealed {
    pub trait Sealed {}
    impl<T: super::Component> Sealed for &'static T {}
    impl<T: super::Component> Sealed for &'static mut T {}
}

/// Parameters that may be wrapped in [`Changed`]: `&T` and `&mut T` only.
pub trait ChangeableParam: GroupParam + sealed::Sealed {
    fn bind_changed(world: &mut EntityWorld, terms: &mut Vec<FilterTerm>) -> Self::Containers;
}

impl<T: Component> ChangeableParam for &'static T {
    fn bind_changed(world: &mut EntityWorld, terms: &mut Vec<FilterTerm>) -> Self::Containers {
        bind_term::<T>(world, terms, FilterKind::Changed)
    }
}

impl<T: Component> ChangeableParam for &'static mut T {
    fn bind_changed(world: &mut EntityWorld, terms: &mut Vec<FilterTerm>) -> Self::Containers {
        bind_term::<T>(world, terms, FilterKind::ChangedWrite)
    }
}

/// Restrict a group to entities whose component was written since the
/// last `end_tick`.
pub struct Changed<P>(PhantomData<P>);

impl<P: ChangeableParam> GroupParam for Changed<P> {
    type Containers = P::Containers;
    type Fetch = P::Fetch;
    type Item<'a> = P::Item<'a>;

    fn bind(world: &mut EntityWorld, terms: &mut Vec<FilterTerm>) -> Self::Containers {
        P::bind_changed(world, terms)
    }

    fn acquire(containers: &Self::Containers, locks: &mut QueryLocks) -> Self::Fetch {
        P::acquire(containers, locks)
    }

    fn fetch<'a>(fetch: &'a mut Self::Fetch, id: EntityId) -> Self::Item<'a> {
        P::fetch(fetch, id)
    }

    fn access(access: &mut Access) {
        P::access(access);
    }
}

impl<P: ChangeableParam + ReadOnlyGroupParam> ReadOnlyGroupParam for Changed<P> {
    fn fetch_ref<'a>(fetch: &'a Self::Fetch, id: EntityId) -> Self::Item<'a> {
        P::fetch_ref(fetch, id)
    }
}

// ── Not<T> / Removed<T> ──────────────────────────────────────────────────

/// Restrict a group to entities without `T`.
pub struct Not<T>(PhantomData<T>);

/// Restrict a group to entities whose `T` was removed since the last
/// `end_tick`. Yields no data.
pub struct Removed<T>(PhantomData<T>);

macro_rules! impl_marker_param {
    ($name:ident, $kind:expr) => {
        impl<T: Component> GroupParam for $name<T> {
            type Containers = ();
            type Fetch = ();
            type Item<'a> = ();

            fn bind(world: &mut EntityWorld, terms: &mut Vec<FilterTerm>) -> Self::Containers {
                bind_term::<T>(world, terms, $kind);
            }

            fn acquire(_containers: &Self::Containers, _locks: &mut QueryLocks) -> Self::Fetch {}

            fn fetch<'a>(_fetch: &'a mut Self::Fetch, _id: EntityId) -> Self::Item<'a> {}

            fn access(access: &mut Access) {
                access.add_read::<T>();
            }
        }

        impl<T: Component> ReadOnlyGroupParam for $name<T> {
            fn fetch_ref<'a>(_fetch: &'a Self::Fetch, _id: EntityId) -> Self::Item<'a> {}
        }
    };
}

impl_marker_param!(Not, FilterKind::Not);
impl_marker_param!(Removed, FilterKind::Removed);

// ── Tuples ───────────────────────────────────────────────────────────────

/// Implement `GroupParam` for tuples of params.
///
/// This lets you write `world.query::<(&A, &mut B)>()` and get
/// `(EntityId, (&A, &mut B))` per matching entity.
macro_rules! impl_group_param_tuple {
    ($($P:ident),+) => {
        impl<$($P: GroupParam),+> GroupParam for ($($P,)+) {
            type Containers = ($($P::Containers,)+);
            type Fetch = ($($P::Fetch,)+);
            type Item<'a> = ($($P::Item<'a>,)+);

            fn bind(world: &mut EntityWorld, terms: &mut Vec<FilterTerm>) -> Self::Containers {
                ($($P::bind(world, terms),)+)
            }

            #[allow(non_snake_case)]
            fn acquire(containers: &Self::Containers, locks: &mut QueryLocks) -> Self::Fetch {
                let ($($P,)+) = containers;
                ($($P::acquire($P, locks),)+)
            }

            #[allow(non_snake_case)]
            fn fetch<'a>(fetch: &'a mut Self::Fetch, id: EntityId) -> Self::Item<'a> {
                let ($($P,)+) = fetch;
                ($($P::fetch($P, id),)+)
            }

            fn access(access: &mut Access) {
                $($P::access(access);)+
            }
        }

        impl<$($P: ReadOnlyGroupParam),+> ReadOnlyGroupParam for ($($P,)+) {
            #[allow(non_snake_case)]
            fn fetch_ref<'a>(fetch: &'a Self::Fetch, id: EntityId) -> Self::Item<'a> {
                let ($($P,)+) = fetch;
                ($($P::fetch_ref($P, id),)+)
            }
        }
    };
}

impl_group_param_tuple!(A);
impl_group_param_tuple!(A, B);
impl_group_param_tuple!(A, B, C);
impl_group_param_tuple!(A, B, C, D);
impl_group_param_tuple!(A, B, C, D, E);
impl_group_param_tuple!(A, B, C, D, E, F);
impl_group_param_tuple!(A, B, C, D, E, F, G);
impl_group_param_tuple!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;

    impl Component for Position {}
    impl Component for Velocity {}

    #[test]
    fn filter_kind_presence() {
        assert_eq!(FilterKind::Read.presence(), Some(true));
        assert_eq!(FilterKind::ChangedWrite.presence(), Some(true));
        assert_eq!(FilterKind::Not.presence(), Some(false));
        assert_eq!(FilterKind::Removed.presence(), None);
        assert!(FilterKind::ChangedWrite.is_write());
        assert!(!FilterKind::Changed.is_write());
        assert_eq!(FilterKind::Changed.value_access(), Some(false));
        assert_eq!(FilterKind::ChangedWrite.value_access(), Some(true));
        assert_eq!(FilterKind::Not.value_access(), None);
    }

    #[test]
    fn access_of_signature() {
        let access = Access::of::<(&Position, Changed<&mut Velocity>)>();
        assert!(access.reads_component::<Position>());
        assert!(access.writes_component::<Velocity>());
        assert!(!access.writes_component::<Position>());
    }

    #[test]
    fn bind_records_terms_in_order() {
        let mut world = EntityWorld::new();
        let mut terms = Vec::new();
        <(&Position, Not<Velocity>, Removed<Position>)>::bind(&mut world, &mut terms);
        let kinds: Vec<_> = terms.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![FilterKind::Read, FilterKind::Not, FilterKind::Removed]
        );
        assert_eq!(terms[1].label(), "Not<Velocity>");
        assert_eq!(terms[0].type_index, terms[2].type_index);
    }
}
