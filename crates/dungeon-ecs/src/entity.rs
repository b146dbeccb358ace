//! Entity identifiers and component storage.
//!
//! An [`EntityId`] is a process-unique `u64` handed out by a monotonically
//! increasing counter. Ids are never reused, so a stale id can only ever miss,
//! never alias a newer entity.
//!
//! An [`Entity`] is created freestanding: components added to it before it is
//! registered with the [`World`](crate::world::World) are invisible to every
//! System. Once live, it is mutated through
//! [`EntityMut`](crate::world::EntityMut) so that the World Index sees each
//! structural change.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentType};
use crate::EcsError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(0);

/// A process-unique entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Draw the next id from the process-wide counter.
    fn next() -> Self {
        let raw = NEXT_ENTITY_ID.fetch_add(1, AtomicOrdering::Relaxed);
        assert!(raw != u64::MAX, "entity id space exhausted");
        Self(raw)
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

type ComponentBox = Box<dyn Any + Send + Sync>;

/// A container of components with a stable identity.
///
/// Holds at most one component per type; adding a second component of the
/// same type replaces the first. Equality and ordering use the id only.
pub struct Entity {
    id: EntityId,
    name: String,
    persistent: bool,
    components: HashMap<ComponentType, ComponentBox>,
}

impl Entity {
    /// Create an entity named `_<id>`.
    pub fn new() -> Self {
        let id = EntityId::next();
        Self::with_name_and_id(id, format!("_{id}"))
    }

    /// Create an entity with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_name_and_id(EntityId::next(), name.into())
    }

    fn with_name_and_id(id: EntityId, name: String) -> Self {
        tracing::debug!(entity = %id, name = %name, "entity created");
        Self {
            id,
            name,
            persistent: false,
            components: HashMap::new(),
        }
    }

    /// Builder-style [`add`](Self::add).
    pub fn with<T: Component>(mut self, component: T) -> Self {
        self.add(component);
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Whether this entity moves with the player when the level changes.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    /// Store `component`, returning the component of the same type it
    /// replaced, if any.
    ///
    /// This only touches the entity itself. For a live entity use
    /// [`EntityMut::add`](crate::world::EntityMut::add) so the World Index is
    /// informed.
    pub fn add<T: Component>(&mut self, component: T) -> Option<T> {
        let previous = self
            .components
            .insert(ComponentType::of::<T>(), Box::new(component));
        previous.and_then(|old| old.downcast::<T>().ok().map(|b| *b))
    }

    /// Remove and return the component of type `T`, if present.
    pub fn remove<T: Component>(&mut self) -> Option<T> {
        self.components
            .remove(&ComponentType::of::<T>())
            .and_then(|old| old.downcast::<T>().ok().map(|b| *b))
    }

    /// Borrow the component of type `T`, if present.
    pub fn fetch<T: Component>(&self) -> Option<&T> {
        self.components
            .get(&ComponentType::of::<T>())
            .and_then(|c| c.downcast_ref::<T>())
    }

    /// Mutably borrow the component of type `T`, if present.
    ///
    /// Changing a component's value never changes System membership, so this
    /// needs no index notification.
    pub fn fetch_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .get_mut(&ComponentType::of::<T>())
            .and_then(|c| c.downcast_mut::<T>())
    }

    /// Borrow the component of type `T` or fail with
    /// [`EcsError::MissingComponent`].
    pub fn require<T: Component>(&self) -> Result<&T, EcsError> {
        self.fetch::<T>()
            .ok_or_else(|| self.missing(ComponentType::of::<T>()))
    }

    /// Mutable variant of [`require`](Self::require).
    pub fn require_mut<T: Component>(&mut self) -> Result<&mut T, EcsError> {
        let ty = ComponentType::of::<T>();
        let Self {
            id,
            name,
            components,
            ..
        } = self;
        components
            .get_mut(&ty)
            .and_then(|c| c.downcast_mut::<T>())
            .ok_or_else(|| EcsError::MissingComponent {
                entity: *id,
                name: name.clone(),
                component: ty.name(),
            })
    }

    pub fn is_present<T: Component>(&self) -> bool {
        self.components.contains_key(&ComponentType::of::<T>())
    }

    /// Whether a component of the given type token is stored.
    pub fn has_type(&self, ty: ComponentType) -> bool {
        self.components.contains_key(&ty)
    }

    /// The types of all stored components, in no particular order.
    pub fn component_types(&self) -> impl Iterator<Item = ComponentType> + '_ {
        self.components.keys().copied()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    fn missing(&self, component: ComponentType) -> EcsError {
        EcsError::MissingComponent {
            entity: self.id,
            name: self.name.clone(),
            component: component.name(),
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.components.keys().map(|t| t.short_name()).collect();
        types.sort_unstable();
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("components", &types)
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity{{id={}, name='{}'}}", self.id, self.name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
