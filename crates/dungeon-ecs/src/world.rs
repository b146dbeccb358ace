//! The [`World`] is the single facade over the ECS. It owns every entity
//! population (one per level), the System registry and the
//! [`WorldIndex`](crate::index) that keeps each System's matching set exact.
//!
//! Structural changes go through the World (or an [`EntityMut`] borrowed from
//! it) so that membership is updated synchronously and the affected Systems'
//! `on_entity_add` / `on_entity_remove` hooks fire before the call returns.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, error, info, trace, warn};

use crate::component::{Component, ComponentSet, ComponentType};
use crate::entity::{Entity, EntityId};
use crate::index::{IndexStats, Membership, Transition, WorldIndex};
use crate::level::{Coordinate, Level, Position, Tile};
use crate::system::{System, SystemKey};
use crate::EcsError;

// ---------------------------------------------------------------------------
// LevelLoad
// ---------------------------------------------------------------------------

/// Record of one level swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelLoad {
    /// Name of the level that became current.
    pub level: String,
    /// `true` the first time a level with this name is loaded.
    pub first_load: bool,
}

// ---------------------------------------------------------------------------
// Population -- per-level entity storage
// ---------------------------------------------------------------------------

/// Entity storage. `None` keys the population that existed before any level
/// was set.
#[derive(Default)]
struct Population {
    current: Option<String>,
    live: BTreeMap<EntityId, Entity>,
    shelved: HashMap<Option<String>, BTreeMap<EntityId, Entity>>,
    /// Entities destroyed while a System was executing. They stay readable
    /// until that System's deferred hooks have been delivered.
    limbo: Vec<Entity>,
}

impl Population {
    fn find(&self, id: EntityId) -> Option<&Entity> {
        self.live
            .get(&id)
            .or_else(|| self.limbo.iter().find(|e| e.id() == id))
            .or_else(|| self.shelved.values().find_map(|p| p.get(&id)))
    }

    fn is_shelved(&self, id: EntityId) -> bool {
        self.shelved.values().any(|p| p.contains_key(&id))
    }
}

// ---------------------------------------------------------------------------
// SystemRegistry
// ---------------------------------------------------------------------------

struct SystemSlot {
    name: &'static str,
    /// `None` while the System is checked out for execution or rendering.
    system: Option<Box<dyn System>>,
    /// Hooks addressed to the System while it was checked out.
    pending: Vec<(Membership, EntityId)>,
}

#[derive(Default)]
pub(crate) struct SystemRegistry {
    order: Vec<SystemKey>,
    slots: HashMap<SystemKey, SystemSlot>,
    /// Checked-out Systems, innermost last. A System may drive a nested tick
    /// or render pass from inside `execute()`.
    executing: Vec<SystemKey>,
}

impl SystemRegistry {
    /// Hand one transition to its System, or queue it if the System is
    /// checked out.
    fn deliver(&mut self, transition: Transition, entity: &Entity) {
        let Some(slot) = self.slots.get_mut(&transition.system) else {
            warn!(entity = %transition.entity, "transition for unregistered system dropped");
            return;
        };
        match slot.system.as_deref_mut() {
            Some(system) => invoke_hook(system, transition.membership, entity),
            None => slot
                .pending
                .push((transition.membership, transition.entity)),
        }
    }
}

fn invoke_hook(system: &mut dyn System, membership: Membership, entity: &Entity) {
    match membership {
        Membership::Added => system.on_entity_add(entity),
        Membership::Removed => system.on_entity_remove(entity),
    }
}

/// Deliver transitions straight to a System that is not (or no longer) in
/// the registry.
fn deliver_to(system: &mut dyn System, transitions: &[Transition], population: &Population) {
    for t in transitions {
        match population.find(t.entity) {
            Some(entity) => invoke_hook(system, t.membership, entity),
            None => error!(entity = %t.entity, system = system.name(), "hook for unknown entity"),
        }
    }
}

fn downcast_system<S: System>(system: Box<dyn System>) -> Option<S> {
    let any: Box<dyn Any> = system;
    any.downcast::<S>().ok().map(|b| *b)
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The ECS facade: entities, Systems, the current level and the index tying
/// them together.
#[derive(Default)]
pub struct World {
    population: Population,
    index: WorldIndex,
    systems: SystemRegistry,
    hero: Option<EntityId>,
    level: Option<Rc<dyn Level>>,
    seen_levels: HashSet<String>,
    level_loads: Vec<LevelLoad>,
    pub(crate) tick: u64,
}

impl World {
    /// Create an empty world with no level and no Systems.
    pub fn new() -> Self {
        Self::default()
    }

    // -- entities -----------------------------------------------------------

    /// Make `entity` live in the current level.
    ///
    /// Every System whose filter the entity satisfies gets `on_entity_add`
    /// before this returns.
    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        let id = entity.id();
        let types: Vec<ComponentType> = entity.component_types().collect();
        debug!(entity = %id, name = entity.name(), components = types.len(), "entity added");
        self.population.live.insert(id, entity);
        let transitions = self.index.entity_registered(id, &types);
        self.dispatch(transitions);
        id
    }

    /// Remove a live entity from the world.
    ///
    /// Every System whose set contained it gets `on_entity_remove`. Returns
    /// `false` for ids that are not live in the current level.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.population.live.get(&id) else {
            return false;
        };
        let types: Vec<ComponentType> = entity.component_types().collect();
        let transitions = self.index.entity_unregistered(id, &types);
        self.dispatch(transitions);

        if let Some(entity) = self.population.live.remove(&id) {
            debug!(entity = %id, name = entity.name(), "entity removed");
            if !self.systems.executing.is_empty() {
                self.population.limbo.push(entity);
            }
        }
        if self.hero == Some(id) {
            self.hero = None;
        }
        true
    }

    /// Remove every live entity of the current level. Returns how many were
    /// removed.
    pub fn remove_all_entities(&mut self) -> usize {
        let ids: Vec<EntityId> = self.population.live.keys().copied().collect();
        ids.into_iter().filter(|&id| self.remove_entity(id)).count()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.population.live.get(&id)
    }

    /// Mutable handle to a live entity. Structural changes made through it
    /// are reported to the index.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<EntityMut<'_>> {
        if self.population.live.contains_key(&id) {
            Some(EntityMut { world: self, id })
        } else {
            None
        }
    }

    /// Whether `id` is live in the current level.
    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.population.live.contains_key(&id)
    }

    /// Whether `id` is held by any level, current or shelved.
    pub fn exists_anywhere(&self, id: EntityId) -> bool {
        self.contains_entity(id) || self.population.is_shelved(id)
    }

    pub fn entity_count(&self) -> usize {
        self.population.live.len()
    }

    /// Add a component to a live entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownEntity`] if `id` is not live.
    pub fn add_component<T: Component>(
        &mut self,
        id: EntityId,
        component: T,
    ) -> Result<Option<T>, EcsError> {
        let mut entity = self
            .entity_mut(id)
            .ok_or(EcsError::UnknownEntity { entity: id })?;
        Ok(entity.add(component))
    }

    /// Remove a component from a live entity, returning it if it was present.
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Option<T> {
        self.entity_mut(id)?.remove::<T>()
    }

    // -- queries ------------------------------------------------------------

    /// Every live entity of the current level, ascending by id.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.population.live.values()
    }

    /// Live entities carrying every type in `filter`, ascending by id.
    pub fn entities_with<'a>(
        &'a self,
        filter: &ComponentSet,
    ) -> impl Iterator<Item = &'a Entity> + 'a {
        self.index
            .query(filter)
            .into_iter()
            .filter_map(move |id| self.population.live.get(&id))
    }

    /// Snapshot of the ids [`entities_with`](Self::entities_with) would yield.
    pub fn entity_ids_with(&self, filter: &ComponentSet) -> Vec<EntityId> {
        self.index.query(filter)
    }

    /// The current matching set of System `S`, ascending by id. Empty when `S`
    /// is not registered.
    pub fn entities_of<S: System>(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.index
            .members(SystemKey::of::<S>())
            .into_iter()
            .flatten()
            .filter_map(move |id| self.population.live.get(id))
    }

    /// Snapshot of System `S`'s matching set. Safe to iterate while mutating
    /// the world.
    pub fn entity_ids_of<S: System>(&self) -> Vec<EntityId> {
        self.index
            .members(SystemKey::of::<S>())
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// First live entity (lowest id) whose `T` component satisfies
    /// `predicate`.
    pub fn find_entity<T, P>(&self, predicate: P) -> Option<&Entity>
    where
        T: Component,
        P: Fn(&T) -> bool,
    {
        self.entities_with(&ComponentSet::empty().with::<T>())
            .find(|e| e.fetch::<T>().is_some_and(&predicate))
    }

    /// Live entities whose [`Position`] falls into `coordinate`.
    pub fn entities_at(&self, coordinate: Coordinate) -> Vec<&Entity> {
        self.entities_with(&ComponentSet::of::<(Position,)>())
            .filter(|e| {
                e.fetch::<Position>()
                    .is_some_and(|p| p.coordinate() == coordinate)
            })
            .collect()
    }

    /// The tile of the current level under a live entity.
    ///
    /// Returns `Ok(None)` when no level is set or the position is outside it.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownEntity`] if `id` is not live,
    /// [`EcsError::MissingComponent`] if it has no [`Position`].
    pub fn tile_of(&self, id: EntityId) -> Result<Option<Tile>, EcsError> {
        let entity = self
            .entity(id)
            .ok_or(EcsError::UnknownEntity { entity: id })?;
        let position = entity.require::<Position>()?;
        Ok(self
            .level
            .as_ref()
            .and_then(|level| level.tile_at(position.coordinate())))
    }

    pub fn index_stats(&self) -> IndexStats {
        self.index.stats()
    }

    /// Compare every System's matching set against a from-scratch evaluation
    /// of its filter. Meant for tests and debug tooling.
    pub fn check_index(&self) -> Result<(), String> {
        if self.index.live_count() != self.population.live.len() {
            return Err(format!(
                "index tracks {} live entities, world holds {}",
                self.index.live_count(),
                self.population.live.len()
            ));
        }
        self.index.verify(|id| {
            self.population
                .live
                .get(&id)
                .map(|e| e.component_types().collect())
        })
    }

    /// Number of logic ticks executed so far.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    // -- hero ---------------------------------------------------------------

    pub fn hero(&self) -> Option<&Entity> {
        self.hero.and_then(|id| self.entity(id))
    }

    pub fn hero_id(&self) -> Option<EntityId> {
        self.hero
    }

    /// Designate a live entity as the hero. Returns `false` if `id` is not
    /// live.
    pub fn set_hero(&mut self, id: EntityId) -> bool {
        if !self.contains_entity(id) {
            return false;
        }
        debug!(entity = %id, "hero set");
        self.hero = Some(id);
        true
    }

    pub fn clear_hero(&mut self) {
        self.hero = None;
    }

    // -- Systems ------------------------------------------------------------

    /// Register `system`, replacing any registered instance of the same type.
    ///
    /// The new instance immediately receives `on_entity_add` for every live
    /// entity matching its filter. A replaced instance first receives
    /// `on_entity_remove` for its members and is returned; the newcomer takes
    /// over its position in execution order.
    ///
    /// # Errors
    ///
    /// [`EcsError::SystemBusy`] if a System of type `S` is executing.
    pub fn add_system<S: System>(&mut self, system: S) -> Result<Option<S>, EcsError> {
        let key = SystemKey::of::<S>();
        if self.systems.executing.contains(&key) {
            return Err(EcsError::SystemBusy {
                system: system.name(),
            });
        }

        let previous = self.detach_system(key);
        let position = match self.systems.order.iter().position(|k| *k == key) {
            Some(pos) => pos,
            None => {
                self.systems.order.push(key);
                self.systems.order.len() - 1
            }
        };

        let mut boxed: Box<dyn System> = Box::new(system);
        let name = boxed.name();
        let transitions = self.index.attach(key, boxed.filter().clone(), position);
        info!(
            system = name,
            filter = %boxed.filter(),
            matched = transitions.len(),
            "system registered"
        );
        deliver_to(boxed.as_mut(), &transitions, &self.population);
        self.systems.slots.insert(
            key,
            SystemSlot {
                name,
                system: Some(boxed),
                pending: Vec::new(),
            },
        );
        Ok(previous.and_then(downcast_system::<S>))
    }

    /// Unregister the System of type `S`, returning it.
    ///
    /// The instance receives `on_entity_remove` for every member first.
    ///
    /// # Errors
    ///
    /// [`EcsError::SystemBusy`] if `S` is executing.
    pub fn remove_system<S: System>(&mut self) -> Result<Option<S>, EcsError> {
        let key = SystemKey::of::<S>();
        if self.systems.executing.contains(&key) {
            return Err(EcsError::SystemBusy {
                system: std::any::type_name::<S>(),
            });
        }
        let removed = self.detach_system(key);
        self.systems.order.retain(|k| *k != key);
        Ok(removed.and_then(downcast_system::<S>))
    }

    /// Unregister every System except one that is currently executing.
    pub fn remove_all_systems(&mut self) -> Vec<Box<dyn System>> {
        let keys: Vec<SystemKey> = self
            .systems
            .order
            .iter()
            .copied()
            .filter(|k| !self.systems.executing.contains(k))
            .collect();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            removed.extend(self.detach_system(key));
            self.systems.order.retain(|k| *k != key);
        }
        removed
    }

    /// Pull a System out of the index and the slot map, delivering its
    /// removal hooks. Leaves `order` untouched.
    fn detach_system(&mut self, key: SystemKey) -> Option<Box<dyn System>> {
        let slot = self.systems.slots.remove(&key)?;
        let transitions = self.index.detach(key);
        let Some(mut system) = slot.system else {
            warn!(system = slot.name, "unregistered a checked-out system");
            return None;
        };
        deliver_to(system.as_mut(), &transitions, &self.population);
        info!(system = slot.name, released = transitions.len(), "system unregistered");
        Some(system)
    }

    pub fn has_system<S: System>(&self) -> bool {
        self.systems.slots.contains_key(&SystemKey::of::<S>())
    }

    /// Borrow the registered System of type `S`. `None` if absent or if it is
    /// the one currently executing.
    pub fn system<S: System>(&self) -> Option<&S> {
        let system = self
            .systems
            .slots
            .get(&SystemKey::of::<S>())?
            .system
            .as_deref()?;
        (system as &dyn Any).downcast_ref::<S>()
    }

    pub fn system_mut<S: System>(&mut self) -> Option<&mut S> {
        let system = self
            .systems
            .slots
            .get_mut(&SystemKey::of::<S>())?
            .system
            .as_deref_mut()?;
        (system as &mut dyn Any).downcast_mut::<S>()
    }

    /// Run `f` against System `S` if it is registered and available.
    pub fn with_system<S, R, F>(&mut self, f: F) -> Option<R>
    where
        S: System,
        F: FnOnce(&mut S) -> R,
    {
        self.system_mut::<S>().map(f)
    }

    /// Registered Systems in execution order, skipping any that are checked
    /// out.
    pub fn systems(&self) -> impl Iterator<Item = &dyn System> + '_ {
        self.systems
            .order
            .iter()
            .filter_map(|k| self.systems.slots.get(k)?.system.as_deref())
    }

    /// Names of the registered Systems in execution order.
    pub fn system_names(&self) -> Vec<&'static str> {
        self.systems
            .order
            .iter()
            .filter_map(|k| self.systems.slots.get(k).map(|s| s.name))
            .collect()
    }

    pub fn system_count(&self) -> usize {
        self.systems.order.len()
    }

    /// Whether `id` is currently in System `S`'s matching set.
    pub fn is_member_of<S: System>(&self, id: EntityId) -> bool {
        self.index.contains(SystemKey::of::<S>(), id)
    }

    /// Snapshot of the registration order.
    pub(crate) fn execution_order(&self) -> Vec<SystemKey> {
        self.systems.order.clone()
    }

    /// Take a System out of its slot for execution. Hooks addressed to it
    /// are queued until [`check_in`](Self::check_in).
    pub(crate) fn check_out(&mut self, key: SystemKey) -> Option<Box<dyn System>> {
        let system = self.systems.slots.get_mut(&key)?.system.take()?;
        self.systems.executing.push(key);
        Some(system)
    }

    /// Return a checked-out System, deliver its queued hooks, then drop the
    /// entities destroyed while it ran.
    pub(crate) fn check_in(&mut self, key: SystemKey, mut system: Box<dyn System>) {
        self.systems.executing.retain(|k| *k != key);
        match self.systems.slots.get_mut(&key) {
            Some(slot) => {
                for (membership, id) in std::mem::take(&mut slot.pending) {
                    match self.population.find(id) {
                        Some(entity) => invoke_hook(system.as_mut(), membership, entity),
                        None => error!(entity = %id, system = slot.name, "deferred hook for unknown entity"),
                    }
                }
                slot.system = Some(system);
            }
            None => warn!(system = system.name(), "checked-in system no longer registered"),
        }
        if self.systems.executing.is_empty() {
            self.population.limbo.clear();
        }
    }

    // -- level --------------------------------------------------------------

    pub fn current_level(&self) -> Option<&dyn Level> {
        self.level.as_deref()
    }

    /// Shared handle to the current level.
    pub fn current_level_handle(&self) -> Option<Rc<dyn Level>> {
        self.level.clone()
    }

    /// Make `level` current and swap entity populations.
    ///
    /// Every existing membership is reported removed, the outgoing
    /// population is shelved under its level (minus the hero and persistent
    /// entities, which travel), the incoming level's shelved population is
    /// restored, and every resulting membership is reported added. The
    /// returned record is also queued for [`take_level_loads`](Self::take_level_loads).
    pub fn set_current_level(&mut self, level: Rc<dyn Level>) -> LevelLoad {
        let name = level.name().to_owned();
        let first_load = self.seen_levels.insert(name.clone());

        let removed = self.index.clear();
        self.dispatch(removed);

        let outgoing = std::mem::take(&mut self.population.live);
        let (travelling, staying): (BTreeMap<_, _>, BTreeMap<_, _>) = outgoing
            .into_iter()
            .partition(|(id, e)| e.is_persistent() || self.hero == Some(*id));
        let previous = self.population.current.replace(name.clone());
        self.population.shelved.insert(previous.clone(), staying);
        let mut incoming = self
            .population
            .shelved
            .remove(&Some(name.clone()))
            .unwrap_or_default();
        let travelled = travelling.len();
        incoming.extend(travelling);
        self.population.live = incoming;

        let population: Vec<(EntityId, Vec<ComponentType>)> = self
            .population
            .live
            .iter()
            .map(|(id, e)| (*id, e.component_types().collect()))
            .collect();
        let added = self.index.repopulate(population);
        self.dispatch(added);

        self.level = Some(level);
        info!(
            from = previous.as_deref().unwrap_or("<none>"),
            to = %name,
            first_load,
            travelled,
            live = self.population.live.len(),
            "level loaded"
        );
        let load = LevelLoad {
            level: name,
            first_load,
        };
        self.level_loads.push(load.clone());
        load
    }

    /// Drain the level swaps recorded since the last call, oldest first.
    pub fn take_level_loads(&mut self) -> Vec<LevelLoad> {
        std::mem::take(&mut self.level_loads)
    }

    pub(crate) fn queued_level_loads(&self) -> usize {
        self.level_loads.len()
    }

    // -- dispatch -----------------------------------------------------------

    fn dispatch(&mut self, transitions: Vec<Transition>) {
        for t in transitions {
            match self.population.find(t.entity) {
                Some(entity) => self.systems.deliver(t, entity),
                None => error!(entity = %t.entity, "membership change for unknown entity"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EntityMut
// ---------------------------------------------------------------------------

/// Mutable access to one live entity.
///
/// `add` and `remove` keep the World Index in step and fire hooks before
/// returning. Value access through `fetch_mut` never changes membership.
pub struct EntityMut<'w> {
    world: &'w mut World,
    id: EntityId,
}

impl EntityMut<'_> {
    // The handle holds the only borrow of the World and hooks cannot mutate
    // it, so the entity stays live for the handle's lifetime.
    fn get(&self) -> &Entity {
        self.world
            .population
            .live
            .get(&self.id)
            .expect("EntityMut outlived its entity")
    }

    fn get_mut(&mut self) -> &mut Entity {
        self.world
            .population
            .live
            .get_mut(&self.id)
            .expect("EntityMut outlived its entity")
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.get().name()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.get_mut().set_name(name);
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.get_mut().set_persistent(persistent);
    }

    /// Read-only view of the whole entity.
    pub fn as_entity(&self) -> &Entity {
        self.get()
    }

    /// Store `component`, returning the one it replaced. Systems whose
    /// filter becomes satisfied get `on_entity_add`.
    pub fn add<T: Component>(&mut self, component: T) -> Option<T> {
        let previous = self.get_mut().add(component);
        let ty = ComponentType::of::<T>();
        trace!(entity = %self.id, component = %ty, replaced = previous.is_some(), "component added");
        let transitions = self.world.index.component_added(self.id, ty);
        self.world.dispatch(transitions);
        previous
    }

    /// Remove the `T` component. Systems that required it get
    /// `on_entity_remove` with the component already detached.
    pub fn remove<T: Component>(&mut self) -> Option<T> {
        let removed = self.get_mut().remove::<T>()?;
        let ty = ComponentType::of::<T>();
        trace!(entity = %self.id, component = %ty, "component removed");
        let transitions = self.world.index.component_removed(self.id, ty);
        self.world.dispatch(transitions);
        Some(removed)
    }

    pub fn fetch<T: Component>(&self) -> Option<&T> {
        self.get().fetch::<T>()
    }

    pub fn fetch_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.get_mut().fetch_mut::<T>()
    }

    pub fn require<T: Component>(&self) -> Result<&T, EcsError> {
        self.get().require::<T>()
    }

    pub fn require_mut<T: Component>(&mut self) -> Result<&mut T, EcsError> {
        self.get_mut().require_mut::<T>()
    }

    pub fn is_present<T: Component>(&self) -> bool {
        self.get().is_present::<T>()
    }

    /// Remove the entity from the world.
    pub fn despawn(self) -> bool {
        self.world.remove_entity(self.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::level::GridLevel;
    use crate::system::SystemBase;

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[derive(Debug, Clone, PartialEq)]
    struct Armor(u32);
    impl Component for Armor {}

    type Log = Rc<RefCell<Vec<(Membership, EntityId)>>>;

    struct Watcher {
        base: SystemBase,
        log: Log,
    }

    impl Watcher {
        fn new(filter: ComponentSet, log: &Log) -> Self {
            Self {
                base: SystemBase::new(filter),
                log: Rc::clone(log),
            }
        }
    }

    impl System for Watcher {
        fn base(&self) -> &SystemBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut SystemBase {
            &mut self.base
        }
        fn execute(&mut self, _world: &mut World) -> Result<(), EcsError> {
            Ok(())
        }
        fn on_entity_add(&mut self, entity: &Entity) {
            self.log.borrow_mut().push((Membership::Added, entity.id()));
        }
        fn on_entity_remove(&mut self, entity: &Entity) {
            self.log.borrow_mut().push((Membership::Removed, entity.id()));
        }
    }

    fn health_filter() -> ComponentSet {
        ComponentSet::of::<(Health,)>()
    }

    #[test]
    fn add_entity_fires_add_hook() {
        let log = Log::default();
        let mut world = World::new();
        world
            .add_system(Watcher::new(health_filter(), &log))
            .unwrap();
        let id = world.add_entity(Entity::new().with(Health(3)));
        let other = world.add_entity(Entity::new().with(Armor(1)));
        assert_eq!(*log.borrow(), vec![(Membership::Added, id)]);
        assert_eq!(world.entity_ids_of::<Watcher>(), vec![id]);
        assert!(world.contains_entity(other));
    }

    #[test]
    fn component_churn_moves_membership() {
        let log = Log::default();
        let mut world = World::new();
        world
            .add_system(Watcher::new(health_filter(), &log))
            .unwrap();
        let id = world.add_entity(Entity::new());
        assert!(world.entity_ids_of::<Watcher>().is_empty());

        world.add_component(id, Health(1)).unwrap();
        assert_eq!(world.entity_ids_of::<Watcher>(), vec![id]);
        // Replacement does not re-fire the hook.
        assert_eq!(world.add_component(id, Health(2)).unwrap(), Some(Health(1)));
        assert_eq!(world.remove_component::<Health>(id), Some(Health(2)));
        assert!(world.entity_ids_of::<Watcher>().is_empty());
        assert_eq!(
            *log.borrow(),
            vec![(Membership::Added, id), (Membership::Removed, id)]
        );
        world.check_index().unwrap();
    }

    #[test]
    fn add_component_to_unknown_entity_errors() {
        let mut world = World::new();
        let ghost = Entity::new().id();
        let err = world.add_component(ghost, Health(1)).unwrap_err();
        assert!(matches!(err, EcsError::UnknownEntity { entity } if entity == ghost));
        assert!(world.remove_component::<Health>(ghost).is_none());
    }

    #[test]
    fn remove_entity_fires_remove_hook_once() {
        let log = Log::default();
        let mut world = World::new();
        world
            .add_system(Watcher::new(health_filter(), &log))
            .unwrap();
        let id = world.add_entity(Entity::new().with(Health(3)));
        assert!(world.remove_entity(id));
        assert!(!world.remove_entity(id));
        assert_eq!(
            *log.borrow(),
            vec![(Membership::Added, id), (Membership::Removed, id)]
        );
        assert!(!world.exists_anywhere(id));
    }

    #[test]
    fn late_system_catches_up() {
        let log = Log::default();
        let mut world = World::new();
        let a = world.add_entity(Entity::new().with(Health(1)));
        let b = world.add_entity(Entity::new().with(Health(2)).with(Armor(1)));
        world.add_entity(Entity::new().with(Armor(5)));
        world
            .add_system(Watcher::new(health_filter(), &log))
            .unwrap();
        assert_eq!(
            *log.borrow(),
            vec![(Membership::Added, a), (Membership::Added, b)]
        );
    }

    #[test]
    fn replacing_system_returns_previous_and_keeps_order() {
        struct Other {
            base: SystemBase,
        }
        impl System for Other {
            fn base(&self) -> &SystemBase {
                &self.base
            }
            fn base_mut(&mut self) -> &mut SystemBase {
                &mut self.base
            }
            fn execute(&mut self, _world: &mut World) -> Result<(), EcsError> {
                Ok(())
            }
        }

        let first_log = Log::default();
        let second_log = Log::default();
        let mut world = World::new();
        let id = world.add_entity(Entity::new().with(Health(1)));
        world
            .add_system(Watcher::new(health_filter(), &first_log))
            .unwrap();
        world
            .add_system(Other {
                base: SystemBase::new(ComponentSet::empty()),
            })
            .unwrap();

        let previous = world
            .add_system(Watcher::new(health_filter(), &second_log))
            .unwrap();
        assert!(previous.is_some());
        assert_eq!(world.system_count(), 2);
        assert!(world.system_names()[0].ends_with("Watcher"));
        assert_eq!(
            *first_log.borrow(),
            vec![(Membership::Added, id), (Membership::Removed, id)]
        );
        assert_eq!(*second_log.borrow(), vec![(Membership::Added, id)]);
    }

    #[test]
    fn remove_system_releases_members() {
        let log = Log::default();
        let mut world = World::new();
        let id = world.add_entity(Entity::new().with(Health(1)));
        world
            .add_system(Watcher::new(health_filter(), &log))
            .unwrap();
        let removed = world.remove_system::<Watcher>().unwrap();
        assert!(removed.is_some());
        assert!(!world.has_system::<Watcher>());
        assert!(world.remove_system::<Watcher>().unwrap().is_none());
        assert_eq!(log.borrow().last(), Some(&(Membership::Removed, id)));
        assert!(world.entity_ids_of::<Watcher>().is_empty());
    }

    #[test]
    fn with_system_reaches_instance() {
        let log = Log::default();
        let mut world = World::new();
        assert!(world.with_system::<Watcher, _, _>(|s| s.stop()).is_none());
        world
            .add_system(Watcher::new(health_filter(), &log))
            .unwrap();
        world.with_system::<Watcher, _, _>(|s| s.stop());
        assert_eq!(world.system::<Watcher>().map(|s| s.is_running()), Some(false));
    }

    #[test]
    fn find_entity_by_component_value() {
        let mut world = World::new();
        world.add_entity(Entity::new().with(Health(1)));
        let strong = world.add_entity(Entity::new().with(Health(90)));
        let found = world.find_entity::<Health, _>(|h| h.0 > 50).map(Entity::id);
        assert_eq!(found, Some(strong));
        assert!(world.find_entity::<Armor, _>(|_| true).is_none());
    }

    #[test]
    fn hero_cleared_on_removal() {
        let mut world = World::new();
        let id = world.add_entity(Entity::named("hero"));
        assert!(world.set_hero(id));
        assert_eq!(world.hero().map(Entity::name), Some("hero"));
        world.remove_entity(id);
        assert!(world.hero_id().is_none());
        assert!(!world.set_hero(id));
    }

    #[test]
    fn entities_at_and_tile_of() {
        let mut world = World::new();
        world.set_current_level(Rc::new(GridLevel::from_ascii("room", "...\n.E.")));
        let on_exit = world.add_entity(Entity::new().with(Position::new(1.5, 1.2)));
        let bare = world.add_entity(Entity::named("ghost"));

        let at: Vec<EntityId> = world
            .entities_at(Coordinate::new(1, 1))
            .into_iter()
            .map(Entity::id)
            .collect();
        assert_eq!(at, vec![on_exit]);
        assert_eq!(
            world.tile_of(on_exit).unwrap().map(|t| t.kind),
            Some(crate::level::TileKind::Exit)
        );
        assert!(matches!(
            world.tile_of(bare),
            Err(EcsError::MissingComponent { .. })
        ));
    }

    #[test]
    fn level_swap_shelves_and_restores() {
        let log = Log::default();
        let mut world = World::new();
        world
            .add_system(Watcher::new(health_filter(), &log))
            .unwrap();

        let first = world.set_current_level(Rc::new(GridLevel::new("a", 4, 4)));
        assert!(first.first_load);
        let local = world.add_entity(Entity::new().with(Health(1)));
        let hero = world.add_entity(Entity::named("hero").with(Health(9)));
        world.set_hero(hero);
        let mut charm = Entity::new().with(Health(2));
        charm.set_persistent(true);
        let charm = world.add_entity(charm);
        log.borrow_mut().clear();

        let second = world.set_current_level(Rc::new(GridLevel::new("b", 4, 4)));
        assert!(second.first_load);
        assert!(!world.contains_entity(local));
        assert!(world.exists_anywhere(local));
        assert!(world.contains_entity(hero));
        assert!(world.contains_entity(charm));
        // Full reindex: removals for all, then additions for the travellers.
        let events = log.borrow().clone();
        assert_eq!(events.len(), 5);
        assert!(events[..3].iter().all(|(m, _)| *m == Membership::Removed));
        assert!(events[3..].iter().all(|(m, _)| *m == Membership::Added));

        let back = world.set_current_level(Rc::new(GridLevel::new("a", 4, 4)));
        assert!(!back.first_load);
        assert!(world.contains_entity(local));
        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.take_level_loads().len(), 3);
        assert!(world.take_level_loads().is_empty());
        world.check_index().unwrap();
    }

    #[test]
    fn bulk_removal_releases_everything() {
        let log = Log::default();
        let mut world = World::new();
        world
            .add_system(Watcher::new(health_filter(), &log))
            .unwrap();
        for hp in 0..3 {
            world.add_entity(Entity::new().with(Health(hp)));
        }
        world.add_entity(Entity::named("bare"));

        assert_eq!(world.remove_all_entities(), 4);
        assert_eq!(world.entity_count(), 0);
        let removed = log
            .borrow()
            .iter()
            .filter(|(m, _)| *m == Membership::Removed)
            .count();
        assert_eq!(removed, 3);

        let systems = world.remove_all_systems();
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].name(), std::any::type_name::<Watcher>());
        assert_eq!(world.system_count(), 0);
        world.check_index().unwrap();
    }

    struct Stripper {
        base: SystemBase,
        strip: bool,
        saw_health: Rc<RefCell<Vec<bool>>>,
    }

    impl System for Stripper {
        fn base(&self) -> &SystemBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut SystemBase {
            &mut self.base
        }
        fn execute(&mut self, world: &mut World) -> Result<(), EcsError> {
            if self.strip {
                for id in world.entity_ids_of::<Self>() {
                    world.remove_component::<Health>(id);
                }
            }
            Ok(())
        }
        fn on_entity_remove(&mut self, entity: &Entity) {
            self.saw_health
                .borrow_mut()
                .push(entity.is_present::<Health>());
        }
    }

    #[test]
    fn removal_hook_sees_component_detached_on_both_paths() {
        let saw_health = Rc::new(RefCell::new(Vec::new()));
        let mut world = World::new();
        world
            .add_system(Stripper {
                base: SystemBase::new(health_filter()),
                strip: false,
                saw_health: Rc::clone(&saw_health),
            })
            .unwrap();
        let outside = world.add_entity(Entity::new().with(Health(1)).with(Armor(1)));
        let inside = world.add_entity(Entity::new().with(Health(2)).with(Armor(2)));

        // Immediate delivery.
        assert_eq!(world.remove_component::<Health>(outside), Some(Health(1)));
        assert_eq!(*saw_health.borrow(), vec![false]);

        // Deferred delivery to the executing System.
        world.with_system::<Stripper, _, _>(|s| s.strip = true);
        world.execute_all().unwrap();
        assert_eq!(*saw_health.borrow(), vec![false, false]);
        assert!(!world.entity(inside).unwrap().is_present::<Health>());
        world.check_index().unwrap();
    }

    #[test]
    fn entity_mut_handles_structure() {
        let mut world = World::new();
        let id = world.add_entity(Entity::new());
        {
            let mut e = world.entity_mut(id).unwrap();
            assert!(e.add(Health(4)).is_none());
            e.require_mut::<Health>().unwrap().0 += 1;
            e.set_name("troll");
            assert!(e.require::<Armor>().is_err());
        }
        assert_eq!(world.entity(id).and_then(|e| e.fetch::<Health>()), Some(&Health(5)));
        assert_eq!(world.entity(id).map(Entity::name), Some("troll"));
        assert!(world.entity_mut(id).unwrap().despawn());
        assert!(world.entity_mut(id).is_none());
    }
}
