//! Incremental System membership tracking.
//!
//! The [`WorldIndex`] keeps two structures in sync with the live entity
//! population:
//!
//! - a reverse index `component type -> entities carrying it`, and
//! - one *subset* per registered System holding exactly the live entities
//!   whose component types are a superset of that System's filter.
//!
//! Every structural mutation is reported here synchronously and answered with
//! the list of membership [`Transition`]s it caused; the World turns those
//! into `on_entity_add` / `on_entity_remove` calls. The index never touches
//! entity objects, only ids and type tokens.
//!
//! Cost model:
//!
//! - component added: only Systems whose filter names that type are
//!   considered, and each non-member is re-tested against its full filter
//!   (`O(filter)` lookups in the reverse index);
//! - component removed: every member of a System naming that type drops out
//!   without any re-test, since losing one required type always breaks the
//!   match.

use std::collections::{BTreeSet, HashMap};

use crate::component::{ComponentSet, ComponentType};
use crate::entity::EntityId;
use crate::system::SystemKey;

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    Added,
    Removed,
}

/// One entity entering or leaving one System's subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub system: SystemKey,
    pub entity: EntityId,
    pub membership: Membership,
}

// ---------------------------------------------------------------------------
// IndexStats
// ---------------------------------------------------------------------------

/// Counters describing the work the index has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Per-entity full filter re-tests.
    pub filter_checks: u64,
    /// Set queries answered from the reverse index while attaching Systems
    /// or repopulating after a level swap.
    pub queries: u64,
    /// Entities that entered a System's subset.
    pub added: u64,
    /// Entities that left a System's subset.
    pub removed: u64,
}

// ---------------------------------------------------------------------------
// WorldIndex
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Subset {
    key: SystemKey,
    filter: ComponentSet,
    members: BTreeSet<EntityId>,
}

/// Reverse component index plus per-System matching subsets.
///
/// Subsets are kept in System registration order so hooks fire in a stable
/// order.
#[derive(Debug, Default)]
pub(crate) struct WorldIndex {
    live: BTreeSet<EntityId>,
    by_type: HashMap<ComponentType, BTreeSet<EntityId>>,
    subsets: Vec<Subset>,
    /// Component type -> positions in `subsets` whose filter names it.
    watchers: HashMap<ComponentType, Vec<usize>>,
    stats: IndexStats,
}

impl WorldIndex {
    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// A new entity became live carrying `types`.
    pub fn entity_registered(
        &mut self,
        entity: EntityId,
        types: &[ComponentType],
    ) -> Vec<Transition> {
        let inserted = self.live.insert(entity);
        debug_assert!(inserted, "entity {entity} registered twice");
        for &ty in types {
            self.by_type.entry(ty).or_default().insert(entity);
        }

        let mut out = Vec::new();
        for subset in &mut self.subsets {
            if satisfies(&self.by_type, entity, &subset.filter, &mut self.stats) {
                subset.members.insert(entity);
                self.stats.added += 1;
                out.push(Transition {
                    system: subset.key,
                    entity,
                    membership: Membership::Added,
                });
            }
        }
        out
    }

    /// A live entity carrying `types` is leaving the world.
    pub fn entity_unregistered(
        &mut self,
        entity: EntityId,
        types: &[ComponentType],
    ) -> Vec<Transition> {
        if !self.live.remove(&entity) {
            return Vec::new();
        }

        let mut out = Vec::new();
        for subset in &mut self.subsets {
            if subset.members.remove(&entity) {
                self.stats.removed += 1;
                out.push(Transition {
                    system: subset.key,
                    entity,
                    membership: Membership::Removed,
                });
            }
        }
        for ty in types {
            if let Some(set) = self.by_type.get_mut(ty) {
                set.remove(&entity);
                if set.is_empty() {
                    self.by_type.remove(ty);
                }
            }
        }
        out
    }

    // -- component mutations ------------------------------------------------

    /// `entity` now carries a component of type `ty` (new or replaced).
    pub fn component_added(&mut self, entity: EntityId, ty: ComponentType) -> Vec<Transition> {
        if !self.live.contains(&entity) {
            return Vec::new();
        }
        if !self.by_type.entry(ty).or_default().insert(entity) {
            // Replacement of an existing component: the type set is unchanged.
            return Vec::new();
        }

        let mut out = Vec::new();
        let Some(positions) = self.watchers.get(&ty) else {
            return out;
        };
        for &pos in positions {
            let subset = &mut self.subsets[pos];
            if subset.members.contains(&entity) {
                continue;
            }
            if satisfies(&self.by_type, entity, &subset.filter, &mut self.stats) {
                subset.members.insert(entity);
                self.stats.added += 1;
                out.push(Transition {
                    system: subset.key,
                    entity,
                    membership: Membership::Added,
                });
            }
        }
        out
    }

    /// `entity` no longer carries a component of type `ty`.
    pub fn component_removed(&mut self, entity: EntityId, ty: ComponentType) -> Vec<Transition> {
        if !self.live.contains(&entity) {
            return Vec::new();
        }
        let was_indexed = match self.by_type.get_mut(&ty) {
            Some(set) => {
                let removed = set.remove(&entity);
                if set.is_empty() {
                    self.by_type.remove(&ty);
                }
                removed
            }
            None => false,
        };
        debug_assert!(was_indexed, "entity {entity} lost untracked component {ty}");

        let mut out = Vec::new();
        let Some(positions) = self.watchers.get(&ty) else {
            return out;
        };
        for &pos in positions {
            let subset = &mut self.subsets[pos];
            if subset.members.remove(&entity) {
                self.stats.removed += 1;
                out.push(Transition {
                    system: subset.key,
                    entity,
                    membership: Membership::Removed,
                });
            }
        }
        out
    }

    // -- System lifecycle ---------------------------------------------------

    /// Start tracking a System at `position` in registration order. Every
    /// currently matching entity is reported as added (catch-up).
    pub fn attach(
        &mut self,
        key: SystemKey,
        filter: ComponentSet,
        position: usize,
    ) -> Vec<Transition> {
        debug_assert!(
            !self.subsets.iter().any(|s| s.key == key),
            "system {key:?} attached twice"
        );
        let members: BTreeSet<EntityId> =
            query_in(&self.live, &self.by_type, &filter, &mut self.stats)
                .into_iter()
                .collect();
        self.stats.added += members.len() as u64;
        let out = members
            .iter()
            .map(|&entity| Transition {
                system: key,
                entity,
                membership: Membership::Added,
            })
            .collect();

        let position = position.min(self.subsets.len());
        self.subsets.insert(
            position,
            Subset {
                key,
                filter,
                members,
            },
        );
        self.rebuild_watchers();
        out
    }

    /// Stop tracking a System. Every member is reported as removed.
    pub fn detach(&mut self, key: SystemKey) -> Vec<Transition> {
        let Some(pos) = self.subsets.iter().position(|s| s.key == key) else {
            return Vec::new();
        };
        let subset = self.subsets.remove(pos);
        self.rebuild_watchers();
        self.stats.removed += subset.members.len() as u64;
        subset
            .members
            .into_iter()
            .map(|entity| Transition {
                system: key,
                entity,
                membership: Membership::Removed,
            })
            .collect()
    }

    // -- full reindex -------------------------------------------------------

    /// Empty every subset and forget the whole population. Returns a removal
    /// for every membership that existed, System by System.
    pub fn clear(&mut self) -> Vec<Transition> {
        let mut out = Vec::new();
        for subset in &mut self.subsets {
            let members = std::mem::take(&mut subset.members);
            self.stats.removed += members.len() as u64;
            out.extend(members.into_iter().map(|entity| Transition {
                system: subset.key,
                entity,
                membership: Membership::Removed,
            }));
        }
        self.live.clear();
        self.by_type.clear();
        out
    }

    /// Rebuild from a fresh population, then fill every subset. Returns an
    /// addition for every resulting membership, System by System.
    pub fn repopulate<I>(&mut self, population: I) -> Vec<Transition>
    where
        I: IntoIterator<Item = (EntityId, Vec<ComponentType>)>,
    {
        debug_assert!(self.live.is_empty(), "repopulate without clear");
        for (entity, types) in population {
            self.live.insert(entity);
            for ty in types {
                self.by_type.entry(ty).or_default().insert(entity);
            }
        }

        let mut out = Vec::new();
        for subset in &mut self.subsets {
            let matches = query_in(&self.live, &self.by_type, &subset.filter, &mut self.stats);
            self.stats.added += matches.len() as u64;
            for entity in matches {
                subset.members.insert(entity);
                out.push(Transition {
                    system: subset.key,
                    entity,
                    membership: Membership::Added,
                });
            }
        }
        out
    }

    // -- queries ------------------------------------------------------------

    /// Ids of all live entities carrying every type in `filter`, ascending.
    ///
    /// Read-only, so ad-hoc queries are not reflected in [`IndexStats`].
    pub fn query(&self, filter: &ComponentSet) -> Vec<EntityId> {
        let mut scratch = IndexStats::default();
        query_in(&self.live, &self.by_type, filter, &mut scratch)
    }

    /// Current subset of a System, ascending by id.
    pub fn members(&self, key: SystemKey) -> Option<&BTreeSet<EntityId>> {
        self.subsets
            .iter()
            .find(|s| s.key == key)
            .map(|s| &s.members)
    }

    pub fn contains(&self, key: SystemKey, entity: EntityId) -> bool {
        self.members(key).is_some_and(|m| m.contains(&entity))
    }

    /// Check every subset against a from-scratch evaluation.
    ///
    /// `types_of` must return the component types of a live entity.
    pub fn verify<F>(&self, types_of: F) -> Result<(), String>
    where
        F: Fn(EntityId) -> Option<ComponentSet>,
    {
        for &entity in &self.live {
            let Some(types) = types_of(entity) else {
                return Err(format!("index tracks entity {entity} the world does not hold"));
            };
            for ty in types.iter() {
                if !self.by_type.get(&ty).is_some_and(|s| s.contains(&entity)) {
                    return Err(format!("reverse index misses {ty} on entity {entity}"));
                }
            }
            for subset in &self.subsets {
                let expected = subset.filter.is_subset(&types);
                if expected != subset.members.contains(&entity) {
                    return Err(format!(
                        "entity {entity} membership in {:?} is {}, filter {} says {}",
                        subset.key,
                        !expected,
                        subset.filter,
                        expected
                    ));
                }
            }
        }
        for subset in &self.subsets {
            if let Some(stray) = subset.members.iter().find(|e| !self.live.contains(e)) {
                return Err(format!("{:?} holds dead entity {stray}", subset.key));
            }
        }
        Ok(())
    }

    fn rebuild_watchers(&mut self) {
        self.watchers.clear();
        for (pos, subset) in self.subsets.iter().enumerate() {
            for ty in subset.filter.iter() {
                self.watchers.entry(ty).or_default().push(pos);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether `entity` carries every type of `filter`, answered from the reverse
/// index alone.
fn satisfies(
    by_type: &HashMap<ComponentType, BTreeSet<EntityId>>,
    entity: EntityId,
    filter: &ComponentSet,
    stats: &mut IndexStats,
) -> bool {
    stats.filter_checks += 1;
    filter
        .iter()
        .all(|ty| by_type.get(&ty).is_some_and(|set| set.contains(&entity)))
}

/// Intersect the reverse-index sets of `filter`, starting from the smallest.
fn query_in(
    live: &BTreeSet<EntityId>,
    by_type: &HashMap<ComponentType, BTreeSet<EntityId>>,
    filter: &ComponentSet,
    stats: &mut IndexStats,
) -> Vec<EntityId> {
    stats.queries += 1;
    if filter.is_empty() {
        return live.iter().copied().collect();
    }

    let mut sets = Vec::with_capacity(filter.len());
    for ty in filter.iter() {
        match by_type.get(&ty) {
            Some(set) => sets.push(set),
            None => return Vec::new(),
        }
    }
    sets.sort_by_key(|set| set.len());
    let Some((smallest, rest)) = sets.split_first() else {
        return Vec::new();
    };
    smallest
        .iter()
        .filter(|entity| rest.iter().all(|set| set.contains(entity)))
        .copied()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
