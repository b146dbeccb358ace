//! Property tests for the World Index.
//!
//! Random sequences of structural mutations must leave every System's
//! matching set equal to a from-scratch evaluation of its filter, and the set
//! each System rebuilt from its own hooks must agree with the index.

use std::collections::BTreeSet;
use std::rc::Rc;

use dungeon_ecs::prelude::*;
use proptest::prelude::*;

struct A;
impl Component for A {}
struct B;
impl Component for B {}
struct C;
impl Component for C {}

macro_rules! tracking_system {
    ($name:ident) => {
        struct $name {
            base: SystemBase,
            seen: BTreeSet<EntityId>,
        }

        impl $name {
            fn new(filter: ComponentSet) -> Self {
                Self {
                    base: SystemBase::new(filter),
                    seen: BTreeSet::new(),
                }
            }
        }

        impl System for $name {
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
                assert!(self.seen.insert(entity.id()), "double add of {}", entity.id());
            }
            fn on_entity_remove(&mut self, entity: &Entity) {
                assert!(self.seen.remove(&entity.id()), "stray remove of {}", entity.id());
            }
        }
    };
}

tracking_system!(OnlyA);
tracking_system!(BothAB);
tracking_system!(PairBC);
tracking_system!(Everything);

#[derive(Debug, Clone)]
enum Op {
    Spawn(u8),
    Despawn(usize),
    Add(usize, u8),
    Remove(usize, u8),
    RegisterBC,
    UnregisterBC,
    SwapLevel(u8),
    Persist(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..8).prop_map(Op::Spawn),
        2 => (0..64usize).prop_map(Op::Despawn),
        4 => (0..64usize, 0u8..3).prop_map(|(i, t)| Op::Add(i, t)),
        3 => (0..64usize, 0u8..3).prop_map(|(i, t)| Op::Remove(i, t)),
        1 => Just(Op::RegisterBC),
        1 => Just(Op::UnregisterBC),
        1 => (0u8..3).prop_map(Op::SwapLevel),
        1 => (0..64usize).prop_map(Op::Persist),
    ]
}

fn pick(world: &World, i: usize) -> Option<EntityId> {
    let ids: Vec<EntityId> = world.entities().map(Entity::id).collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids[i % ids.len()])
    }
}

fn add_type(world: &mut World, id: EntityId, t: u8) {
    let Some(mut e) = world.entity_mut(id) else {
        return;
    };
    match t {
        0 => {
            let _ = e.add(A);
        }
        1 => {
            let _ = e.add(B);
        }
        _ => {
            let _ = e.add(C);
        }
    }
}

fn remove_type(world: &mut World, id: EntityId, t: u8) {
    let Some(mut e) = world.entity_mut(id) else {
        return;
    };
    match t {
        0 => {
            let _ = e.remove::<A>();
        }
        1 => {
            let _ = e.remove::<B>();
        }
        _ => {
            let _ = e.remove::<C>();
        }
    }
}

fn hooks_agree<S: System>(world: &World, seen: impl Fn(&S) -> &BTreeSet<EntityId>) -> bool {
    match world.system::<S>() {
        Some(system) => seen(system).iter().copied().collect::<Vec<_>>() == world.entity_ids_of::<S>(),
        None => true,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn index_matches_filters_after_random_ops(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut world = World::new();
        world.add_system(OnlyA::new(ComponentSet::of::<(A,)>())).unwrap();
        world.add_system(BothAB::new(ComponentSet::of::<(A, B)>())).unwrap();
        world.add_system(Everything::new(ComponentSet::empty())).unwrap();

        for op in ops {
            match op {
                Op::Spawn(mask) => {
                    let mut e = Entity::new();
                    if mask & 1 != 0 { e.add(A); }
                    if mask & 2 != 0 { e.add(B); }
                    if mask & 4 != 0 { e.add(C); }
                    world.add_entity(e);
                }
                Op::Despawn(i) => {
                    if let Some(id) = pick(&world, i) {
                        prop_assert!(world.remove_entity(id));
                        prop_assert!(!world.contains_entity(id));
                    }
                }
                Op::Add(i, t) => {
                    if let Some(id) = pick(&world, i) {
                        add_type(&mut world, id, t);
                    }
                }
                Op::Remove(i, t) => {
                    if let Some(id) = pick(&world, i) {
                        remove_type(&mut world, id, t);
                    }
                }
                Op::RegisterBC => {
                    world.add_system(PairBC::new(ComponentSet::of::<(B, C)>())).unwrap();
                }
                Op::UnregisterBC => {
                    if let Some(old) = world.remove_system::<PairBC>().unwrap() {
                        prop_assert!(old.seen.is_empty());
                    }
                }
                Op::SwapLevel(n) => {
                    world.set_current_level(Rc::new(GridLevel::new(format!("level-{n}"), 2, 2)));
                }
                Op::Persist(i) => {
                    if let Some(id) = pick(&world, i) {
                        if let Some(mut e) = world.entity_mut(id) {
                            e.set_persistent(true);
                        }
                    }
                }
            }

            prop_assert_eq!(world.check_index(), Ok(()));
            prop_assert!(hooks_agree::<OnlyA>(&world, |s| &s.seen));
            prop_assert!(hooks_agree::<BothAB>(&world, |s| &s.seen));
            prop_assert!(hooks_agree::<PairBC>(&world, |s| &s.seen));
            prop_assert!(hooks_agree::<Everything>(&world, |s| &s.seen));
        }
    }
}
