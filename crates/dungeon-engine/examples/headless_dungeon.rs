//! Headless dungeon: a hero and a few monsters on a small map, a wandering
//! System and a regeneration System with a frame-skip interval.
//!
//! Run with: `RUST_LOG=debug cargo run -p dungeon-engine --example headless_dungeon`

use std::rc::Rc;

use dungeon_engine::logging;
use dungeon_engine::prelude::*;

const MAP: &str = "
    #######
    #S....#
    #.#.#.#
    #....E#
    #######
";

#[derive(Debug)]
struct Health {
    current: u32,
    max: u32,
}
impl Component for Health {}

#[derive(Debug)]
struct Wander {
    dx: i32,
}
impl Component for Wander {}

/// Paces wandering entities back and forth along accessible tiles.
struct WanderSystem {
    base: SystemBase,
}

impl System for WanderSystem {
    fn base(&self) -> &SystemBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut SystemBase {
        &mut self.base
    }
    fn execute(&mut self, world: &mut World) -> Result<(), EcsError> {
        let Some(level) = world.current_level_handle() else {
            return Ok(());
        };
        for id in world.entity_ids_of::<Self>() {
            let Some(mut entity) = world.entity_mut(id) else {
                continue;
            };
            let here = entity.require::<Position>()?.coordinate();
            let dx = entity.require::<Wander>()?.dx;
            let next = Coordinate::new(here.x + dx, here.y);
            let open = level.tile_at(next).is_some_and(|t| t.kind.is_accessible());
            if open {
                *entity.require_mut::<Position>()? = Position::from(next);
            } else {
                entity.require_mut::<Wander>()?.dx = -dx;
            }
        }
        Ok(())
    }
}

/// Restores one point of health every few ticks.
struct RegenSystem {
    base: SystemBase,
}

impl System for RegenSystem {
    fn base(&self) -> &SystemBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut SystemBase {
        &mut self.base
    }
    fn execute(&mut self, world: &mut World) -> Result<(), EcsError> {
        for id in world.entity_ids_of::<Self>() {
            if let Some(mut entity) = world.entity_mut(id) {
                let health = entity.require_mut::<Health>()?;
                health.current = (health.current + 1).min(health.max);
            }
        }
        Ok(())
    }
}

fn main() -> Result<(), EngineError> {
    logging::init("info");

    let config = LoopConfig::from_json_str(r#"{ "frame_rate": 20, "headless": true }"#)?;
    let mut game = GameLoop::new(World::new(), config)?;

    game.on_setup(|world| {
        world.add_system(WanderSystem {
            base: SystemBase::new(ComponentSet::of::<(Position, Wander)>()),
        })?;
        world.add_system(RegenSystem {
            base: SystemBase::with_interval(
                ComponentSet::of::<(Health,)>(),
                5,
                AuthoritativeSide::Both,
            )?,
        })?;

        let hero = world.add_entity(
            Entity::named("hero")
                .with(Position::default())
                .with(Health { current: 3, max: 10 }),
        );
        world.set_hero(hero);
        world.set_current_level(Rc::new(GridLevel::from_ascii("crypt", MAP)));

        for (i, x) in [2, 4].into_iter().enumerate() {
            world.add_entity(
                Entity::named(format!("skeleton-{i}"))
                    .with(Position::new(x as f32, 3.0))
                    .with(Wander { dx: 1 }),
            );
        }
        Ok(())
    })
    .on_level_load(|_, load| {
        tracing::info!(level = %load.level, first_load = load.first_load, "entered level");
    })
    .on_frame(|world| {
        if world.current_tick() % 10 == 0 {
            let positions: Vec<String> = world
                .entities_with(&ComponentSet::of::<(Wander,)>())
                .filter_map(|e| e.fetch::<Position>().map(|p| format!("{}@{}", e.name(), p.coordinate())))
                .collect();
            tracing::info!(tick = world.current_tick(), ?positions, "monsters");
        }
    });

    game.run_paced(40)?;

    if let Some(health) = game.world().hero().and_then(|h| h.fetch::<Health>()) {
        tracing::info!(current = health.current, max = health.max, "hero health");
    }
    let diagnostics = game.last_diagnostics();
    tracing::info!(
        systems = diagnostics.system_times.len(),
        total_us = diagnostics.total_time.as_micros() as u64,
        "last tick"
    );
    Ok(())
}
