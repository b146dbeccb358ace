//! The game loop driving a [`World`].
//!
//! Each [`GameLoop::tick`]:
//!
//! 1. runs the setup hook if it has not run yet;
//! 2. hands every level swap recorded since the previous tick to the
//!    level-load hook, after moving the hero onto the new level's start tile;
//! 3. executes the registered Systems the configured [`Role`] is
//!    authoritative for, stopping early if one of them swaps the level, in
//!    which case that swap is handed to the level-load hook right away;
//! 4. advances the loop's [`DelayedActions`];
//! 5. calls the frame hook.
//!
//! Rendering is a separate call site ([`GameLoop::render`]) on the visual
//! cadence; it never mutates entity membership.
//!
//! # Example
//!
//! ```
//! use dungeon_engine::prelude::*;
//!
//! let config = LoopConfig { headless: true, ..Default::default() };
//! let mut game = GameLoop::new(World::new(), config).unwrap();
//! game.on_setup(|world| {
//!     world.add_entity(Entity::named("hero"));
//!     Ok(())
//! });
//!
//! game.run_ticks(10).unwrap();
//! assert_eq!(game.tick_count(), 10);
//! assert_eq!(game.world().entity_count(), 1);
//! ```

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use dungeon_ecs::level::Position;
use dungeon_ecs::world::{LevelLoad, World};

use crate::config::{LoopConfig, Role};
use crate::delayed::DelayedActions;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Runs once, before the first tick.
pub type SetupHook = Box<dyn FnOnce(&mut World) -> Result<(), EngineError>>;

/// Runs once per tick after every System executed.
pub type FrameHook = Box<dyn FnMut(&mut World)>;

/// Runs once per level swap, before the next tick's System executions.
pub type LevelLoadHook = Box<dyn FnMut(&mut World, &LevelLoad)>;

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per executed System, in execution order.
    pub system_times: Vec<(&'static str, Duration)>,
    /// Total time for the tick, hooks included.
    pub total_time: Duration,
    /// Delayed actions that ran this tick.
    pub actions_run: usize,
    /// Level swaps handled at the start of this tick.
    pub level_loads: usize,
}

// ---------------------------------------------------------------------------
// GameLoop
// ---------------------------------------------------------------------------

/// Fixed-rate driver owning the [`World`].
pub struct GameLoop {
    world: World,
    config: LoopConfig,
    actions: DelayedActions,
    on_setup: Option<SetupHook>,
    on_frame: Option<FrameHook>,
    on_level_load: Option<LevelLoadHook>,
    set_up: bool,
    tick_counter: u64,
    last_diagnostics: TickDiagnostics,
}

impl GameLoop {
    /// Wrap `world` with a validated configuration.
    pub fn new(world: World, config: LoopConfig) -> Result<Self, EngineError> {
        config.validate()?;
        info!(
            frame_rate = config.frame_rate,
            headless = config.headless,
            role = ?config.role,
            "game loop created"
        );
        Ok(Self {
            world,
            config,
            actions: DelayedActions::new(),
            on_setup: None,
            on_frame: None,
            on_level_load: None,
            set_up: false,
            tick_counter: 0,
            last_diagnostics: TickDiagnostics::default(),
        })
    }

    // -- hooks --------------------------------------------------------------

    /// Set the hook run once before the first tick. Replaces a previous one
    /// that has not run yet.
    pub fn on_setup<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnOnce(&mut World) -> Result<(), EngineError> + 'static,
    {
        self.on_setup = Some(Box::new(hook));
        self
    }

    pub fn on_frame<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&mut World) + 'static,
    {
        self.on_frame = Some(Box::new(hook));
        self
    }

    pub fn on_level_load<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&mut World, &LevelLoad) + 'static,
    {
        self.on_level_load = Some(Box::new(hook));
        self
    }

    // -- driving ------------------------------------------------------------

    /// Run the setup hook if it has not run yet. Called by the first
    /// [`tick`](Self::tick); call it directly to set up without ticking.
    pub fn setup(&mut self) -> Result<(), EngineError> {
        if self.set_up {
            return Ok(());
        }
        self.set_up = true;
        info!("setting up game");
        if let Some(hook) = self.on_setup.take() {
            hook(&mut self.world)?;
        }
        Ok(())
    }

    /// Execute one logic tick.
    ///
    /// # Errors
    ///
    /// A failing setup hook or System stops the tick and is returned. The
    /// frame hook and delayed actions do not run for a failed tick.
    pub fn tick(&mut self) -> Result<&TickDiagnostics, EngineError> {
        let tick_start = Instant::now();
        self.setup()?;

        let mut level_loads = self.handle_level_loads();

        let role = self.config.role;
        let runs = self
            .world
            .execute_one_tick(|side| role.executes(side))?;
        // A System swapped the level and the rest of the tick was cut short.
        level_loads += self.handle_level_loads();

        let actions_run = self.actions.advance(&mut self.world);
        if let Some(hook) = self.on_frame.as_mut() {
            hook(&mut self.world);
        }

        self.tick_counter += 1;
        self.last_diagnostics = TickDiagnostics {
            system_times: runs.into_iter().map(|r| (r.system, r.elapsed)).collect(),
            total_time: tick_start.elapsed(),
            actions_run,
            level_loads,
        };
        Ok(&self.last_diagnostics)
    }

    /// Run `count` ticks back to back. Returns the number of ticks run.
    pub fn run_ticks(&mut self, count: u64) -> Result<u64, EngineError> {
        for _ in 0..count {
            self.tick()?;
        }
        Ok(count)
    }

    /// Run `count` ticks holding the configured frame rate. Headless loops
    /// do not sleep.
    pub fn run_paced(&mut self, count: u64) -> Result<u64, EngineError> {
        let budget = self.config.frame_duration();
        for _ in 0..count {
            let started = Instant::now();
            self.tick()?;
            if self.config.headless {
                continue;
            }
            let spent = started.elapsed();
            match budget.checked_sub(spent) {
                Some(rest) => thread::sleep(rest),
                None => debug!(
                    tick = self.tick_counter,
                    overrun_us = (spent - budget).as_micros() as u64,
                    "tick over budget"
                ),
            }
        }
        Ok(count)
    }

    /// Call every running System's render hook. Skipped when headless.
    pub fn render(&mut self, delta: f32) {
        if self.config.headless {
            return;
        }
        self.world.render_systems(delta);
    }

    /// Place the hero, then pass each pending level swap to the hook.
    fn handle_level_loads(&mut self) -> usize {
        let loads = self.world.take_level_loads();
        for load in &loads {
            self.place_hero_on_start();
            if let Some(hook) = self.on_level_load.as_mut() {
                hook(&mut self.world, load);
            }
        }
        loads.len()
    }

    fn place_hero_on_start(&mut self) {
        let Some(start) = self.world.current_level().and_then(|l| l.start_tile()) else {
            return;
        };
        let Some(hero) = self.world.hero_id() else {
            return;
        };
        let Some(mut entity) = self.world.entity_mut(hero) else {
            return;
        };
        match entity.require_mut::<Position>() {
            Ok(position) => *position = Position::from(start.coordinate),
            Err(err) => warn!(error = %err, "hero not placed on level start"),
        }
    }

    // -- accessors ----------------------------------------------------------

    /// The number of ticks completed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Simulation time in seconds, `tick_count * fixed_dt`.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.config.fixed_dt()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn is_headless(&self) -> bool {
        self.config.headless
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn into_world(self) -> World {
        self.world
    }

    /// The loop's delayed-action queue, advanced once per tick.
    pub fn actions(&mut self) -> &mut DelayedActions {
        &mut self.actions
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
