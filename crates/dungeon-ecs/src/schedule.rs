//! One logic tick over the registered Systems.
//!
//! Systems run in registration order. Each is checked out of the registry for
//! the duration of its `execute()` call so it can take `&mut World`; hooks
//! aimed at it in the meantime are queued and delivered when it is checked
//! back in.

use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use crate::system::AuthoritativeSide;
use crate::world::World;
use crate::EcsError;

/// One System execution within a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRun {
    pub system: &'static str,
    pub elapsed: Duration,
}

impl World {
    /// Execute one logic tick.
    ///
    /// For every registered System, in order: skip it if paused or if `gate`
    /// rejects its authoritative side; otherwise advance its frame counter
    /// and execute it when its interval has elapsed. Returns the executions
    /// that happened.
    ///
    /// A System that swaps the level ends the tick: the Systems after it
    /// wait for the next tick, so the swap can be handled (see
    /// [`World::take_level_loads`]) before anything else executes.
    ///
    /// # Errors
    ///
    /// Stops at the first failing System and returns
    /// [`EcsError::System`] wrapping its error. The failing System is still
    /// returned to the registry with its queued hooks delivered, and the
    /// tick is not counted.
    pub fn execute_one_tick<F>(&mut self, mut gate: F) -> Result<Vec<SystemRun>, EcsError>
    where
        F: FnMut(AuthoritativeSide) -> bool,
    {
        let order = self.execution_order();
        let mut runs = Vec::new();

        for key in order {
            let Some(mut system) = self.check_out(key) else {
                continue;
            };
            let due = system.is_running()
                && gate(system.authoritative_side())
                && system.base_mut().advance_frame();
            if !due {
                self.check_in(key, system);
                continue;
            }
            let name = system.name();

            let loads_before = self.queued_level_loads();
            let started = Instant::now();
            let result = system.execute(self);
            let elapsed = started.elapsed();
            self.check_in(key, system);

            if let Err(source) = result {
                error!(system = name, error = %source, tick = self.tick, "system failed");
                return Err(EcsError::System {
                    system: name,
                    source: Box::new(source),
                });
            }
            trace!(system = name, elapsed_us = elapsed.as_micros() as u64, "system executed");
            runs.push(SystemRun {
                system: name,
                elapsed,
            });

            if self.queued_level_loads() > loads_before {
                debug!(system = name, "level swapped, ending tick early");
                break;
            }
        }

        self.tick += 1;
        Ok(runs)
    }

    /// Execute one tick with every authoritative side allowed.
    pub fn execute_all(&mut self) -> Result<Vec<SystemRun>, EcsError> {
        self.execute_one_tick(|_| true)
    }

    /// Call `render` on every running System, once, in registration order.
    /// Frame-skip intervals do not apply.
    pub fn render_systems(&mut self, delta: f32) {
        let order = self.execution_order();
        for key in order {
            let Some(mut system) = self.check_out(key) else {
                continue;
            };
            if system.is_running() {
                system.render(self, delta);
            }
            self.check_in(key, system);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
