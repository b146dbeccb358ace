//! The System contract.
//!
//! A System is a stateful unit of game logic. It declares a filter (the
//! component types an entity must carry to be processed), a frame-skip
//! interval and an authoritative side. The [`World`] keeps, per registered
//! System, the exact set of live entities matching its filter and calls the
//! System's hooks whenever an entity enters or leaves that set.
//!
//! Concrete Systems embed a [`SystemBase`] and expose it through
//! [`System::base`] / [`System::base_mut`]; scheduling state and the
//! run/pause toggle are provided methods on top of it.
//!
//! ```
//! use dungeon_ecs::prelude::*;
//!
//! struct Health(u32);
//! impl Component for Health {}
//!
//! struct RegenSystem {
//!     base: SystemBase,
//! }
//!
//! impl System for RegenSystem {
//!     fn base(&self) -> &SystemBase { &self.base }
//!     fn base_mut(&mut self) -> &mut SystemBase { &mut self.base }
//!
//!     fn execute(&mut self, world: &mut World) -> Result<(), EcsError> {
//!         for id in world.entity_ids_of::<Self>() {
//!             if let Some(mut entity) = world.entity_mut(id) {
//!                 entity.require_mut::<Health>()?.0 += 1;
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let regen = RegenSystem {
//!     base: SystemBase::with_interval(ComponentSet::of::<(Health,)>(), 10, AuthoritativeSide::Server)
//!         .unwrap(),
//! };
//! assert_eq!(regen.execute_every_x_frames(), 10);
//! ```

use std::any::{Any, TypeId};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::ComponentSet;
use crate::entity::{Entity, EntityId};
use crate::world::World;
use crate::EcsError;

/// Frame-skip interval meaning "execute every frame".
pub const DEFAULT_EVERY_FRAME_EXECUTE: u32 = 1;

// ---------------------------------------------------------------------------
// AuthoritativeSide
// ---------------------------------------------------------------------------

/// Which execution context a System's effects belong to.
///
/// The ECS core only exposes this value; deciding what runs where is up to
/// the embedding loop or networking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthoritativeSide {
    Client,
    Server,
    Both,
}

impl fmt::Display for AuthoritativeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Client => "client",
            Self::Server => "server",
            Self::Both => "both",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// SystemBase
// ---------------------------------------------------------------------------

/// State shared by every System: its immutable configuration plus the run
/// flag and frame counter the scheduler maintains.
#[derive(Debug, Clone)]
pub struct SystemBase {
    filter: ComponentSet,
    execute_every_x_frames: u32,
    authoritative_side: AuthoritativeSide,
    running: bool,
    last_execute_in_frames: u32,
}

impl SystemBase {
    /// Base executing every frame on the server side.
    pub fn new(filter: ComponentSet) -> Self {
        Self {
            filter,
            execute_every_x_frames: DEFAULT_EVERY_FRAME_EXECUTE,
            authoritative_side: AuthoritativeSide::Server,
            running: true,
            last_execute_in_frames: 0,
        }
    }

    /// Fully specified base.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidFrameInterval`] if `execute_every_x_frames` is zero.
    pub fn with_interval(
        filter: ComponentSet,
        execute_every_x_frames: u32,
        authoritative_side: AuthoritativeSide,
    ) -> Result<Self, EcsError> {
        Self::new(filter)
            .every_x_frames(execute_every_x_frames)
            .map(|base| base.on_side(authoritative_side))
    }

    /// Set the frame-skip interval. `1` executes every frame.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidFrameInterval`] if `frames` is zero.
    pub fn every_x_frames(mut self, frames: u32) -> Result<Self, EcsError> {
        if frames == 0 {
            return Err(EcsError::InvalidFrameInterval { value: frames });
        }
        self.execute_every_x_frames = frames;
        Ok(self)
    }

    /// Set the authoritative side.
    pub fn on_side(mut self, side: AuthoritativeSide) -> Self {
        self.authoritative_side = side;
        self
    }

    pub fn filter(&self) -> &ComponentSet {
        &self.filter
    }

    pub fn execute_every_x_frames(&self) -> u32 {
        self.execute_every_x_frames
    }

    /// Frames elapsed since the last execution.
    pub fn last_execute_in_frames(&self) -> u32 {
        self.last_execute_in_frames
    }

    pub fn set_last_execute_in_frames(&mut self, frames: u32) {
        self.last_execute_in_frames = frames;
    }

    pub fn authoritative_side(&self) -> AuthoritativeSide {
        self.authoritative_side
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Advance the frame counter by one tick. Returns `true` (and resets the
    /// counter) when the interval has elapsed.
    pub(crate) fn advance_frame(&mut self) -> bool {
        self.last_execute_in_frames = self.last_execute_in_frames.saturating_add(1);
        if self.last_execute_in_frames >= self.execute_every_x_frames {
            self.last_execute_in_frames = 0;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// A unit of game logic driven by the scheduler.
///
/// At most one instance of each concrete type can be registered with a
/// [`World`] at a time.
pub trait System: Any {
    fn base(&self) -> &SystemBase;

    fn base_mut(&mut self) -> &mut SystemBase;

    /// Run the System's logic for one due tick.
    ///
    /// The System may freely mutate the world, including removing the
    /// entities it is iterating. Snapshot ids first
    /// ([`World::entity_ids_of`]) rather than holding borrows across
    /// mutations. Hooks triggered for this System while it executes are
    /// delivered right after this call returns.
    fn execute(&mut self, world: &mut World) -> Result<(), EcsError>;

    /// Visual interpolation hook, called once per rendered frame regardless of
    /// the frame-skip interval.
    fn render(&mut self, _world: &World, _delta: f32) {}

    /// Called when `entity` starts matching this System's filter.
    fn on_entity_add(&mut self, _entity: &Entity) {}

    /// Called when `entity` stops matching this System's filter or leaves the
    /// world. A removed component is already gone; an entity leaving the
    /// world still carries all of its components.
    fn on_entity_remove(&mut self, _entity: &Entity) {}

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn filter(&self) -> &ComponentSet {
        self.base().filter()
    }

    fn execute_every_x_frames(&self) -> u32 {
        self.base().execute_every_x_frames()
    }

    fn last_execute_in_frames(&self) -> u32 {
        self.base().last_execute_in_frames()
    }

    fn authoritative_side(&self) -> AuthoritativeSide {
        self.base().authoritative_side()
    }

    fn is_running(&self) -> bool {
        self.base().is_running()
    }

    /// Resume execution. A running System is executed when due.
    fn run(&mut self) {
        if !self.is_running() {
            tracing::debug!(system = self.name(), "system resumed");
        }
        self.base_mut().set_running(true);
    }

    /// Pause execution. A paused System keeps its matching set up to date but
    /// is neither executed nor advances its frame counter.
    fn stop(&mut self) {
        if self.is_running() {
            tracing::debug!(system = self.name(), "system paused");
        }
        self.base_mut().set_running(false);
    }

    /// Ids of every live entity matching an arbitrary filter, regardless of
    /// this System's own filter.
    fn filtered_entity_ids(&self, world: &World, filter: &ComponentSet) -> Vec<EntityId> {
        world.entity_ids_with(filter)
    }
}

// ---------------------------------------------------------------------------
// SystemKey
// ---------------------------------------------------------------------------

/// Registry key of a concrete System type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemKey(TypeId);

impl SystemKey {
    pub fn of<S: System>() -> Self {
        Self(TypeId::of::<S>())
    }

    /// Key of the concrete type behind a trait object.
    pub fn of_dyn(system: &dyn System) -> Self {
        let any: &dyn Any = system;
        Self(any.type_id())
    }
}

impl fmt::Debug for SystemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemKey({:?})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;

    struct Marker;
    impl Component for Marker {}

    struct Idle {
        base: SystemBase,
    }

    impl System for Idle {
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

    #[test]
    fn defaults_every_frame_on_server() {
        let base = SystemBase::new(ComponentSet::empty());
        assert_eq!(base.execute_every_x_frames(), 1);
        assert_eq!(base.authoritative_side(), AuthoritativeSide::Server);
        assert!(base.is_running());
        assert_eq!(base.last_execute_in_frames(), 0);
    }

    #[test]
    fn zero_interval_rejected() {
        let err = SystemBase::with_interval(ComponentSet::empty(), 0, AuthoritativeSide::Both)
            .unwrap_err();
        assert!(matches!(err, EcsError::InvalidFrameInterval { value: 0 }));
    }

    #[test]
    fn advance_frame_fires_on_interval() {
        let mut base = SystemBase::new(ComponentSet::empty())
            .every_x_frames(3)
            .unwrap();
        let fired: Vec<bool> = (0..6).map(|_| base.advance_frame()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true]);
        assert_eq!(base.last_execute_in_frames(), 0);
    }

    #[test]
    fn run_and_stop_toggle() {
        let mut sys = Idle {
            base: SystemBase::new(ComponentSet::of::<(Marker,)>()),
        };
        sys.stop();
        assert!(!sys.is_running());
        sys.stop();
        assert!(!sys.is_running());
        sys.run();
        assert!(sys.is_running());
    }

    #[test]
    fn name_is_type_name() {
        let sys = Idle {
            base: SystemBase::new(ComponentSet::empty()),
        };
        assert!(sys.name().ends_with("Idle"));
    }

    #[test]
    fn key_of_dyn_matches_static() {
        let sys: Box<dyn System> = Box::new(Idle {
            base: SystemBase::new(ComponentSet::empty()),
        });
        assert_eq!(SystemKey::of_dyn(sys.as_ref()), SystemKey::of::<Idle>());
    }

    #[test]
    fn side_displays_lowercase() {
        assert_eq!(AuthoritativeSide::Both.to_string(), "both");
        assert_eq!(AuthoritativeSide::Client.to_string(), "client");
    }
}
