//! Dungeon ECS -- entity/component/system core with incremental filter
//! maintenance.
//!
//! Entities are containers holding at most one component per type. Systems
//! declare a filter (a [`ComponentSet`](component::ComponentSet)) and the
//! [`World`](world::World) keeps, for each registered System, the exact set
//! of live entities whose components satisfy it. Structural changes update
//! those sets synchronously and fire the Systems' `on_entity_add` /
//! `on_entity_remove` hooks, so a System never scans the whole population.
//!
//! # Quick Start
//!
//! ```
//! use dungeon_ecs::prelude::*;
//!
//! struct Velocity { dx: f32, dy: f32 }
//! impl Component for Velocity {}
//!
//! struct Movement { base: SystemBase }
//!
//! impl System for Movement {
//!     fn base(&self) -> &SystemBase { &self.base }
//!     fn base_mut(&mut self) -> &mut SystemBase { &mut self.base }
//!
//!     fn execute(&mut self, world: &mut World) -> Result<(), EcsError> {
//!         for id in world.entity_ids_of::<Self>() {
//!             let Some(mut entity) = world.entity_mut(id) else { continue };
//!             let (dx, dy) = {
//!                 let v = entity.require::<Velocity>()?;
//!                 (v.dx, v.dy)
//!             };
//!             let p = entity.require_mut::<Position>()?;
//!             p.x += dx;
//!             p.y += dy;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut world = World::new();
//! world
//!     .add_system(Movement { base: SystemBase::new(ComponentSet::of::<(Position, Velocity)>()) })
//!     .unwrap();
//! let id = world.add_entity(
//!     Entity::new()
//!         .with(Position::new(0.0, 0.0))
//!         .with(Velocity { dx: 1.0, dy: 0.5 }),
//! );
//!
//! world.execute_all().unwrap();
//! assert_eq!(world.entity(id).and_then(|e| e.fetch::<Position>()), Some(&Position::new(1.0, 0.5)));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod index;
pub mod level;
pub mod schedule;
pub mod system;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// An entity lacks a component an operation required.
    #[error("entity {entity} ('{name}') has no component {component}")]
    MissingComponent {
        entity: entity::EntityId,
        name: String,
        component: &'static str,
    },

    /// The entity is not live in the current level.
    #[error("entity {entity} is not live in the current level")]
    UnknownEntity { entity: entity::EntityId },

    /// A System was configured to execute every zero frames.
    #[error("frame interval must be at least 1, got {value}")]
    InvalidFrameInterval { value: u32 },

    /// A System type was registered or removed while it was executing.
    #[error("system {system} is executing and cannot be replaced or removed")]
    SystemBusy { system: &'static str },

    /// A System's `execute()` failed.
    #[error("system {system} failed: {source}")]
    System {
        system: &'static str,
        #[source]
        source: Box<EcsError>,
    },

    /// Game-specific failure raised from System code.
    #[error(transparent)]
    Custom(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl EcsError {
    /// Wrap any error raised by game code.
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Custom(Box::new(error))
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentSet, ComponentTuple, ComponentType};
    pub use crate::entity::{Entity, EntityId};
    pub use crate::index::{IndexStats, Membership};
    pub use crate::level::{Coordinate, GridLevel, Level, Position, Tile, TileKind};
    pub use crate::schedule::SystemRun;
    pub use crate::system::{
        AuthoritativeSide, System, SystemBase, SystemKey, DEFAULT_EVERY_FRAME_EXECUTE,
    };
    pub use crate::world::{EntityMut, LevelLoad, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
