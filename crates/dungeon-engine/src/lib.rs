//! Dungeon Engine -- game loop, configuration and timed actions on top of
//! [`dungeon_ecs`].
//!
//! The ECS core is passive: it exposes each System's frame-skip interval and
//! authoritative side but owns no tick source. This crate supplies one: a
//! [`GameLoop`](tick::GameLoop) that ticks the [`World`](dungeon_ecs::world::World)
//! at a configured rate, gates Systems by the process [`Role`](config::Role),
//! delivers level-load notifications and advances
//! [`DelayedActions`](delayed::DelayedActions).
//!
//! # Quick Start
//!
//! ```
//! use dungeon_engine::prelude::*;
//!
//! let config = LoopConfig::from_json_str(r#"{ "frame_rate": 60, "headless": true }"#).unwrap();
//! let mut game = GameLoop::new(World::new(), config).unwrap();
//! game.actions().schedule(5, |world| {
//!     world.add_entity(Entity::named("chest"));
//! });
//!
//! game.run_ticks(5).unwrap();
//! assert_eq!(game.world().entity_count(), 1);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod delayed;
pub mod logging;
pub mod tick;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use dungeon_ecs;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the engine layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Ecs(#[from] dungeon_ecs::EcsError),

    /// The configuration was not valid JSON for [`LoopConfig`](config::LoopConfig).
    #[error("failed to parse loop configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid loop configuration: {reason}")]
    InvalidConfig { reason: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use dungeon_ecs::prelude::*;

    pub use crate::config::{LoopConfig, Role, DEFAULT_FRAME_RATE};
    pub use crate::delayed::{ActionHandle, DelayedActions};
    pub use crate::tick::{FrameHook, GameLoop, LevelLoadHook, SetupHook, TickDiagnostics};
    pub use crate::EngineError;
}
