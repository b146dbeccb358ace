//! Loop configuration.
//!
//! [`LoopConfig`] is plain serde data so it can come from a JSON file next to
//! the game, with every field optional.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use dungeon_ecs::system::AuthoritativeSide;

use crate::EngineError;

/// Default logic tick rate, in ticks per second.
pub const DEFAULT_FRAME_RATE: u32 = 30;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which part of a (possibly networked) game this process plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Single process owning everything: every System runs.
    #[default]
    Standalone,
    /// Runs client-side and shared Systems.
    Client,
    /// Runs server-side and shared Systems.
    Server,
}

impl Role {
    /// Whether a System with the given authoritative side executes here.
    pub fn executes(self, side: AuthoritativeSide) -> bool {
        match (self, side) {
            (Role::Standalone, _) => true,
            (_, AuthoritativeSide::Both) => true,
            (Role::Client, AuthoritativeSide::Client) => true,
            (Role::Server, AuthoritativeSide::Server) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// LoopConfig
// ---------------------------------------------------------------------------

/// Configuration of the [`GameLoop`](crate::tick::GameLoop).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Logic ticks per second. Must be at least 1.
    pub frame_rate: u32,
    /// No rendering, and paced runs tick as fast as possible.
    pub headless: bool,
    pub role: Role,
}

impl Default for LoopConfig {
    /// 30 ticks per second, windowed, standalone.
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            headless: false,
            role: Role::Standalone,
        }
    }
}

impl LoopConfig {
    /// Parse and validate a JSON configuration. Missing fields take their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.frame_rate == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "frame_rate must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// Seconds per logic tick.
    pub fn fixed_dt(&self) -> f64 {
        1.0 / f64::from(self.frame_rate.max(1))
    }

    /// Wall-clock budget of one tick.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.fixed_dt())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
