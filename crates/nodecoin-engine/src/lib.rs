//! Nodecoin Engine -- deterministic settlement simulation.
//!
//! This crate is the pure core of a Nodecoin node: the seeded RNG, the tick
//! clock, the content catalog, the player state container, the fixed-order
//! tick systems, the command handlers, and the battle resolver. Nothing here
//! performs I/O; persistence, signing, and networking live in the sibling
//! crates and drive this one.
//!
//! # Quick Start
//!
//! ```
//! use nodecoin_engine::prelude::*;
//!
//! let mut state = PlayerState::create_new("p1", "Test", Biome::Forest, 0);
//! let outcome = execute(
//!     &mut state,
//!     &GameCommand { kind: CommandKind::Build { building_id: "choza".into() }, tick: 0 },
//! );
//! assert!(outcome.success);
//! process_tick_range(&mut state, 0, 5).unwrap();
//! assert!(state.building("choza").unwrap().is_completed());
//! ```

#![deny(unsafe_code)]

pub mod battle;
pub mod clock;
pub mod command;
pub mod content;
pub mod formulas;
pub mod rng;
pub mod state;
pub mod systems;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by engine operations.
///
/// Domain failures (a command's preconditions not met) are NOT errors; they
/// are [`command::CommandOutcome`] values. An `EngineError` is either a
/// serialization problem or a broken invariant, and both are fatal to the
/// surrounding tick or command.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// State serialization or deserialization failed.
    #[error("state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A structural invariant of the player state was violated by a tick
    /// system or handler. Always a programming error.
    #[error("state invariant violated: {detail}")]
    InvariantViolation { detail: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::battle::{resolve_battle, BattleReport, BattleSide, BattleWinner};
    pub use crate::clock::{TickClock, DEFAULT_TICK_DURATION_MS};
    pub use crate::command::{execute, CommandKind, CommandOutcome, GameCommand};
    pub use crate::content::{Biome, ResourceKind, UnitKind};
    pub use crate::rng::GameRng;
    pub use crate::state::{PlayerState, Strategy, TradeStatus};
    pub use crate::systems::process_tick_range;
    pub use crate::EngineError;
}
