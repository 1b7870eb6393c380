//! One Pong match: state snapshot, physics, input throttling and lifecycle.

pub mod config;
pub mod engine;
pub mod physics;
pub mod rate_limit;
pub mod state;

pub use config::{MatchConfig, StartPolicy};
pub use engine::{MatchEngine, TickOutcome, TournamentLink};
pub use state::{
    Ball, Canvas, Direction, EndReason, MatchState, MatchStatus, Paddle, Paddles, PlayerSlot,
    Players, Score, Side, format_duration,
};
