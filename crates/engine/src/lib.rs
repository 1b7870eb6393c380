//! Authoritative Pong match engine and tournament bracket state machine.
//!
//! Everything in this crate is synchronous and I/O-free: the server crate
//! owns tasks, timers, storage and fan-out, and drives these types.

pub mod bracket;
pub mod clock;
pub mod error;
pub mod game;
pub mod ids;
pub mod registry;

pub use error::{BracketError, MatchError};
pub use ids::{BracketMatchId, MatchId, TournamentId, UserId};
