//! Single-elimination tournaments: the durable record, bracket construction
//! and the advancement state machine.

pub mod advancer;
pub mod builder;
pub mod model;
pub mod roster;

pub use advancer::{Advance, Forfeit, complete_match, forfeit, launch, relink};
pub use builder::{build, num_rounds, round_sizes};
pub use model::{
    BracketMatch, BracketMatchStatus, Slot, Tournament, TournamentPlayer, TournamentStatus,
};
pub use roster::{Withdrawal, join, withdraw};
