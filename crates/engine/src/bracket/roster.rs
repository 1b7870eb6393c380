//! Pending-tournament roster changes.

use crate::error::BracketError;
use crate::ids::UserId;

use super::model::{Tournament, TournamentPlayer, TournamentStatus};

/// Seat `user` in a pending tournament.
pub fn join(t: &mut Tournament, user: UserId, display_name: &str) -> Result<(), BracketError> {
    if t.status != TournamentStatus::Pending {
        return Err(BracketError::InvalidState("tournament is not accepting players"));
    }
    if t.is_member(user) {
        return Err(BracketError::InvalidState("already joined this tournament"));
    }
    if t.players.len() >= t.max_players {
        return Err(BracketError::Capacity(t.max_players));
    }
    let taken = t
        .players
        .values()
        .any(|p| p.display_name == display_name);
    if taken {
        return Err(BracketError::DuplicateDisplayName(display_name.to_string()));
    }

    t.players.insert(
        user,
        TournamentPlayer {
            user_id: user,
            display_name: display_name.to_string(),
            alive: true,
        },
    );
    Ok(())
}

/// What happened to the tournament when a player left before the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Withdrawal {
    Removed,
    /// The creator left; ownership passed to the next player in join order.
    CreatorReassigned(UserId),
    /// The creator was the only player; the tournament is cancelled.
    Cancelled,
}

/// Remove `user` from a pending tournament.
pub fn withdraw(t: &mut Tournament, user: UserId, now: u64) -> Result<Withdrawal, BracketError> {
    if t.status != TournamentStatus::Pending {
        return Err(BracketError::InvalidState("tournament is not pending"));
    }
    if t.players.shift_remove(&user).is_none() {
        return Err(BracketError::NotAParticipant(user));
    }
    if user != t.creator_id {
        return Ok(Withdrawal::Removed);
    }

    match t.players.first() {
        Some((&next, _)) => {
            t.creator_id = next;
            Ok(Withdrawal::CreatorReassigned(next))
        }
        None => {
            t.status = TournamentStatus::Cancelled;
            t.ended_at = Some(now);
            Ok(Withdrawal::Cancelled)
        }
    }
}
