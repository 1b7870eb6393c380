//! Bracket progression.
//!
//! One authoritative path moves a tournament forward: [`complete_match`]
//! records a result, checks for tournament completion, then fills the next
//! round slot once every existing feeder is done. Byes and walkovers
//! resolve through the same path, recursively, so their downstream effects
//! are identical to a played match.
//!
//! Pairing rule: slot `n` of round `r` feeds slot `ceil(n / 2)` of round
//! `r + 1`; the odd feeder fills `player1`, the even feeder `player2`.

use crate::error::BracketError;
use crate::ids::{BracketMatchId, MatchId, UserId};

use super::model::{BracketMatchStatus, Slot, Tournament, TournamentStatus};

/// Everything a single bracket transition changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advance {
    /// The match was already completed; nothing changed.
    pub duplicate: bool,
    /// Matches completed without play (byes, walkovers).
    pub auto_completed: Vec<BracketMatchId>,
    /// Matches that now have two live players and need an engine.
    pub ready: Vec<BracketMatchId>,
    /// Open matches cancelled because the tournament ended.
    pub cancelled: Vec<BracketMatchId>,
    /// The tournament reached `completed` during this transition.
    pub tournament_completed: bool,
}

impl Advance {
    fn duplicate() -> Self {
        Self {
            duplicate: true,
            ..Self::default()
        }
    }

    /// Fold another transition's effects into this one.
    pub fn merge(&mut self, other: Advance) {
        self.auto_completed.extend(other.auto_completed);
        self.ready.extend(other.ready);
        self.cancelled.extend(other.cancelled);
        self.tournament_completed |= other.tournament_completed;
    }
}

/// Record `winner` for `match_id` and propagate.
///
/// Completing an already completed match is a successful no-op, so a
/// duplicate notification can never advance the bracket twice.
pub fn complete_match(
    t: &mut Tournament,
    match_id: BracketMatchId,
    winner: UserId,
    now: u64,
) -> Result<Advance, BracketError> {
    let idx = t
        .match_index(match_id)
        .ok_or(BracketError::MatchNotFound(match_id))?;
    let m = &t.matches[idx];
    if m.status == BracketMatchStatus::Completed {
        return Ok(Advance::duplicate());
    }
    if t.status != TournamentStatus::InProgress || m.status == BracketMatchStatus::Cancelled {
        return Err(BracketError::InvalidState("match can no longer be completed"));
    }
    if !m.has_player(winner) {
        return Err(BracketError::NotAParticipant(winner));
    }
    let loser = m.opponent_of(winner);

    let mut advance = Advance::default();
    record_result(t, idx, winner, loser, now, &mut advance);
    Ok(advance)
}

/// Mark a pending, fully seated match as being played by `game`.
pub fn launch(
    t: &mut Tournament,
    match_id: BracketMatchId,
    game: MatchId,
    now: u64,
) -> Result<(), BracketError> {
    let m = t
        .matches
        .iter_mut()
        .find(|m| m.match_id == match_id)
        .ok_or(BracketError::MatchNotFound(match_id))?;
    if m.status != BracketMatchStatus::Pending || m.players().is_none() {
        return Err(BracketError::InvalidState("match is not ready to launch"));
    }
    m.status = BracketMatchStatus::InProgress;
    m.linked_game_id = Some(game);
    m.started_at = Some(now);
    Ok(())
}

/// Point an in-progress match at a replacement game (after a restart lost
/// the original engine).
pub fn relink(
    t: &mut Tournament,
    match_id: BracketMatchId,
    game: MatchId,
) -> Result<(), BracketError> {
    let m = t
        .matches
        .iter_mut()
        .find(|m| m.match_id == match_id)
        .ok_or(BracketError::MatchNotFound(match_id))?;
    if m.status != BracketMatchStatus::InProgress {
        return Err(BracketError::InvalidState("only in-progress matches can be relinked"));
    }
    m.linked_game_id = Some(game);
    Ok(())
}

/// Outcome of an in-progress forfeit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forfeit {
    /// The playable match the forfeit decided, if there was one.
    pub match_id: Option<BracketMatchId>,
    pub opponent: Option<UserId>,
    /// Live game that must now be ended with reason `forfeit`.
    pub linked_game_id: Option<MatchId>,
    pub advance: Advance,
}

/// Eliminate `user` from an in-progress tournament.
///
/// If the user currently faces a seated opponent, that match is completed in
/// the opponent's favour. Otherwise the elimination is recorded and resolves
/// later as a walkover when the user's next slot fills.
pub fn forfeit(t: &mut Tournament, user: UserId, now: u64) -> Result<Forfeit, BracketError> {
    if t.status != TournamentStatus::InProgress {
        return Err(BracketError::InvalidState("tournament is not in progress"));
    }
    if !t.is_member(user) {
        return Err(BracketError::NotAParticipant(user));
    }
    if !t.is_alive(user) {
        return Err(BracketError::InvalidState("player is already eliminated"));
    }

    if let Some(m) = t.playable_match_for(user) {
        let match_id = m.match_id;
        let linked_game_id = m.linked_game_id;
        let Some(opponent) = m.opponent_of(user) else {
            return Err(BracketError::InvalidState("match has no opponent"));
        };
        let advance = complete_match(t, match_id, opponent, now)?;
        return Ok(Forfeit {
            match_id: Some(match_id),
            opponent: Some(opponent),
            linked_game_id,
            advance,
        });
    }

    t.eliminate(user);
    let mut advance = Advance::default();
    let alive = t.alive_players();
    if alive.len() <= 1 {
        complete_tournament(t, alive.first().copied(), now, &mut advance);
    }
    Ok(Forfeit {
        advance,
        ..Forfeit::default()
    })
}

// ── Internal propagation ─────────────────────────────────────────────────

fn record_result(
    t: &mut Tournament,
    idx: usize,
    winner: UserId,
    loser: Option<UserId>,
    now: u64,
    advance: &mut Advance,
) {
    let (round, number) = {
        let m = &mut t.matches[idx];
        m.winner_id = Some(winner);
        m.status = BracketMatchStatus::Completed;
        m.ended_at = Some(now);
        (m.round_number, m.match_number)
    };
    if let Some(loser) = loser {
        t.eliminate(loser);
    }
    tracing::debug!(
        "Tournament {}: round {} match {} won by {}",
        t.tournament_id,
        round,
        number,
        winner
    );

    let alive = t.alive_players();
    if alive.len() <= 1 || round >= t.num_rounds {
        let champion = if alive.len() == 1 { alive[0] } else { winner };
        complete_tournament(t, Some(champion), now, advance);
        return;
    }

    advance_from(t, round, number, now, advance);
}

/// Populate the next-round slot fed by `(round, number)` once every existing
/// feeder of it has completed.
fn advance_from(t: &mut Tournament, round: u32, number: u32, now: u64, advance: &mut Advance) {
    let odd = if number % 2 == 1 { number } else { number - 1 };
    let even = odd + 1;

    let feeder = |n: u32| -> Option<Option<UserId>> {
        let idx = t.slot_index(round, n)?;
        let m = &t.matches[idx];
        Some((m.status == BracketMatchStatus::Completed).then_some(m.winner_id).flatten())
    };
    let (first, second) = (feeder(odd), feeder(even));

    // `None` = feeder does not exist (bye slot); `Some(None)` = not done yet.
    let slot_for = |f: Option<Option<UserId>>| match f {
        None => Some(Slot::Bye),
        Some(Some(user)) => Some(Slot::Player(user)),
        Some(None) => None,
    };
    let (Some(player1), Some(player2)) = (slot_for(first), slot_for(second)) else {
        return;
    };

    let Some(next) = t.slot_index(round + 1, number.div_ceil(2)) else {
        tracing::warn!(
            "Tournament {}: no round {} slot for match {}",
            t.tournament_id,
            round + 1,
            number
        );
        return;
    };
    let m = &mut t.matches[next];
    if m.status != BracketMatchStatus::Pending || m.player1 != Slot::Unassigned {
        return;
    }
    m.player1 = player1;
    m.player2 = player2;
    resolve(t, next, now, advance);
}

/// Decide what a freshly seated match needs: play, a bye, or a walkover.
pub(crate) fn resolve(t: &mut Tournament, idx: usize, now: u64, advance: &mut Advance) {
    let m = &t.matches[idx];
    let id = m.match_id;
    match (m.player1, m.player2) {
        (Slot::Player(a), Slot::Bye) | (Slot::Bye, Slot::Player(a)) => {
            advance.auto_completed.push(id);
            record_result(t, idx, a, None, now, advance);
        }
        (Slot::Player(a), Slot::Player(b)) => match (t.is_alive(a), t.is_alive(b)) {
            (true, true) => advance.ready.push(id),
            (false, true) => {
                advance.auto_completed.push(id);
                record_result(t, idx, b, Some(a), now, advance);
            }
            // Walkover for `a`, or both gone: `a` advances as the placeholder.
            (_, false) => {
                advance.auto_completed.push(id);
                record_result(t, idx, a, Some(b), now, advance);
            }
        },
        _ => {}
    }
}

fn complete_tournament(
    t: &mut Tournament,
    winner: Option<UserId>,
    now: u64,
    advance: &mut Advance,
) {
    t.status = TournamentStatus::Completed;
    t.winner_id = winner;
    t.ended_at = Some(now);
    for m in t.matches.iter_mut().filter(|m| m.status.is_open()) {
        m.status = BracketMatchStatus::Cancelled;
        m.ended_at = Some(now);
        advance.cancelled.push(m.match_id);
    }
    advance.tournament_completed = true;
    tracing::info!(
        "Tournament {} completed, winner {:?}",
        t.tournament_id,
        t.winner_id
    );
}
