//! Single-elimination bracket construction.
//!
//! All rounds are created up front. Round 1 pairs players in seeding order;
//! an odd last player gets a bye. Later rounds start `unassigned` and are
//! filled by [`super::advancer`] as feeders complete.

use crate::error::BracketError;
use crate::ids::BracketMatchId;

use super::advancer::{self, Advance};
use super::model::{BracketMatch, Slot, Tournament, TournamentStatus};

/// `ceil(log2 n)`; zero for fewer than two players.
pub fn num_rounds(players: usize) -> u32 {
    if players < 2 {
        return 0;
    }
    (players - 1).ilog2() + 1
}

/// Number of matches in each round, first round first.
pub fn round_sizes(players: usize) -> Vec<u32> {
    let mut sizes = Vec::new();
    let mut count = players.div_ceil(2) as u32;
    for _ in 0..num_rounds(players) {
        sizes.push(count);
        count = count.div_ceil(2);
    }
    sizes
}

/// Build the bracket for a pending tournament and move it to `in_progress`.
///
/// `next_id` allocates bracket match ids (the store owns the sequence).
/// Round-1 byes are completed immediately; the returned [`Advance`] lists
/// the matches that are ready to be played.
pub fn build(
    t: &mut Tournament,
    mut next_id: impl FnMut() -> BracketMatchId,
    now: u64,
) -> Result<Advance, BracketError> {
    if t.status != TournamentStatus::Pending {
        return Err(BracketError::InvalidState("tournament has already started"));
    }
    let seeds: Vec<_> = t.players.keys().copied().collect();
    if seeds.len() < 2 {
        return Err(BracketError::InvalidState("at least two players are required"));
    }

    let sizes = round_sizes(seeds.len());
    let mut matches = Vec::with_capacity(sizes.iter().sum::<u32>() as usize);
    for (i, pair) in seeds.chunks(2).enumerate() {
        let player2 = pair.get(1).map_or(Slot::Bye, |&p| Slot::Player(p));
        matches.push(BracketMatch::new(
            next_id(),
            t.tournament_id,
            1,
            i as u32 + 1,
            Slot::Player(pair[0]),
            player2,
        ));
    }
    for (round, &size) in sizes.iter().enumerate().skip(1) {
        for number in 1..=size {
            matches.push(BracketMatch::new(
                next_id(),
                t.tournament_id,
                round as u32 + 1,
                number,
                Slot::Unassigned,
                Slot::Unassigned,
            ));
        }
    }

    t.matches = matches;
    t.num_rounds = sizes.len() as u32;
    t.status = TournamentStatus::InProgress;
    t.started_at = Some(now);
    tracing::info!(
        "Tournament {} started: {} players, {} rounds, {} matches",
        t.tournament_id,
        seeds.len(),
        t.num_rounds,
        t.matches.len()
    );

    let first_round = sizes.first().copied().unwrap_or(0) as usize;
    let mut advance = Advance::default();
    for idx in 0..first_round {
        if t.status != TournamentStatus::InProgress {
            break;
        }
        advancer::resolve(t, idx, now, &mut advance);
    }
    Ok(advance)
}
