//! Per-user statistics and match history, derived from durable game records.

use pong_engine::game::{EndReason, Side};
use pong_engine::ids::{MatchId, UserId};
use serde::Serialize;

use crate::store::{DurableStore, GameRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    pub games_played: u64,
    pub games_won: u64,
    /// Finished games someone else won. Ties count as neither.
    pub defeats: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub game_id: MatchId,
    pub score_player1: u32,
    pub score_player2: u32,
    pub player1_id: UserId,
    pub player1_name: Option<String>,
    pub player2_id: Option<UserId>,
    pub player2_name: Option<String>,
    pub winner_id: Option<UserId>,
    pub end_reason: Option<EndReason>,
    pub duration_formatted: String,
    /// Creation time, ms since the Unix epoch.
    pub timestamp: u64,
    pub tournament: bool,
}

impl HistoryEntry {
    fn from_record(record: &GameRecord) -> Self {
        let name = |side: Side| {
            record
                .state
                .players
                .get(side)
                .map(|p| p.display_name.clone())
        };
        Self {
            game_id: record.game_id,
            score_player1: record.score_player1,
            score_player2: record.score_player2,
            player1_id: record.player1_id,
            player1_name: name(Side::Player1),
            player2_id: record.player2_id,
            player2_name: name(Side::Player2),
            winner_id: record.winner_id,
            end_reason: record.end_reason,
            duration_formatted: record.duration_formatted.clone(),
            timestamp: record.created_at,
            tournament: record.tournament_match.is_some(),
        }
    }
}

fn finished_games_of(store: &dyn DurableStore, user: UserId) -> Vec<GameRecord> {
    let mut games: Vec<GameRecord> = store
        .games()
        .into_iter()
        .filter(|g| g.is_finished() && g.involves(user))
        .collect();
    games.sort_by_key(|g| (g.created_at, g.game_id.0));
    games
}

pub fn stats_for(store: &dyn DurableStore, user: UserId) -> PlayerStats {
    finished_games_of(store, user)
        .iter()
        .fold(PlayerStats::default(), |mut stats, game| {
            stats.games_played += 1;
            match game.winner_id {
                Some(winner) if winner == user => stats.games_won += 1,
                Some(_) => stats.defeats += 1,
                None => {}
            }
            stats
        })
}

/// Finished games of `user`, oldest first.
pub fn history_for(store: &dyn DurableStore, user: UserId) -> Vec<HistoryEntry> {
    finished_games_of(store, user)
        .iter()
        .map(HistoryEntry::from_record)
        .collect()
}
