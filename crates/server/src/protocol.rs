//! JSON wire messages, tagged by `type`.

use pong_engine::bracket::{BracketMatchStatus, Tournament, TournamentStatus};
use pong_engine::game::{Direction, EndReason, MatchState, MatchStatus, Score, Side};
use pong_engine::ids::{BracketMatchId, MatchId, TournamentId, UserId};
use serde::{Deserialize, Serialize};

use crate::dashboard::MatchSummary;
use crate::history::{HistoryEntry, PlayerStats};
use crate::tournament::TournamentSummary;

// ── Client → server ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateGame,
    JoinGame {
        /// Omitted: join the oldest open match.
        #[serde(default)]
        game_id: Option<MatchId>,
    },
    PlayerReady {
        game_id: MatchId,
    },
    PaddleMove {
        game_id: MatchId,
        direction: Direction,
    },
    TournamentCreate {
        name: String,
        display_name: String,
        #[serde(default)]
        max_players: Option<usize>,
    },
    TournamentJoin {
        tournament_id: TournamentId,
        display_name: String,
    },
    TournamentStart {
        tournament_id: TournamentId,
    },
    TournamentForfeit {
        tournament_id: TournamentId,
    },
    TournamentWatch {
        tournament_id: TournamentId,
    },
    GetStats {
        #[serde(default)]
        user_id: Option<UserId>,
    },
    GetHistory {
        #[serde(default)]
        user_id: Option<UserId>,
    },
    /// The caller's live match, else an open one to join.
    GameStatus,
    ListGames,
    ListTournaments,
    PlayerTournaments {
        #[serde(default)]
        user_id: Option<UserId>,
    },
}

// ── Server → client ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Tick,
    PlayerReady,
    GameStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatusKind {
    /// The caller is seated in a live match.
    Active,
    /// A match the caller could join.
    Waiting,
    NoGame,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        user_id: UserId,
        message: String,
    },
    GameCreated {
        game_id: MatchId,
        player_id: UserId,
        game_state: MatchState,
    },
    GameJoined {
        game_id: MatchId,
        player1_id: Option<UserId>,
        player2_id: Option<UserId>,
        status: MatchStatus,
        game_state: MatchState,
    },
    GameStateUpdate {
        game_id: MatchId,
        update_type: UpdateType,
        game_state: MatchState,
    },
    GameEnd {
        game_id: MatchId,
        winner_id: Option<UserId>,
        winner: Option<Side>,
        duration: u64,
        duration_formatted: String,
        score: Score,
        end_reason: Option<EndReason>,
    },
    MatchReady {
        tournament_id: TournamentId,
        match_id: BracketMatchId,
        game_id: MatchId,
        round_number: u32,
        player1_id: UserId,
        player2_id: UserId,
    },
    MatchReadyNotification {
        tournament_id: TournamentId,
        match_id: BracketMatchId,
        game_id: MatchId,
        player1_id: UserId,
        player1_name: String,
        player2_id: UserId,
        player2_name: String,
    },
    MatchUpdate {
        tournament_id: TournamentId,
        match_id: BracketMatchId,
        status: BracketMatchStatus,
        winner_id: Option<UserId>,
        forfeit: bool,
        forfeited_by: Option<UserId>,
    },
    TournamentUpdate {
        tournament_id: TournamentId,
        status: TournamentStatus,
        winner_id: Option<UserId>,
        tournament: Tournament,
    },
    TournamentCreated {
        tournament: Tournament,
    },
    PlayerJoined {
        tournament_id: TournamentId,
        user_id: UserId,
        display_name: String,
        player_count: usize,
    },
    Stats {
        user_id: UserId,
        stats: PlayerStats,
    },
    History {
        user_id: UserId,
        games: Vec<HistoryEntry>,
    },
    GameStatus {
        status: GameStatusKind,
        game_id: Option<MatchId>,
        game_state: Option<MatchState>,
    },
    ActiveGames {
        games: Vec<MatchSummary>,
    },
    ActiveTournaments {
        tournaments: Vec<TournamentSummary>,
    },
    PlayerTournaments {
        user_id: UserId,
        tournaments: Vec<TournamentSummary>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn state_update(update_type: UpdateType, state: MatchState) -> Self {
        ServerMessage::GameStateUpdate {
            game_id: state.match_id,
            update_type,
            game_state: state,
        }
    }

    pub fn game_end(state: &MatchState) -> Self {
        ServerMessage::GameEnd {
            game_id: state.match_id,
            winner_id: state.winner_id(),
            winner: state.winner,
            duration: state.duration_seconds,
            duration_formatted: state.duration_formatted(),
            score: state.score,
            end_reason: state.end_reason,
        }
    }

    pub fn tournament_update(t: &Tournament) -> Self {
        ServerMessage::TournamentUpdate {
            tournament_id: t.tournament_id,
            status: t.status,
            winner_id: t.winner_id,
            tournament: t.clone(),
        }
    }

    /// Wire form. Serialization of these types cannot fail in practice; a
    /// failure degrades to a generic error frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize outbound message: {}", e);
            r#"{"type":"error","message":"internal error"}"#.to_string()
        })
    }
}
