//! Durable records and the store they live in.
//!
//! [`DurableStore`] is the seam to whatever backs persistence. The shipped
//! implementation, [`MemoryStore`], keeps records in `DashMap`s, tracks which
//! ones changed since the last snapshot, and is flushed to JSON files by
//! [`crate::persistence`].
//!
//! Two write disciplines:
//!   - Game records are revision-guarded: a write carrying a lower revision
//!     than the stored one, or un-finishing a finished game, is rejected as
//!     `Stale`. The last real write always wins.
//!   - Tournament records are versioned: updates are compare-and-swap on the
//!     version the caller read, failing with `Conflict` otherwise.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use pong_engine::bracket::Tournament;
use pong_engine::game::{EndReason, MatchEngine, MatchState, MatchStatus, TournamentLink};
use pong_engine::ids::{MatchId, TournamentId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },
    #[error("stale write: stored revision {stored}, attempted {attempted}")]
    Stale { stored: u64, attempted: u64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// ── Records ──────────────────────────────────────────────────────────────

/// One row per match ever created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: MatchId,
    pub player1_id: UserId,
    pub player2_id: Option<UserId>,
    pub status: MatchStatus,
    pub score_player1: u32,
    pub score_player2: u32,
    pub winner_id: Option<UserId>,
    pub duration: u64,
    pub duration_formatted: String,
    pub end_reason: Option<EndReason>,
    pub tournament_match: Option<TournamentLink>,
    pub created_at: u64,
    pub updated_at: u64,
    pub revision: u64,
    pub state: MatchState,
}

impl GameRecord {
    pub fn from_engine(engine: &MatchEngine, now: u64) -> Self {
        let state = engine.snapshot();
        Self {
            game_id: state.match_id,
            player1_id: engine.creator(),
            player2_id: state.players.player2.as_ref().map(|p| p.id),
            status: state.status,
            score_player1: state.score.player1,
            score_player2: state.score.player2,
            winner_id: state.winner_id(),
            duration: state.duration_seconds,
            duration_formatted: state.duration_formatted(),
            end_reason: state.end_reason,
            tournament_match: engine.tournament(),
            created_at: engine.created_at(),
            updated_at: now,
            revision: engine.revision(),
            state,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.player1_id == user || self.player2_id == Some(user)
    }

    /// Finish a record whose engine is gone (process restart). Score decides
    /// the winner; a tie has none.
    pub fn close(&mut self, reason: EndReason, now: u64) {
        if self.is_finished() {
            return;
        }
        let state = &mut self.state;
        state.duration_seconds = state
            .started_at
            .map(|start| now.saturating_sub(start) / 1000)
            .unwrap_or(0);
        state.status = MatchStatus::Finished;
        state.winner = state.score.leader();
        state.end_reason = Some(reason);

        self.status = MatchStatus::Finished;
        self.winner_id = state.winner_id();
        self.duration = state.duration_seconds;
        self.duration_formatted = state.duration_formatted();
        self.end_reason = Some(reason);
        self.updated_at = now;
        self.revision += 1;
    }
}

/// A record plus the version its compare-and-swap updates are keyed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

// ── Store seam ───────────────────────────────────────────────────────────

pub trait DurableStore: Send + Sync + 'static {
    /// Next value of the store-wide id sequence (tournaments, bracket slots).
    fn next_id(&self) -> u64;

    fn put_game(&self, record: &GameRecord) -> Result<(), StoreError>;
    fn get_game(&self, id: MatchId) -> Option<GameRecord>;
    fn delete_game(&self, id: MatchId) -> Result<(), StoreError>;
    fn games(&self) -> Vec<GameRecord>;

    fn insert_tournament(&self, t: &Tournament) -> Result<Versioned<Tournament>, StoreError>;
    fn get_tournament(&self, id: TournamentId) -> Option<Versioned<Tournament>>;
    /// Replace the record iff its version is still `expected`. Returns the
    /// new version.
    fn update_tournament(&self, t: &Tournament, expected: u64) -> Result<u64, StoreError>;
    fn tournaments(&self) -> Vec<Versioned<Tournament>>;
}

/// Identifies a record for dirty tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Game(MatchId),
    Tournament(TournamentId),
}

// ── In-memory implementation ─────────────────────────────────────────────

pub struct MemoryStore {
    games: DashMap<MatchId, GameRecord>,
    tournaments: DashMap<TournamentId, Versioned<Tournament>>,
    next_id: AtomicU64,
    /// Records changed since the last snapshot.
    dirty: DashSet<RecordKey>,
    /// Records removed since the last snapshot.
    deleted: DashSet<RecordKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            games: DashMap::new(),
            tournaments: DashMap::new(),
            next_id: AtomicU64::new(1),
            dirty: DashSet::new(),
            deleted: DashSet::new(),
        }
    }

    /// Insert a loaded game without marking it dirty.
    pub fn restore_game(&self, record: GameRecord) {
        self.games.insert(record.game_id, record);
    }

    /// Insert a loaded tournament without marking it dirty.
    pub fn restore_tournament(&self, record: Versioned<Tournament>) {
        self.tournaments.insert(record.value.tournament_id, record);
    }

    /// Current id sequence position (persisted alongside the records).
    pub fn id_watermark(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Never moves the sequence backwards.
    pub fn raise_id_watermark(&self, at_least: u64) {
        self.next_id.fetch_max(at_least, Ordering::SeqCst);
    }

    /// Drain the dirty set. A record dirtied between collect and remove is
    /// simply written again next time.
    pub fn take_dirty(&self) -> Vec<RecordKey> {
        let keys: Vec<RecordKey> = self.dirty.iter().map(|k| *k).collect();
        for key in &keys {
            self.dirty.remove(key);
        }
        keys
    }

    pub fn take_deleted(&self) -> Vec<RecordKey> {
        let keys: Vec<RecordKey> = self.deleted.iter().map(|k| *k).collect();
        for key in &keys {
            self.deleted.remove(key);
        }
        keys
    }

    /// Re-mark records whose save did not complete.
    pub fn requeue_dirty(&self, keys: &[RecordKey]) {
        for key in keys {
            self.dirty.insert(*key);
        }
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    fn mark_dirty(&self, key: RecordKey) {
        self.deleted.remove(&key);
        self.dirty.insert(key);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore for MemoryStore {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn put_game(&self, record: &GameRecord) -> Result<(), StoreError> {
        match self.games.entry(record.game_id) {
            Entry::Occupied(mut stored) => {
                let current = stored.get();
                let regresses = current.is_finished() && !record.is_finished();
                if record.revision < current.revision || regresses {
                    return Err(StoreError::Stale {
                        stored: current.revision,
                        attempted: record.revision,
                    });
                }
                stored.insert(record.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }
        self.mark_dirty(RecordKey::Game(record.game_id));
        Ok(())
    }

    fn get_game(&self, id: MatchId) -> Option<GameRecord> {
        self.games.get(&id).map(|r| r.clone())
    }

    fn delete_game(&self, id: MatchId) -> Result<(), StoreError> {
        self.games.remove(&id).ok_or(StoreError::NotFound)?;
        self.dirty.remove(&RecordKey::Game(id));
        self.deleted.insert(RecordKey::Game(id));
        Ok(())
    }

    fn games(&self) -> Vec<GameRecord> {
        self.games.iter().map(|r| r.value().clone()).collect()
    }

    fn insert_tournament(&self, t: &Tournament) -> Result<Versioned<Tournament>, StoreError> {
        let record = Versioned {
            version: 1,
            value: t.clone(),
        };
        match self.tournaments.entry(t.tournament_id) {
            Entry::Occupied(existing) => {
                return Err(StoreError::Conflict {
                    expected: 0,
                    actual: existing.get().version,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }
        self.mark_dirty(RecordKey::Tournament(t.tournament_id));
        Ok(record)
    }

    fn get_tournament(&self, id: TournamentId) -> Option<Versioned<Tournament>> {
        self.tournaments.get(&id).map(|r| r.clone())
    }

    fn update_tournament(&self, t: &Tournament, expected: u64) -> Result<u64, StoreError> {
        let version = {
            let mut stored = self
                .tournaments
                .get_mut(&t.tournament_id)
                .ok_or(StoreError::NotFound)?;
            if stored.version != expected {
                return Err(StoreError::Conflict {
                    expected,
                    actual: stored.version,
                });
            }
            stored.version += 1;
            stored.value = t.clone();
            stored.version
        };
        self.mark_dirty(RecordKey::Tournament(t.tournament_id));
        Ok(version)
    }

    fn tournaments(&self) -> Vec<Versioned<Tournament>> {
        self.tournaments.iter().map(|r| r.value().clone()).collect()
    }
}
