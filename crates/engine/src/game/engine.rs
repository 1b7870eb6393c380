//! Lifecycle owner of a single match.
//!
//! A [`MatchEngine`] is always accessed under its per-match lock (see
//! [`crate::registry`]). Every method is synchronous and cheap; nothing here
//! blocks or awaits.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::MatchError;
use crate::ids::{BracketMatchId, MatchId, TournamentId, UserId};

use super::config::{MatchConfig, StartPolicy};
use super::physics;
use super::rate_limit::RateLimiter;
use super::state::{Direction, EndReason, MatchState, MatchStatus, PlayerSlot, Side};

/// Back-reference from a game to the bracket slot it decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TournamentLink {
    pub tournament_id: TournamentId,
    pub bracket_match_id: BracketMatchId,
}

/// Result of one [`MatchEngine::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub scored: Option<Side>,
    pub paddle_hit: Option<Side>,
    /// The match reached `finished` on this tick.
    pub finished: bool,
}

pub struct MatchEngine {
    state: MatchState,
    creator: UserId,
    config: Arc<MatchConfig>,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    limiter: RateLimiter,
    tournament: Option<TournamentLink>,
    created_at: u64,
    last_activity: u64,
    ticks: u64,
    /// Bumped on every mutation; lets the store reject stale writes.
    revision: u64,
    finalization_claimed: bool,
}

impl MatchEngine {
    /// New waiting match with `player1` seated and the ball served.
    pub fn create(
        match_id: MatchId,
        player1: UserId,
        player1_name: impl Into<String>,
        config: Arc<MatchConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_rng(
            match_id,
            player1,
            player1_name.into(),
            config,
            clock,
            StdRng::from_entropy(),
        )
    }

    /// Like [`MatchEngine::create`] but with a reproducible serve sequence.
    pub fn with_seed(
        match_id: MatchId,
        player1: UserId,
        player1_name: impl Into<String>,
        config: Arc<MatchConfig>,
        clock: Arc<dyn Clock>,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            match_id,
            player1,
            player1_name.into(),
            config,
            clock,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        match_id: MatchId,
        player1: UserId,
        player1_name: String,
        config: Arc<MatchConfig>,
        clock: Arc<dyn Clock>,
        mut rng: StdRng,
    ) -> Self {
        let mut state = MatchState::new(match_id, &config);
        state.players.player1 = Some(PlayerSlot {
            id: player1,
            display_name: player1_name,
            is_ready: false,
        });
        physics::serve(&mut state.ball, &state.canvas, config.serve_speed, &mut rng);

        let now = clock.now_ms();
        let limiter = RateLimiter::new(config.move_interval);
        Self {
            state,
            creator: player1,
            config,
            clock,
            rng,
            limiter,
            tournament: None,
            created_at: now,
            last_activity: now,
            ticks: 0,
            revision: 1,
            finalization_claimed: false,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn id(&self) -> MatchId {
        self.state.match_id
    }

    /// The user who created the match (always player1).
    pub fn creator(&self) -> UserId {
        self.creator
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Owned copy for publishing or persisting outside the lock.
    pub fn snapshot(&self) -> MatchState {
        self.state.clone()
    }

    pub fn status(&self) -> MatchStatus {
        self.state.status
    }

    pub fn is_finished(&self) -> bool {
        self.state.status.is_finished()
    }

    pub fn side_of(&self, user: UserId) -> Option<Side> {
        self.state.players.side_of(user)
    }

    pub fn has_player(&self, user: UserId) -> bool {
        self.side_of(user).is_some()
    }

    pub fn tournament(&self) -> Option<TournamentLink> {
        self.tournament
    }

    pub fn set_tournament(&mut self, link: TournamentLink) {
        self.tournament = Some(link);
        self.revision += 1;
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Last join, ready, accepted move or goal.
    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Seat `player2`. Moves to `ready_pending`, or straight to `playing`
    /// under [`StartPolicy::ImmediateOnJoin`].
    pub fn join(
        &mut self,
        player2: UserId,
        player2_name: impl Into<String>,
    ) -> Result<&MatchState, MatchError> {
        if self.state.status != MatchStatus::Waiting {
            return Err(MatchError::NotJoinable("match is not waiting for an opponent"));
        }
        if self.state.players.id(Side::Player1) == Some(player2) {
            return Err(MatchError::NotJoinable("cannot join your own match"));
        }

        self.state.players.player2 = Some(PlayerSlot {
            id: player2,
            display_name: player2_name.into(),
            is_ready: false,
        });
        self.state.status = MatchStatus::ReadyPending;
        self.touch();
        tracing::info!("Match {}: user {} joined", self.id(), player2);

        if self.config.start_policy == StartPolicy::ImmediateOnJoin {
            self.start();
        }
        Ok(&self.state)
    }

    /// Mark `user` ready; the second ready starts play. Repeated calls are no-ops.
    pub fn set_ready(&mut self, user: UserId) -> Result<&MatchState, MatchError> {
        let side = self.side_of(user).ok_or(MatchError::NotAParticipant(user))?;
        match self.state.status {
            MatchStatus::ReadyPending => {}
            MatchStatus::Playing => return Ok(&self.state),
            MatchStatus::Waiting => {
                return Err(MatchError::NotJoinable("match is still waiting for an opponent"));
            }
            MatchStatus::Finished => {
                return Err(MatchError::NotJoinable("match is already finished"));
            }
        }

        let Some(slot) = self.state.players.get_mut(side) else {
            return Err(MatchError::NotAParticipant(user));
        };
        if slot.is_ready {
            return Ok(&self.state);
        }
        slot.is_ready = true;
        self.touch();

        if self.state.players.both_ready() {
            self.start();
        }
        Ok(&self.state)
    }

    fn start(&mut self) {
        self.state.status = MatchStatus::Playing;
        self.state.started_at = Some(self.clock.now_ms());
        let speed = self.config.serve_speed;
        physics::serve(&mut self.state.ball, &self.state.canvas, speed, &mut self.rng);
        self.touch();
        tracing::info!("Match {} started", self.id());
    }

    /// Move the caller's paddle. Returns `false` when the input was ignored:
    /// not playing, not a participant, or throttled.
    pub fn move_paddle(&mut self, user: UserId, direction: Direction) -> bool {
        if self.state.status != MatchStatus::Playing {
            return false;
        }
        let Some(side) = self.side_of(user) else {
            return false;
        };
        if !self.limiter.try_acquire(side, self.clock.now_ms()) {
            return false;
        }
        physics::move_paddle(self.state.paddles.get_mut(side), direction, &self.config);
        self.touch();
        true
    }

    /// One physics step. A no-op unless playing.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state.status != MatchStatus::Playing {
            return TickOutcome::default();
        }

        let events = physics::step(&mut self.state, &self.config, &mut self.rng);
        self.ticks += 1;
        self.revision += 1;

        if let Some(side) = events.scored {
            self.last_activity = self.clock.now_ms();
            tracing::debug!(
                "Match {}: {:?} scored ({}-{})",
                self.id(),
                side,
                self.state.score.player1,
                self.state.score.player2
            );
            if self.state.score.get(side) >= self.config.win_score {
                let winner = self.state.score.leader();
                self.finish(EndReason::ScoreLimit, winner);
            }
        }

        TickOutcome {
            scored: events.scored,
            paddle_hit: events.paddle_hit,
            finished: self.is_finished(),
        }
    }

    /// Force the match to `finished`. A named `leaver` hands the win to the
    /// opponent when there is one; otherwise the higher score wins and a tie
    /// has no winner. No-op on an already finished match.
    pub fn end(&mut self, reason: EndReason, leaver: Option<UserId>) -> &MatchState {
        if self.is_finished() {
            return &self.state;
        }
        let by_forfeit = leaver
            .and_then(|u| self.side_of(u))
            .map(Side::opponent)
            .filter(|side| self.state.players.get(*side).is_some());
        let winner = by_forfeit.or_else(|| self.state.score.leader());
        self.finish(reason, winner);
        &self.state
    }

    fn finish(&mut self, reason: EndReason, winner: Option<Side>) {
        let now = self.clock.now_ms();
        self.state.duration_seconds = self
            .state
            .started_at
            .map(|start| now.saturating_sub(start) / 1000)
            .unwrap_or(0);
        self.state.status = MatchStatus::Finished;
        self.state.winner = winner;
        self.state.end_reason = Some(reason);
        self.revision += 1;
        self.last_activity = now;
        tracing::info!(
            "Match {} finished ({:?}): {}-{}, winner {:?}, {}",
            self.id(),
            reason,
            self.state.score.player1,
            self.state.score.player2,
            self.state.winner_id(),
            self.state.duration_formatted()
        );
    }

    /// Grants the right to finalize exactly once, and only once finished.
    pub fn claim_finalization(&mut self) -> bool {
        if !self.is_finished() || self.finalization_claimed {
            return false;
        }
        self.finalization_claimed = true;
        true
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.last_activity = self.clock.now_ms();
    }
}
