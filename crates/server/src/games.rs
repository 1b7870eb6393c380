//! Match operations behind the WebSocket handlers.
//!
//! [`GameService`] owns the path from a client action to engine mutation,
//! durable record and published message. Engine locks are taken through
//! [`registry::lock`] and always released before publishing, persisting or
//! touching another match.
//!
//! Finalization is exactly-once: whoever wins [`MatchEngine::claim_finalization`]
//! (simulation loop, disconnect, forfeit or sweeper) calls [`GameService::finalize`],
//! which writes the final record, publishes `game_end`, reports tournament
//! outcomes and evicts the engine.

use std::sync::Arc;

use pong_engine::clock::Clock;
use pong_engine::game::{
    Direction, EndReason, MatchConfig, MatchEngine, MatchState, MatchStatus, TournamentLink,
};
use pong_engine::ids::{MatchId, UserId};
use pong_engine::registry::{self, MatchHandle, MatchRegistry};
use tokio::sync::mpsc;

use crate::app::Shared;
use crate::dashboard::{self, MatchSummary, Metrics};
use crate::error::ServiceError;
use crate::persistence::PersistQueue;
use crate::protocol::{GameStatusKind, ServerMessage, UpdateType};
use crate::pubsub::{PubSub, Topic};
use crate::simulation::{self, LoopConfig};
use crate::store::{GameRecord, StoreError};

/// A finished tournament game, reported to the tournament controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub game_id: MatchId,
    pub link: TournamentLink,
    pub winner_id: Option<UserId>,
    pub end_reason: Option<EndReason>,
}

pub struct GameService {
    shared: Shared,
    match_config: Arc<MatchConfig>,
    loop_config: LoopConfig,
    outcomes: mpsc::UnboundedSender<MatchOutcome>,
}

impl GameService {
    pub fn new(
        shared: Shared,
        match_config: Arc<MatchConfig>,
        loop_config: LoopConfig,
        outcomes: mpsc::UnboundedSender<MatchOutcome>,
    ) -> Self {
        Self {
            shared,
            match_config,
            loop_config,
            outcomes,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn registry(&self) -> &MatchRegistry {
        &self.shared.registry
    }

    pub fn pubsub(&self) -> &PubSub {
        &self.shared.pubsub
    }

    pub fn persist(&self) -> &PersistQueue {
        &self.shared.persist
    }

    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    pub fn loop_config(&self) -> &LoopConfig {
        &self.loop_config
    }

    pub fn match_config(&self) -> &MatchConfig {
        &self.match_config
    }

    pub fn now_ms(&self) -> u64 {
        self.shared.clock.now_ms()
    }

    fn handle(&self, id: MatchId) -> Result<MatchHandle, ServiceError> {
        self.shared
            .registry
            .get(id)
            .ok_or_else(|| ServiceError::MatchNotFound(id.to_string()))
    }

    /// Current state of a live match.
    pub fn get(&self, id: MatchId) -> Result<MatchState, ServiceError> {
        let handle = self.handle(id)?;
        let state = registry::lock(&handle).snapshot();
        Ok(state)
    }

    /// The oldest unfinished match `user` is seated in, or failing that the
    /// oldest match they could join.
    pub fn game_status(&self, user: UserId) -> ServerMessage {
        let registry = &self.shared.registry;
        let found = registry
            .matches_for(user)
            .into_iter()
            .next()
            .map(|id| (GameStatusKind::Active, id))
            .or_else(|| {
                registry
                    .find_joinable(user)
                    .map(|id| (GameStatusKind::Waiting, id))
            })
            .and_then(|(status, id)| self.get(id).ok().map(|state| (status, state)));

        match found {
            Some((status, state)) => ServerMessage::GameStatus {
                status,
                game_id: Some(state.match_id),
                game_state: Some(state),
            },
            None => ServerMessage::GameStatus {
                status: GameStatusKind::NoGame,
                game_id: None,
                game_state: None,
            },
        }
    }

    /// Live matches that have not finished yet, oldest first.
    pub fn active_games(&self) -> Vec<MatchSummary> {
        dashboard::summarize(&self.shared.registry)
            .into_iter()
            .filter(|m| !m.status.is_finished())
            .collect()
    }

    // ── Client operations ────────────────────────────────────────────────

    /// Open a new match with `user` seated as player1.
    pub fn create_game(&self, user: UserId, name: &str) -> Result<MatchState, ServiceError> {
        let engine = MatchEngine::create(
            MatchId::new(),
            user,
            name,
            Arc::clone(&self.match_config),
            Arc::clone(&self.shared.clock),
        );
        let record = GameRecord::from_engine(&engine, self.now_ms());
        let state = engine.snapshot();
        self.shared.registry.create(engine)?;
        self.write_record(record);
        self.shared.metrics.match_created();
        tracing::info!("Match {} created by user {}", state.match_id, user);
        Ok(state)
    }

    /// Seat `user` in `game_id`, or in the oldest open match when no id is
    /// given. A participant re-joining their own match gets its current
    /// state back instead of an error.
    ///
    /// Returns the `game_joined` message for the caller; other participants
    /// receive it on the game topic.
    pub fn join_game(
        self: &Arc<Self>,
        user: UserId,
        name: &str,
        game_id: Option<MatchId>,
    ) -> Result<ServerMessage, ServiceError> {
        let id = match game_id {
            Some(id) => id,
            None => self
                .shared
                .registry
                .find_joinable(user)
                .ok_or(ServiceError::NotJoinable("no available games found"))?,
        };
        let handle = self.handle(id)?;

        let (message, record, started) = {
            let mut engine = registry::lock(&handle);
            if engine.has_player(user) {
                return Ok(joined_message(engine.state()));
            }
            engine.join(user, name)?;
            let started = engine.status() == MatchStatus::Playing;
            (
                joined_message(engine.state()),
                GameRecord::from_engine(&engine, self.now_ms()),
                started,
            )
        };

        self.write_record(record);
        self.shared.pubsub.publish(Topic::Game(id), message.clone());
        if started {
            self.begin_play(id);
        }
        Ok(message)
    }

    /// Mark `user` ready. The second ready starts play and the loop.
    pub fn player_ready(
        self: &Arc<Self>,
        user: UserId,
        game_id: MatchId,
    ) -> Result<MatchState, ServiceError> {
        let handle = self.handle(game_id)?;
        let (state, record, started) = {
            let mut engine = registry::lock(&handle);
            let before = engine.status();
            engine.set_ready(user)?;
            let started = before != MatchStatus::Playing && engine.status() == MatchStatus::Playing;
            (
                engine.snapshot(),
                GameRecord::from_engine(&engine, self.now_ms()),
                started,
            )
        };

        self.write_record(record);
        let update = if started {
            UpdateType::GameStarted
        } else {
            UpdateType::PlayerReady
        };
        self.shared
            .pubsub
            .publish(Topic::Game(game_id), ServerMessage::state_update(update, state.clone()));
        if started {
            self.begin_play(game_id);
        }
        Ok(state)
    }

    /// Forward a paddle input. Returns whether the move was applied.
    pub fn paddle_move(
        &self,
        user: UserId,
        game_id: MatchId,
        direction: Direction,
    ) -> Result<bool, ServiceError> {
        let handle = self.handle(game_id)?;
        let mut engine = registry::lock(&handle);
        if !engine.has_player(user) {
            return Err(ServiceError::NotAParticipant(user));
        }
        Ok(engine.move_paddle(user, direction))
    }

    // ── Tournament games ─────────────────────────────────────────────────

    /// Create the engine for a bracket match with both players seated. Under
    /// the ready handshake the players still have to ready up.
    pub fn start_tournament_game(
        self: &Arc<Self>,
        game_id: MatchId,
        link: TournamentLink,
        player1: (UserId, &str),
        player2: (UserId, &str),
    ) -> Result<MatchState, ServiceError> {
        let mut engine = MatchEngine::create(
            game_id,
            player1.0,
            player1.1,
            Arc::clone(&self.match_config),
            Arc::clone(&self.shared.clock),
        );
        engine.set_tournament(link);
        engine.join(player2.0, player2.1)?;
        let started = engine.status() == MatchStatus::Playing;
        let record = GameRecord::from_engine(&engine, self.now_ms());
        let state = engine.snapshot();

        self.shared.registry.create(engine)?;
        self.write_record(record);
        self.shared.metrics.match_created();
        tracing::info!(
            "Tournament {} match {}: game {} created for users {} and {}",
            link.tournament_id,
            link.bracket_match_id,
            game_id,
            player1.0,
            player2.0
        );
        if started {
            self.begin_play(game_id);
        }
        Ok(state)
    }

    // ── Ending ───────────────────────────────────────────────────────────

    /// Force-finish a live match. Returns `false` if the match is gone or
    /// was already finished by someone else.
    pub fn end_game(&self, game_id: MatchId, reason: EndReason, leaver: Option<UserId>) -> bool {
        let Some(handle) = self.shared.registry.get(game_id) else {
            return false;
        };
        let record = {
            let mut engine = registry::lock(&handle);
            engine.end(reason, leaver);
            if !engine.claim_finalization() {
                return false;
            }
            GameRecord::from_engine(&engine, self.now_ms())
        };
        self.finalize(record);
        true
    }

    /// End every live match `user` is seated in; the remaining player wins.
    pub fn handle_disconnect(&self, user: UserId) -> usize {
        let ended = self
            .shared
            .registry
            .matches_for(user)
            .into_iter()
            .filter(|id| self.end_game(*id, EndReason::Disconnect, Some(user)))
            .count();
        if ended > 0 {
            tracing::info!("User {} disconnected; ended {} live matches", user, ended);
        }
        ended
    }

    /// Final write, `game_end` broadcast, tournament report and eviction.
    /// Called once per match by the finalization claim winner.
    pub fn finalize(&self, record: GameRecord) {
        let id = record.game_id;
        match self.shared.store.put_game(&record) {
            Ok(()) => self.shared.metrics.store_write_ok(),
            Err(StoreError::Stale { .. }) => {}
            Err(e) => {
                tracing::error!("Final write for match {} failed, queueing retry: {}", id, e);
                self.shared.metrics.store_write_failed();
                self.shared.persist.enqueue(record.clone());
            }
        }

        let topic = Topic::Game(id);
        self.shared
            .pubsub
            .publish(topic, ServerMessage::game_end(&record.state));
        self.shared.pubsub.close(topic);

        if let Some(link) = record.tournament_match {
            let outcome = MatchOutcome {
                game_id: id,
                link,
                winner_id: record.winner_id,
                end_reason: record.end_reason,
            };
            if self.outcomes.send(outcome).is_err() {
                tracing::error!("Outcome channel closed; match {} result not reported", id);
            }
        }

        self.shared.registry.remove(id);
        self.shared.metrics.match_finished();
    }

    /// Drop a match that never produced a result: registry and store. The
    /// caller holds the finalization claim, so no other path finalizes it.
    pub fn discard(&self, game_id: MatchId) {
        self.shared.registry.remove(game_id);
        if let Err(e) = self.shared.store.delete_game(game_id) {
            tracing::debug!("Discarding match {}: {}", game_id, e);
        }
        self.shared.pubsub.close(Topic::Game(game_id));
        self.shared.metrics.match_discarded();
        tracing::info!("Match {} discarded", game_id);
    }

    /// Close durable records left unfinished by a previous process. Their
    /// engines no longer exist, so they are finished as inactive.
    pub fn close_orphaned_games(&self) -> usize {
        let now = self.now_ms();
        let mut closed = 0;
        for mut record in self.shared.store.games() {
            if record.is_finished() || self.shared.registry.exists(record.game_id) {
                continue;
            }
            record.close(EndReason::Inactivity, now);
            match self.shared.store.put_game(&record) {
                Ok(()) => closed += 1,
                Err(e) => tracing::warn!("Could not close orphaned game {}: {}", record.game_id, e),
            }
        }
        closed
    }

    // ── Internal ─────────────────────────────────────────────────────────

    fn begin_play(self: &Arc<Self>, id: MatchId) {
        simulation::spawn(Arc::clone(self), id);
    }

    fn write_record(&self, record: GameRecord) {
        self.shared.persist.enqueue(record);
    }
}

fn joined_message(state: &MatchState) -> ServerMessage {
    ServerMessage::GameJoined {
        game_id: state.match_id,
        player1_id: state.players.player1.as_ref().map(|p| p.id),
        player2_id: state.players.player2.as_ref().map(|p| p.id),
        status: state.status,
        game_state: state.clone(),
    }
}
