//! Tournament lifecycle on top of the bracket state machine.
//!
//! Every mutation is a read-modify-write of the durable tournament record
//! under optimistic concurrency: read the versioned record, apply a pure
//! bracket transition, then compare-and-swap it back, retrying from a fresh
//! read on conflict. Side effects (engines, broadcasts, ending games) run
//! only after the write committed, and only for the committed transition.

use std::sync::Arc;

use pong_engine::bracket::{
    self, Advance, BracketMatchStatus, Tournament, TournamentStatus, Withdrawal,
};
use pong_engine::game::{EndReason, TournamentLink};
use pong_engine::ids::{BracketMatchId, MatchId, TournamentId, UserId};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::app::Shared;
use crate::error::ServiceError;
use crate::games::{GameService, MatchOutcome};
use crate::protocol::ServerMessage;
use crate::pubsub::Topic;
use crate::store::{StoreError, Versioned};

/// Compare-and-swap attempts before giving up with `Contention`.
const MAX_ATTEMPTS: usize = 8;

/// Bracket matches that were launched (given a game id) inside a transition.
type Launched = Vec<(BracketMatchId, MatchId)>;

/// Listing entry for a tournament, without its bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TournamentSummary {
    pub tournament_id: TournamentId,
    pub name: String,
    pub status: TournamentStatus,
    pub creator_id: UserId,
    pub player_count: usize,
    pub max_players: usize,
    pub winner_id: Option<UserId>,
    pub created_at: u64,
}

impl TournamentSummary {
    fn of(t: &Tournament) -> Self {
        Self {
            tournament_id: t.tournament_id,
            name: t.name.clone(),
            status: t.status,
            creator_id: t.creator_id,
            player_count: t.players.len(),
            max_players: t.max_players,
            winner_id: t.winner_id,
            created_at: t.created_at,
        }
    }
}

pub struct TournamentController {
    shared: Shared,
    games: Arc<GameService>,
    default_max_players: usize,
}

impl TournamentController {
    pub fn new(shared: Shared, games: Arc<GameService>, default_max_players: usize) -> Self {
        Self {
            shared,
            games,
            default_max_players,
        }
    }

    pub fn get(&self, id: TournamentId) -> Result<Tournament, ServiceError> {
        self.shared
            .store
            .get_tournament(id)
            .map(|v| v.value)
            .ok_or(ServiceError::TournamentNotFound(id))
    }

    /// Tournaments still taking players or being played, oldest first.
    pub fn active_tournaments(&self) -> Vec<TournamentSummary> {
        self.summaries(|t| {
            matches!(t.status, TournamentStatus::Pending | TournamentStatus::InProgress)
        })
    }

    /// Every tournament `user` is seated in, eliminated or not, oldest first.
    pub fn tournaments_of(&self, user: UserId) -> Vec<TournamentSummary> {
        self.summaries(|t| t.is_member(user))
    }

    fn summaries(&self, keep: impl Fn(&Tournament) -> bool) -> Vec<TournamentSummary> {
        let mut kept: Vec<Tournament> = self
            .shared
            .store
            .tournaments()
            .into_iter()
            .map(|v| v.value)
            .filter(|t| keep(t))
            .collect();
        kept.sort_by_key(|t| (t.created_at, t.tournament_id.0));
        kept.iter().map(TournamentSummary::of).collect()
    }

    // ── Operations ───────────────────────────────────────────────────────

    /// New pending tournament with the creator seated as first player.
    pub fn create_tournament(
        &self,
        name: &str,
        creator: UserId,
        display_name: &str,
        max_players: Option<usize>,
    ) -> Result<Tournament, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::BadRequest("empty tournament name".into()));
        }
        let max_players = max_players.unwrap_or(self.default_max_players);
        if max_players < 2 {
            return Err(ServiceError::BadRequest(format!("max_players {}", max_players)));
        }

        let id = TournamentId(self.shared.store.next_id());
        let t = Tournament::new(id, name, creator, display_name, max_players, self.now_ms());
        let Versioned { value, .. } = self.shared.store.insert_tournament(&t)?;
        tracing::info!("Tournament {} ({:?}) created by user {}", id, value.name, creator);
        Ok(value)
    }

    pub fn join_tournament(
        &self,
        id: TournamentId,
        user: UserId,
        display_name: &str,
    ) -> Result<Tournament, ServiceError> {
        let (t, ()) = self.mutate(id, |t| Ok(bracket::join(t, user, display_name)?))?;
        self.shared.pubsub.publish(
            Topic::Tournament(id),
            ServerMessage::PlayerJoined {
                tournament_id: id,
                user_id: user,
                display_name: display_name.to_string(),
                player_count: t.players.len(),
            },
        );
        tracing::info!("Tournament {}: user {} joined ({} players)", id, user, t.players.len());
        Ok(t)
    }

    /// Build the bracket and launch every match whose players are known.
    pub fn start(&self, id: TournamentId, user: UserId) -> Result<Tournament, ServiceError> {
        let now = self.now_ms();
        let store = Arc::clone(&self.shared.store);
        let (t, (advance, launched)) = self.mutate(id, |t| {
            if !t.is_member(user) {
                return Err(ServiceError::NotAParticipant(user));
            }
            let advance = bracket::build(t, || BracketMatchId(store.next_id()), now)?;
            let launched = launch_ready(t, &advance.ready, now)?;
            Ok((advance, launched))
        })?;

        self.shared.metrics.tournament_started();
        self.apply(&t, &advance, &launched);
        Ok(t)
    }

    /// Leave a tournament. Before start this withdraws the player; once in
    /// progress it eliminates them and hands their current match, if any, to
    /// the opponent.
    pub fn forfeit(&self, id: TournamentId, user: UserId) -> Result<Tournament, ServiceError> {
        enum Left {
            Withdrew(Withdrawal),
            Eliminated(bracket::Forfeit, Launched),
        }

        let now = self.now_ms();
        let (t, left) = self.mutate(id, |t| match t.status {
            TournamentStatus::Pending => Ok(Left::Withdrew(bracket::withdraw(t, user, now)?)),
            TournamentStatus::InProgress => {
                let forfeit = bracket::forfeit(t, user, now)?;
                let launched = launch_ready(t, &forfeit.advance.ready, now)?;
                Ok(Left::Eliminated(forfeit, launched))
            }
            _ => Err(ServiceError::InvalidState("tournament is already over")),
        })?;

        match left {
            Left::Withdrew(withdrawal) => {
                tracing::info!("Tournament {}: user {} withdrew ({:?})", id, user, withdrawal);
                self.publish_tournament(&t);
            }
            Left::Eliminated(forfeit, launched) => {
                tracing::info!("Tournament {}: user {} forfeited", id, user);
                if let (Some(match_id), Some(opponent)) = (forfeit.match_id, forfeit.opponent) {
                    self.publish_match_update(&t, match_id, Some(opponent), Some(user));
                }
                if let Some(game) = forfeit.linked_game_id {
                    self.games.end_game(game, EndReason::Forfeit, Some(user));
                }
                self.apply(&t, &forfeit.advance, &launched);
            }
        }
        Ok(t)
    }

    /// Record the result of a finished tournament game. A game that ended
    /// without a winner (a tie) is awarded to the match's player1. Repeated
    /// notifications for the same match are no-ops.
    pub fn notify_match_end(&self, outcome: &MatchOutcome) -> Result<(), ServiceError> {
        let link = outcome.link;
        let now = self.now_ms();
        let (t, result) = self.mutate(link.tournament_id, |t| {
            let m = t
                .find_match(link.bracket_match_id)
                .ok_or_else(|| ServiceError::MatchNotFound(link.bracket_match_id.to_string()))?;
            match m.status {
                BracketMatchStatus::Completed | BracketMatchStatus::Cancelled => return Ok(None),
                _ if m.linked_game_id != Some(outcome.game_id) => {
                    return Err(ServiceError::InvalidState("game is not linked to this match"));
                }
                _ => {}
            }
            let winner = outcome
                .winner_id
                .filter(|w| m.has_player(*w))
                .or_else(|| m.player1.player())
                .ok_or(ServiceError::InvalidState("match has no players"))?;

            let advance = bracket::complete_match(t, link.bracket_match_id, winner, now)?;
            let launched = launch_ready(t, &advance.ready, now)?;
            Ok(Some((winner, advance, launched)))
        })?;

        let Some((winner, advance, launched)) = result else {
            tracing::debug!(
                "Tournament {} match {}: duplicate result ignored",
                link.tournament_id,
                link.bracket_match_id
            );
            return Ok(());
        };
        self.publish_match_update(&t, link.bracket_match_id, Some(winner), None);
        self.apply(&t, &advance, &launched);
        Ok(())
    }

    /// Consume finished tournament games reported by the game service.
    pub async fn run_outcomes(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<MatchOutcome>) {
        while let Some(outcome) = rx.recv().await {
            if let Err(e) = self.notify_match_end(&outcome) {
                tracing::warn!(
                    "Tournament {}: result of game {} not applied: {}",
                    outcome.link.tournament_id,
                    outcome.game_id,
                    e
                );
            }
        }
        tracing::debug!("Match outcome channel closed");
    }

    /// Reconcile in-progress matches whose game engine did not survive a
    /// restart. A game that finished before the restart but whose result was
    /// never applied is applied now; anything else gets a fresh engine.
    /// Returns how many matches were reconciled.
    pub fn recover(&self) -> usize {
        let mut reconciled = 0;
        for Versioned { value: t, .. } in self.shared.store.tournaments() {
            if t.status != TournamentStatus::InProgress {
                continue;
            }
            let stranded: Vec<(BracketMatchId, Option<MatchId>)> = t
                .matches
                .iter()
                .filter(|m| m.status == BracketMatchStatus::InProgress)
                .filter(|m| {
                    m.linked_game_id
                        .is_none_or(|game| !self.shared.registry.exists(game))
                })
                .map(|m| (m.match_id, m.linked_game_id))
                .collect();

            for (match_id, linked) in stranded {
                let finished = linked
                    .and_then(|game| self.shared.store.get_game(game))
                    .filter(|record| record.is_finished());
                let result = match finished {
                    Some(record) => self.notify_match_end(&MatchOutcome {
                        game_id: record.game_id,
                        link: TournamentLink {
                            tournament_id: t.tournament_id,
                            bracket_match_id: match_id,
                        },
                        winner_id: record.winner_id,
                        end_reason: record.end_reason,
                    }),
                    None => self.relaunch(t.tournament_id, match_id),
                };
                match result {
                    Ok(()) => reconciled += 1,
                    Err(e) => tracing::warn!(
                        "Tournament {} match {}: recovery failed: {}",
                        t.tournament_id,
                        match_id,
                        e
                    ),
                }
            }
        }
        reconciled
    }

    fn relaunch(&self, id: TournamentId, match_id: BracketMatchId) -> Result<(), ServiceError> {
        let game = MatchId::new();
        let (t, ()) = self.mutate(id, |t| Ok(bracket::relink(t, match_id, game)?))?;
        tracing::info!("Tournament {} match {}: relaunched as game {}", id, match_id, game);
        self.launch_game(&t, match_id, game);
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────────

    fn now_ms(&self) -> u64 {
        self.shared.clock.now_ms()
    }

    /// Optimistic read-modify-write of one tournament record. `f` runs on a
    /// fresh copy each attempt, so it must not have side effects. An
    /// unchanged tournament is not written back.
    fn mutate<R>(
        &self,
        id: TournamentId,
        mut f: impl FnMut(&mut Tournament) -> Result<R, ServiceError>,
    ) -> Result<(Tournament, R), ServiceError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let Versioned { version, value } = self
                .shared
                .store
                .get_tournament(id)
                .ok_or(ServiceError::TournamentNotFound(id))?;
            let mut t = value.clone();
            let out = f(&mut t)?;
            if t == value {
                return Ok((t, out));
            }
            match self.shared.store.update_tournament(&t, version) {
                Ok(_) => return Ok((t, out)),
                Err(StoreError::Conflict { expected, actual }) => {
                    tracing::debug!(
                        "Tournament {}: version conflict ({} != {}), attempt {}",
                        id,
                        expected,
                        actual,
                        attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::warn!("Tournament {}: gave up after {} conflicting updates", id, MAX_ATTEMPTS);
        Err(ServiceError::Contention)
    }

    /// Side effects of a committed transition: engines for launched matches,
    /// updates for auto-completed ones, ending games of cancelled ones, and
    /// the tournament-wide update.
    fn apply(&self, t: &Tournament, advance: &Advance, launched: &Launched) {
        for match_id in &advance.auto_completed {
            let winner = t.find_match(*match_id).and_then(|m| m.winner_id);
            self.publish_match_update(t, *match_id, winner, None);
        }
        for (match_id, game) in launched {
            self.launch_game(t, *match_id, *game);
        }
        for match_id in &advance.cancelled {
            if let Some(game) = t.find_match(*match_id).and_then(|m| m.linked_game_id) {
                self.games.end_game(game, EndReason::Forfeit, None);
            }
        }
        if advance.tournament_completed {
            self.shared.metrics.tournament_completed();
        }
        self.publish_tournament(t);
    }

    /// Create the engine for a launched bracket match and tell its players.
    fn launch_game(&self, t: &Tournament, match_id: BracketMatchId, game: MatchId) {
        let Some(m) = t.find_match(match_id) else {
            return;
        };
        let Some((p1, p2)) = m.players() else {
            tracing::warn!(
                "Tournament {} match {}: launched without two players",
                t.tournament_id,
                match_id
            );
            return;
        };
        let name = |user: UserId| t.display_name(user).unwrap_or_default().to_string();
        let (name1, name2) = (name(p1), name(p2));
        let link = TournamentLink {
            tournament_id: t.tournament_id,
            bracket_match_id: match_id,
        };

        if let Err(e) = self
            .games
            .start_tournament_game(game, link, (p1, &name1), (p2, &name2))
        {
            tracing::error!(
                "Tournament {} match {}: could not create game {}: {}",
                t.tournament_id,
                match_id,
                game,
                e
            );
            return;
        }

        let ready = ServerMessage::MatchReady {
            tournament_id: t.tournament_id,
            match_id,
            game_id: game,
            round_number: m.round_number,
            player1_id: p1,
            player2_id: p2,
        };
        let notification = ServerMessage::MatchReadyNotification {
            tournament_id: t.tournament_id,
            match_id,
            game_id: game,
            player1_id: p1,
            player1_name: name1,
            player2_id: p2,
            player2_name: name2,
        };

        // The game topic has no subscribers yet: players only learn the game
        // id from this very message, so each seat gets both on its user topic.
        let pubsub = &self.shared.pubsub;
        pubsub.publish(Topic::Tournament(t.tournament_id), ready.clone());
        for player in [p1, p2] {
            pubsub.publish(Topic::User(player), ready.clone());
            pubsub.publish(Topic::User(player), notification.clone());
        }
        pubsub.publish(Topic::Game(game), notification);
    }

    fn publish_match_update(
        &self,
        t: &Tournament,
        match_id: BracketMatchId,
        winner: Option<UserId>,
        forfeited_by: Option<UserId>,
    ) {
        let status = t
            .find_match(match_id)
            .map(|m| m.status)
            .unwrap_or(BracketMatchStatus::Completed);
        self.shared.pubsub.publish(
            Topic::Tournament(t.tournament_id),
            ServerMessage::MatchUpdate {
                tournament_id: t.tournament_id,
                match_id,
                status,
                winner_id: winner,
                forfeit: forfeited_by.is_some(),
                forfeited_by,
            },
        );
    }

    fn publish_tournament(&self, t: &Tournament) {
        self.shared
            .pubsub
            .publish(Topic::Tournament(t.tournament_id), ServerMessage::tournament_update(t));
    }
}

/// Mark each ready match in progress with a fresh game id. Runs inside the
/// compare-and-swap closure, so ids from a losing attempt are never used.
fn launch_ready(
    t: &mut Tournament,
    ready: &[BracketMatchId],
    now: u64,
) -> Result<Launched, ServiceError> {
    ready
        .iter()
        .map(|match_id| {
            let game = MatchId::new();
            bracket::launch(t, *match_id, game, now)?;
            Ok((*match_id, game))
        })
        .collect()
}
