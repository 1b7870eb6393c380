//! Per-client WebSocket session.
//!
//! Inbound text frames are parsed as [`ClientMessage`] and dispatched to the
//! game service or tournament controller. Outbound traffic comes from two
//! places: direct replies to the client's own requests, and topic
//! subscriptions, each drained by a small forwarding task into one
//! outbound channel. Only the session task writes to the socket.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use pong_engine::ids::{MatchId, UserId};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app::App;
use crate::error::ServiceError;
use crate::history;
use crate::protocol::{ClientMessage, GameStatusKind, ServerMessage};
use crate::pubsub::{Envelope, Topic};

/// Run one client session to completion. Any live match the user is playing
/// ends when the socket goes away.
pub async fn handle(socket: WebSocket, app: Arc<App>, user: UserId, name: String) {
    app.shared.metrics.connection_opened();
    let result = run(socket, &app, user, name).await;
    app.shared.metrics.connection_closed();
    app.games.handle_disconnect(user);

    match result {
        Ok(()) => tracing::info!("User {} disconnected", user),
        Err(e) => tracing::warn!("Connection of user {} closed: {}", user, e),
    }
}

async fn run(mut socket: WebSocket, app: &Arc<App>, user: UserId, name: String) -> Result<()> {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
    let mut session = Session {
        app: Arc::clone(app),
        user,
        name,
        out_tx,
        forwards: HashMap::new(),
    };
    session.subscribe(Topic::User(user));

    let hello = ServerMessage::ConnectionEstablished {
        user_id: user,
        message: format!("Connected as {}", session.name),
    };
    send(&mut socket, &hello).await?;

    loop {
        tokio::select! {
            Some(message) = out_rx.recv() => {
                session.observe(&message);
                send(&mut socket, &message).await?;
            }

            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // ping/pong/binary
                    Some(Err(e)) => return Err(e.into()),
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => session.dispatch(message),
                    Err(e) => Err(ServiceError::BadRequest(e.to_string())),
                };
                match reply {
                    Ok(Some(message)) => {
                        session.observe(&message);
                        send(&mut socket, &message).await?;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!("User {} request failed: {}", user, e);
                        send(&mut socket, &ServerMessage::error(e.user_message())).await?;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> Result<()> {
    socket.send(Message::Text(message.to_json().into())).await?;
    Ok(())
}

// ── Session ──────────────────────────────────────────────────────────────

struct Session {
    app: Arc<App>,
    user: UserId,
    name: String,
    out_tx: mpsc::UnboundedSender<Envelope>,
    /// One forwarding task per subscribed topic.
    forwards: HashMap<Topic, JoinHandle<()>>,
}

impl Session {
    /// Start forwarding `topic` to this client. Subscribing twice is a no-op.
    fn subscribe(&mut self, topic: Topic) {
        self.forwards.retain(|_, task| !task.is_finished());
        if self.forwards.contains_key(&topic) {
            return;
        }

        let mut rx = self.app.shared.pubsub.subscribe(topic);
        let tx = self.out_tx.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "Subscriber of {} lagged, skipped {} messages",
                            topic,
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.forwards.insert(topic, task);
    }

    /// Follow games this user is seated in as soon as a message says so.
    fn observe(&mut self, message: &ServerMessage) {
        let seated = match message {
            ServerMessage::GameCreated {
                game_id, player_id, ..
            } => (*player_id == self.user).then_some(*game_id),
            ServerMessage::GameJoined {
                game_id,
                player1_id,
                player2_id,
                ..
            } => (*player1_id == Some(self.user) || *player2_id == Some(self.user))
                .then_some(*game_id),
            ServerMessage::MatchReady {
                game_id,
                player1_id,
                player2_id,
                ..
            }
            | ServerMessage::MatchReadyNotification {
                game_id,
                player1_id,
                player2_id,
                ..
            } => (*player1_id == self.user || *player2_id == self.user).then_some(*game_id),
            ServerMessage::GameStatus {
                status: GameStatusKind::Active,
                game_id,
                ..
            } => *game_id,
            _ => None,
        };
        if let Some(game_id) = seated {
            self.subscribe(Topic::Game(game_id));
        }
    }

    /// Subscribe to a live match's topic if this user plays in it.
    fn follow_if_seated(&mut self, game_id: MatchId) {
        let seated = self
            .app
            .games
            .get(game_id)
            .is_ok_and(|state| state.players.side_of(self.user).is_some());
        if seated {
            self.subscribe(Topic::Game(game_id));
        }
    }

    fn dispatch(&mut self, message: ClientMessage) -> Result<Option<ServerMessage>, ServiceError> {
        let app = Arc::clone(&self.app);
        let user = self.user;

        let reply = match message {
            ClientMessage::CreateGame => {
                let state = app.games.create_game(user, &self.name)?;
                Some(ServerMessage::GameCreated {
                    game_id: state.match_id,
                    player_id: user,
                    game_state: state,
                })
            }
            ClientMessage::JoinGame { game_id } => {
                Some(app.games.join_game(user, &self.name, game_id)?)
            }
            ClientMessage::PlayerReady { game_id } => {
                self.follow_if_seated(game_id);
                app.games.player_ready(user, game_id)?;
                None
            }
            ClientMessage::PaddleMove { game_id, direction } => {
                app.games.paddle_move(user, game_id, direction)?;
                None
            }
            ClientMessage::TournamentCreate {
                name,
                display_name,
                max_players,
            } => {
                let t = app
                    .tournaments
                    .create_tournament(&name, user, &display_name, max_players)?;
                self.subscribe(Topic::Tournament(t.tournament_id));
                Some(ServerMessage::TournamentCreated { tournament: t })
            }
            ClientMessage::TournamentJoin {
                tournament_id,
                display_name,
            } => {
                app.tournaments.get(tournament_id)?;
                self.subscribe(Topic::Tournament(tournament_id));
                let t = app
                    .tournaments
                    .join_tournament(tournament_id, user, &display_name)?;
                Some(ServerMessage::tournament_update(&t))
            }
            ClientMessage::TournamentStart { tournament_id } => {
                self.subscribe(Topic::Tournament(tournament_id));
                app.tournaments.start(tournament_id, user)?;
                None
            }
            ClientMessage::TournamentForfeit { tournament_id } => {
                app.tournaments.forfeit(tournament_id, user)?;
                None
            }
            ClientMessage::TournamentWatch { tournament_id } => {
                let t = app.tournaments.get(tournament_id)?;
                self.subscribe(Topic::Tournament(tournament_id));
                Some(ServerMessage::tournament_update(&t))
            }
            ClientMessage::GetStats { user_id } => {
                let target = user_id.unwrap_or(user);
                Some(ServerMessage::Stats {
                    user_id: target,
                    stats: history::stats_for(app.shared.store.as_ref(), target),
                })
            }
            ClientMessage::GetHistory { user_id } => {
                let target = user_id.unwrap_or(user);
                Some(ServerMessage::History {
                    user_id: target,
                    games: history::history_for(app.shared.store.as_ref(), target),
                })
            }
            ClientMessage::GameStatus => Some(app.games.game_status(user)),
            ClientMessage::ListGames => Some(ServerMessage::ActiveGames {
                games: app.games.active_games(),
            }),
            ClientMessage::ListTournaments => Some(ServerMessage::ActiveTournaments {
                tournaments: app.tournaments.active_tournaments(),
            }),
            ClientMessage::PlayerTournaments { user_id } => {
                let target = user_id.unwrap_or(user);
                Some(ServerMessage::PlayerTournaments {
                    user_id: target,
                    tournaments: app.tournaments.tournaments_of(target),
                })
            }
        };
        Ok(reply)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in self.forwards.values() {
            task.abort();
        }
    }
}
