//! Per-match simulation loop.
//!
//! One tokio task per playing match. Each tick takes the match lock, steps
//! the physics, copies out whatever needs to leave the lock (a broadcast
//! snapshot, a throttled durable record) and releases it before publishing.
//! Loops share no mutable state with each other.
//!
//! A loop ends exactly once: when its tick finishes the match, when some
//! other path (disconnect, forfeit, sweeper) finished it, or when the match
//! vanished from the registry.

use std::sync::Arc;
use std::time::Duration;

use pong_engine::ids::MatchId;
use pong_engine::registry;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::games::GameService;
use crate::protocol::{ServerMessage, UpdateType};
use crate::pubsub::Topic;
use crate::store::GameRecord;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub tick_interval: Duration,
    /// Publish state every N ticks.
    pub broadcast_every: u32,
    /// Minimum spacing of in-play durable writes.
    pub persist_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1) / 60,
            broadcast_every: 1,
            persist_interval: Duration::from_secs(1),
        }
    }
}

/// What one tick hands back from under the lock.
struct Step {
    broadcast: Option<ServerMessage>,
    record: Option<GameRecord>,
    /// This loop won the finalization claim.
    finalize: Option<GameRecord>,
    done: bool,
}

/// Spawn the loop for match `id`. Call once, on the transition to `playing`.
pub fn spawn(games: Arc<GameService>, id: MatchId) -> JoinHandle<()> {
    tokio::spawn(run(games, id))
}

async fn run(games: Arc<GameService>, id: MatchId) {
    let config = games.loop_config().clone();
    let every = u64::from(config.broadcast_every.max(1));
    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so clients see the start first.
    interval.tick().await;

    tracing::debug!("Simulation loop for match {} started", id);
    let mut last_persist = Instant::now();

    loop {
        interval.tick().await;

        let Some(handle) = games.registry().get(id) else {
            tracing::debug!("Match {} left the registry; loop exiting", id);
            break;
        };

        let persist_due = last_persist.elapsed() >= config.persist_interval;
        let started = std::time::Instant::now();
        let step = {
            let mut engine = registry::lock(&handle);
            let was_finished = engine.is_finished();
            let outcome = engine.tick();
            let now = games.now_ms();

            if was_finished || outcome.finished {
                let finalize = engine
                    .claim_finalization()
                    .then(|| GameRecord::from_engine(&engine, now));
                Step {
                    broadcast: None,
                    record: None,
                    finalize,
                    done: true,
                }
            } else {
                let broadcast = (engine.ticks() % every == 0)
                    .then(|| ServerMessage::state_update(UpdateType::Tick, engine.snapshot()));
                let record = persist_due.then(|| GameRecord::from_engine(&engine, now));
                Step {
                    broadcast,
                    record,
                    finalize: None,
                    done: false,
                }
            }
        };
        games.metrics().record_tick(started.elapsed());

        if let Some(message) = step.broadcast {
            games.pubsub().publish(Topic::Game(id), message);
            games.metrics().broadcast();
        }
        if let Some(record) = step.record {
            games.persist().enqueue(record);
            last_persist = Instant::now();
        }
        if let Some(record) = step.finalize {
            games.finalize(record);
        }
        if step.done {
            break;
        }
    }

    tracing::debug!("Simulation loop for match {} finished", id);
}
