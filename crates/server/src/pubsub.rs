//! Topic-keyed broadcast fan-out.
//!
//! One `tokio::sync::broadcast` channel per topic, created lazily on first
//! subscribe. Messages are `Arc`-wrapped so per-subscriber clones are just a
//! refcount bump. Publishing to a topic nobody listens to is a no-op.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use pong_engine::ids::{MatchId, TournamentId, UserId};
use tokio::sync::broadcast;

use crate::protocol::ServerMessage;

/// Per-topic channel capacity. A 60 Hz match fills this in ~4 s, far longer
/// than any healthy subscriber lags.
pub const TOPIC_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Game(MatchId),
    Tournament(TournamentId),
    /// Messages addressed to every connection of one user.
    User(UserId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Game(id) => write!(f, "game_{}", id),
            Topic::Tournament(id) => write!(f, "tournament_{}", id),
            Topic::User(id) => write!(f, "user_{}", id),
        }
    }
}

pub type Envelope = Arc<ServerMessage>;

pub struct PubSub {
    topics: DashMap<Topic, broadcast::Sender<Envelope>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Envelope> {
        self.topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Deliver `message` to current subscribers of `topic`. Returns how many
    /// received it.
    pub fn publish(&self, topic: Topic, message: ServerMessage) -> usize {
        let Some(tx) = self.topics.get(&topic).map(|tx| tx.clone()) else {
            return 0;
        };
        match tx.send(Arc::new(message)) {
            Ok(n) => n,
            Err(_) => {
                // Everyone left; drop the channel unless someone re-subscribed.
                self.topics.remove_if(&topic, |_, tx| tx.receiver_count() == 0);
                0
            }
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics
            .get(&topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop a topic's channel; current subscribers see `Closed`.
    pub fn close(&self, topic: Topic) {
        self.topics.remove(&topic);
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}
