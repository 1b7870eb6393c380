//! Process wiring: the shared handles every service holds, and the services
//! built on top of them.

use std::sync::Arc;

use pong_engine::clock::{Clock, SystemClock};
use pong_engine::registry::MatchRegistry;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::dashboard::{DashboardState, Metrics};
use crate::games::GameService;
use crate::persistence::PersistQueue;
use crate::pubsub::PubSub;
use crate::store::DurableStore;
use crate::tournament::TournamentController;

/// Handles shared by every service. Cloning is a handful of refcount bumps.
#[derive(Clone)]
pub struct Shared {
    pub registry: Arc<MatchRegistry>,
    pub store: Arc<dyn DurableStore>,
    pub persist: PersistQueue,
    pub pubsub: Arc<PubSub>,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<dyn Clock>,
}

pub struct App {
    pub config: ServerConfig,
    pub shared: Shared,
    pub games: Arc<GameService>,
    pub tournaments: Arc<TournamentController>,
}

impl App {
    /// Build the services over `store`. Spawns the persist queue and the
    /// match-outcome task, so it must be called inside a tokio runtime.
    pub fn new(config: ServerConfig, store: Arc<dyn DurableStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        config: ServerConfig,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let persist = PersistQueue::spawn(
            Arc::clone(&store),
            Arc::clone(&metrics),
            config.persist_interval,
        );
        let shared = Shared {
            registry: Arc::new(MatchRegistry::new()),
            store,
            persist,
            pubsub: Arc::new(PubSub::new()),
            metrics,
            clock,
        };

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let games = Arc::new(GameService::new(
            shared.clone(),
            Arc::new(config.match_config()),
            config.loop_config(),
            outcome_tx,
        ));
        let tournaments = Arc::new(TournamentController::new(
            shared.clone(),
            Arc::clone(&games),
            config.default_max_players,
        ));
        tokio::spawn(Arc::clone(&tournaments).run_outcomes(outcome_rx));

        Self {
            config,
            shared,
            games,
            tournaments,
        }
    }

    /// Reconcile durable state with the (empty) registry after a restart:
    /// settle or relaunch in-progress tournament matches first, then close
    /// the game records whose engines are gone.
    pub fn recover(&self) {
        let reconciled = self.tournaments.recover();
        let closed = self.games.close_orphaned_games();
        if closed > 0 || reconciled > 0 {
            tracing::info!(
                "Recovery: reconciled {} tournament matches, closed {} orphaned games",
                reconciled,
                closed
            );
        }
    }

    pub fn dashboard(&self) -> Arc<DashboardState> {
        Arc::new(DashboardState::new(
            Arc::clone(&self.shared.metrics),
            Arc::clone(&self.shared.registry),
        ))
    }
}
