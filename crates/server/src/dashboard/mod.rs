//! Operator dashboard: live counters and a summary of running matches.
//!
//! Design contract with the tick path:
//!   • Metrics: atomic fetch_add, zero-alloc, never blocks.
//!   • Match summaries are built on demand by the dashboard server, taking
//!     each match lock only long enough to copy a few fields.

pub mod metrics;
pub mod server;

use std::sync::Arc;

use pong_engine::game::MatchStatus;
use pong_engine::ids::{MatchId, UserId};
use pong_engine::registry::{self, MatchRegistry};
use serde::Serialize;

pub use metrics::Metrics;

/// Central state shared via `Arc<DashboardState>`.
pub struct DashboardState {
    pub metrics: Arc<Metrics>,
    pub registry: Arc<MatchRegistry>,
}

impl DashboardState {
    pub fn new(metrics: Arc<Metrics>, registry: Arc<MatchRegistry>) -> Self {
        Self { metrics, registry }
    }

    pub fn live_matches(&self) -> Vec<MatchSummary> {
        summarize(&self.registry)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub player1: Option<UserId>,
    pub player2: Option<UserId>,
    pub score: [u32; 2],
    pub ticks: u64,
    pub tournament: bool,
}

/// One summary per live match, oldest first.
pub fn summarize(matches: &MatchRegistry) -> Vec<MatchSummary> {
    matches
        .handles()
        .into_iter()
        .map(|(id, handle)| {
            let engine = registry::lock(&handle);
            let state = engine.state();
            MatchSummary {
                match_id: id,
                status: state.status,
                player1: state.players.player1.as_ref().map(|p| p.id),
                player2: state.players.player2.as_ref().map(|p| p.id),
                score: [state.score.player1, state.score.player2],
                ticks: engine.ticks(),
                tournament: engine.tournament().is_some(),
            }
        })
        .collect()
}
