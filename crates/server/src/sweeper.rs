//! Periodic cleanup of abandoned matches.
//!
//! A live match with no activity for `stale_after` is swept: one that never
//! saw a goal is discarded outright, one with a score is finished as
//! `inactivity` with the score leader as winner. Tournament matches are
//! always finished so their bracket slot gets a result.

use std::sync::Arc;
use std::time::Duration;

use pong_engine::game::EndReason;
use pong_engine::registry;

use crate::games::GameService;
use crate::store::GameRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub discarded: usize,
    pub finished: usize,
}

/// Spawn the sweeper task. Runs forever.
pub fn spawn(games: Arc<GameService>, every: Duration, stale_after: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // first tick is immediate, skip it
        loop {
            interval.tick().await;
            let report = sweep(&games, stale_after);
            if report.discarded > 0 || report.finished > 0 {
                tracing::info!(
                    "Sweeper: discarded {} and finished {} inactive matches",
                    report.discarded,
                    report.finished
                );
            }
        }
    });
}

/// What the sweep decided for one match, with the match already claimed.
enum Verdict {
    Discard,
    Finish(GameRecord),
}

/// One sweep over the registry.
///
/// Staleness is decided and the match is ended under the same lock, so a
/// join or ready racing the sweep either refreshes activity first (and the
/// match survives) or finds the match already finished.
pub fn sweep(games: &GameService, stale_after: Duration) -> SweepReport {
    let now = games.now_ms();
    let cutoff = stale_after.as_millis() as u64;
    let mut report = SweepReport::default();

    for (id, handle) in games.registry().handles() {
        let verdict = {
            let mut engine = registry::lock(&handle);
            if engine.is_finished() || now.saturating_sub(engine.last_activity()) < cutoff {
                continue;
            }
            let discard = engine.state().score.total() == 0 && engine.tournament().is_none();
            engine.end(EndReason::Inactivity, None);
            if !engine.claim_finalization() {
                continue;
            }
            if discard {
                Verdict::Discard
            } else {
                Verdict::Finish(GameRecord::from_engine(&engine, now))
            }
        };

        match verdict {
            Verdict::Discard => {
                games.discard(id);
                report.discarded += 1;
            }
            Verdict::Finish(record) => {
                games.finalize(record);
                report.finished += 1;
            }
        }
    }
    report
}
