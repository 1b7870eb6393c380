//! Durable record tests: the write-behind queue, revision guards, stats and
//! history derived from game records.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pong_engine::bracket::Tournament;
use pong_engine::clock::{Clock, ManualClock};
use pong_engine::game::{EndReason, MatchConfig, MatchEngine, MatchStatus};
use pong_engine::ids::{MatchId, TournamentId, UserId};
use pong_server::dashboard::Metrics;
use pong_server::history;
use pong_server::persistence::PersistQueue;
use pong_server::store::{DurableStore, GameRecord, MemoryStore, StoreError, Versioned};

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);
const CAROL: UserId = UserId(3);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine(clock: &Arc<ManualClock>, p1: (UserId, &str), p2: Option<(UserId, &str)>) -> MatchEngine {
    let clock: Arc<dyn Clock> = clock.clone();
    let mut engine = MatchEngine::with_seed(
        MatchId::new(),
        p1.0,
        p1.1,
        Arc::new(MatchConfig::default()),
        clock,
        7,
    );
    if let Some((user, name)) = p2 {
        engine.join(user, name).unwrap();
    }
    engine
}

/// A finished game between `p1` and `p2` that `leaver` walked out of.
fn finished(
    clock: &Arc<ManualClock>,
    p1: (UserId, &str),
    p2: (UserId, &str),
    leaver: Option<UserId>,
) -> GameRecord {
    let mut engine = engine(clock, p1, Some(p2));
    engine.end(EndReason::Disconnect, leaver);
    GameRecord::from_engine(&engine, clock.now_ms())
}

/// Store whose game writes fail until `failures` attempts have been made.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

impl DurableStore for FlakyStore {
    fn next_id(&self) -> u64 {
        self.inner.next_id()
    }
    fn put_game(&self, record: &GameRecord) -> Result<(), StoreError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("disk on fire".into()));
        }
        self.inner.put_game(record)
    }
    fn get_game(&self, id: MatchId) -> Option<GameRecord> {
        self.inner.get_game(id)
    }
    fn delete_game(&self, id: MatchId) -> Result<(), StoreError> {
        self.inner.delete_game(id)
    }
    fn games(&self) -> Vec<GameRecord> {
        self.inner.games()
    }
    fn insert_tournament(&self, t: &Tournament) -> Result<Versioned<Tournament>, StoreError> {
        self.inner.insert_tournament(t)
    }
    fn get_tournament(&self, id: TournamentId) -> Option<Versioned<Tournament>> {
        self.inner.get_tournament(id)
    }
    fn update_tournament(&self, t: &Tournament, expected: u64) -> Result<u64, StoreError> {
        self.inner.update_tournament(t, expected)
    }
    fn tournaments(&self) -> Vec<Versioned<Tournament>> {
        self.inner.tournaments()
    }
}

// ---------------------------------------------------------------------------
// Write-behind queue
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failed_writes_are_retried_until_they_land() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        failures: AtomicUsize::new(2),
    });
    let metrics = Arc::new(Metrics::new());
    let queue = PersistQueue::spawn(store.clone(), metrics.clone(), Duration::from_millis(100));

    let clock = Arc::new(ManualClock::new(5_000));
    let record = GameRecord::from_engine(&engine(&clock, (ALICE, "alice"), None), 5_000);
    let id = record.game_id;
    queue.enqueue(record);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.get_game(id).is_none());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(store.get_game(id).is_some());

    let snap = metrics.snapshot(0);
    assert_eq!(snap.store_write_failures, 2);
    assert_eq!(snap.store_writes, 1);
}

#[tokio::test(start_paused = true)]
async fn only_the_newest_pending_revision_is_kept() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        failures: AtomicUsize::new(2),
    });
    let metrics = Arc::new(Metrics::new());
    let queue = PersistQueue::spawn(store.clone(), metrics.clone(), Duration::from_millis(100));

    let clock = Arc::new(ManualClock::new(5_000));
    let mut engine = engine(&clock, (ALICE, "alice"), None);
    let waiting = GameRecord::from_engine(&engine, 5_000);
    engine.join(BOB, "bob").unwrap();
    let joined = GameRecord::from_engine(&engine, 5_000);
    let id = waiting.game_id;

    // Both fail; the retry carries only the later revision.
    queue.enqueue(waiting);
    queue.enqueue(joined.clone());
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(store.get_game(id), Some(joined));
    assert_eq!(metrics.snapshot(0).store_writes, 1);
}

// ---------------------------------------------------------------------------
// Revision guards
// ---------------------------------------------------------------------------

#[test]
fn stale_and_regressing_game_writes_are_refused() {
    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(5_000));
    let mut engine = engine(&clock, (ALICE, "alice"), Some((BOB, "bob")));
    let pending = GameRecord::from_engine(&engine, 5_000);
    engine.end(EndReason::Disconnect, Some(BOB));
    let done = GameRecord::from_engine(&engine, 6_000);

    store.put_game(&done).unwrap();
    let err = store.put_game(&pending).unwrap_err();
    assert!(matches!(err, StoreError::Stale { .. }));

    // Same revision but not finished: still refused.
    let mut regressing = done.clone();
    regressing.status = MatchStatus::Playing;
    assert!(store.put_game(&regressing).is_err());

    assert_eq!(store.get_game(done.game_id), Some(done));
}

#[test]
fn tournament_updates_are_compare_and_swap() {
    let store = MemoryStore::new();
    let t = Tournament::new(TournamentId(store.next_id()), "cup", ALICE, "alice", 4, 0);
    let Versioned { version, mut value } = store.insert_tournament(&t).unwrap();
    assert_eq!(version, 1);
    assert!(matches!(
        store.insert_tournament(&t),
        Err(StoreError::Conflict { .. })
    ));

    value.name = "renamed".into();
    assert_eq!(store.update_tournament(&value, 1), Ok(2));
    assert_eq!(
        store.update_tournament(&value, 1),
        Err(StoreError::Conflict {
            expected: 1,
            actual: 2
        })
    );
    assert_eq!(store.get_tournament(t.tournament_id).unwrap().value.name, "renamed");
}

// ---------------------------------------------------------------------------
// Stats and history
// ---------------------------------------------------------------------------

#[test]
fn stats_count_wins_defeats_and_ignore_live_games() {
    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(10_000));

    // Alice beats bob, loses to carol, ties bob.
    store
        .put_game(&finished(&clock, (ALICE, "alice"), (BOB, "bob"), Some(BOB)))
        .unwrap();
    clock.advance(Duration::from_secs(1));
    store
        .put_game(&finished(&clock, (CAROL, "carol"), (ALICE, "alice"), Some(ALICE)))
        .unwrap();
    clock.advance(Duration::from_secs(1));
    store
        .put_game(&finished(&clock, (BOB, "bob"), (ALICE, "alice"), None))
        .unwrap();
    // Still being played: not counted.
    let live = engine(&clock, (ALICE, "alice"), Some((CAROL, "carol")));
    store
        .put_game(&GameRecord::from_engine(&live, clock.now_ms()))
        .unwrap();

    let stats = history::stats_for(&store, ALICE);
    assert_eq!(stats.games_played, 3);
    assert_eq!(stats.games_won, 1);
    assert_eq!(stats.defeats, 1);

    let stats = history::stats_for(&store, CAROL);
    assert_eq!((stats.games_played, stats.games_won, stats.defeats), (1, 1, 0));
}

#[test]
fn history_lists_finished_games_oldest_first() {
    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(10_000));

    let first = finished(&clock, (ALICE, "alice"), (BOB, "bob"), Some(BOB));
    clock.advance(Duration::from_secs(5));
    let second = finished(&clock, (CAROL, "carol"), (ALICE, "alice"), Some(CAROL));
    // Insert out of order.
    store.put_game(&second).unwrap();
    store.put_game(&first).unwrap();

    let games = history::history_for(&store, ALICE);
    let ids: Vec<MatchId> = games.iter().map(|g| g.game_id).collect();
    assert_eq!(ids, vec![first.game_id, second.game_id]);

    let entry = &games[0];
    assert_eq!(entry.winner_id, Some(ALICE));
    assert_eq!(entry.player1_name.as_deref(), Some("alice"));
    assert_eq!(entry.player2_name.as_deref(), Some("bob"));
    assert_eq!(entry.duration_formatted, "00:00");
    assert_eq!(entry.timestamp, 10_000);
    assert_eq!(games[1].winner_id, Some(ALICE));

    assert!(history::history_for(&store, UserId(99)).is_empty());
}
