//! Match lifecycle tests: create/join/ready, input throttling, scoring,
//! termination and the match registry.

use std::sync::Arc;
use std::time::Duration;

use pong_engine::MatchError;
use pong_engine::clock::{Clock, ManualClock};
use pong_engine::game::{
    Direction, EndReason, MatchConfig, MatchEngine, MatchStatus, Side, StartPolicy, format_duration,
};
use pong_engine::ids::{MatchId, UserId};
use pong_engine::registry::{MatchRegistry, lock};

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);
const CAROL: UserId = UserId(3);

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(1_000_000))
}

fn new_match(config: MatchConfig, clock: &Arc<ManualClock>) -> MatchEngine {
    let clock: Arc<dyn Clock> = clock.clone();
    MatchEngine::with_seed(MatchId::new(), ALICE, "alice", Arc::new(config), clock, 42)
}

/// Both players seated and ready.
fn playing_match(clock: &Arc<ManualClock>) -> MatchEngine {
    let mut engine = new_match(MatchConfig::default(), clock);
    engine.join(BOB, "bob").unwrap();
    engine.set_ready(ALICE).unwrap();
    engine.set_ready(BOB).unwrap();
    assert_eq!(engine.status(), MatchStatus::Playing);
    engine
}

/// Tick until finished; every serve scores within a handful of ticks when
/// nobody moves, so this is bounded.
fn play_out(engine: &mut MatchEngine) -> u32 {
    let mut ticks = 0;
    while !engine.is_finished() {
        let before = engine.state().score.total();
        let outcome = engine.tick();
        let after = engine.state().score.total();
        if outcome.scored.is_some() {
            assert_eq!(after, before + 1);
        } else {
            assert_eq!(after, before);
        }
        ticks += 1;
        assert!(ticks < 10_000, "match never finished");
    }
    ticks
}

// ---------------------------------------------------------------------------
// Create / join / ready
// ---------------------------------------------------------------------------

#[test]
fn create_produces_waiting_match_with_centred_ball() {
    let clock = clock();
    let engine = new_match(MatchConfig::default(), &clock);
    let state = engine.state();

    assert_eq!(state.status, MatchStatus::Waiting);
    assert_eq!((state.canvas.width, state.canvas.height), (800.0, 600.0));
    assert_eq!((state.ball.x, state.ball.y), (400.0, 300.0));
    assert_eq!(state.ball.dx.abs(), 40.0);
    assert_eq!(state.ball.dy.abs(), 40.0);
    assert_eq!(state.paddles.player1.x, 50.0);
    assert_eq!(state.paddles.player2.x, 730.0);
    assert_eq!(state.paddles.player1.y, 250.0);
    assert_eq!(state.paddles.player2.y, 250.0);
    assert_eq!((state.score.player1, state.score.player2), (0, 0));
    assert_eq!(state.players.id(Side::Player1), Some(ALICE));
    assert!(state.players.player2.is_none());
}

#[test]
fn handshake_start_requires_both_ready() {
    let clock = clock();
    let mut engine = new_match(MatchConfig::default(), &clock);

    let state = engine.join(BOB, "bob").unwrap();
    assert_eq!(state.status, MatchStatus::ReadyPending);

    engine.set_ready(ALICE).unwrap();
    assert_eq!(engine.status(), MatchStatus::ReadyPending);
    assert!(engine.state().started_at.is_none());

    clock.advance(Duration::from_millis(250));
    engine.set_ready(BOB).unwrap();
    assert_eq!(engine.status(), MatchStatus::Playing);
    assert_eq!(engine.state().started_at, Some(clock.now_ms()));
}

#[test]
fn ready_is_idempotent() {
    let clock = clock();
    let mut engine = new_match(MatchConfig::default(), &clock);
    engine.join(BOB, "bob").unwrap();
    engine.set_ready(ALICE).unwrap();
    let revision = engine.revision();
    engine.set_ready(ALICE).unwrap();
    assert_eq!(engine.revision(), revision);
    assert_eq!(engine.status(), MatchStatus::ReadyPending);
}

#[test]
fn immediate_policy_starts_on_join() {
    let clock = clock();
    let config = MatchConfig {
        start_policy: StartPolicy::ImmediateOnJoin,
        ..MatchConfig::default()
    };
    let mut engine = new_match(config, &clock);
    let state = engine.join(BOB, "bob").unwrap();
    assert_eq!(state.status, MatchStatus::Playing);
    assert!(state.started_at.is_some());
}

#[test]
fn cannot_join_own_or_full_match() {
    let clock = clock();
    let mut engine = new_match(MatchConfig::default(), &clock);
    assert!(matches!(engine.join(ALICE, "alice"), Err(MatchError::NotJoinable(_))));

    engine.join(BOB, "bob").unwrap();
    assert!(matches!(engine.join(CAROL, "carol"), Err(MatchError::NotJoinable(_))));
}

#[test]
fn ready_errors() {
    let clock = clock();
    let mut engine = new_match(MatchConfig::default(), &clock);
    assert!(matches!(engine.set_ready(ALICE), Err(MatchError::NotJoinable(_))));

    engine.join(BOB, "bob").unwrap();
    assert!(matches!(
        engine.set_ready(CAROL),
        Err(MatchError::NotAParticipant(u)) if u == CAROL
    ));
}

// ---------------------------------------------------------------------------
// Paddle input
// ---------------------------------------------------------------------------

#[test]
fn two_moves_inside_one_window_count_once() {
    let clock = clock();
    let mut engine = playing_match(&clock);

    assert!(engine.move_paddle(ALICE, Direction::Up));
    assert!(!engine.move_paddle(ALICE, Direction::Up));
    assert_eq!(engine.state().paddles.player1.y, 225.0);

    clock.advance(Duration::from_millis(16));
    assert!(engine.move_paddle(ALICE, Direction::Up));
    assert_eq!(engine.state().paddles.player1.y, 200.0);
}

#[test]
fn paddles_stay_within_canvas() {
    let clock = clock();
    let mut engine = playing_match(&clock);

    for _ in 0..40 {
        clock.advance(Duration::from_millis(20));
        engine.move_paddle(BOB, Direction::Down);
        let y = engine.state().paddles.player2.y;
        assert!((0.0..=500.0).contains(&y));
    }
    assert_eq!(engine.state().paddles.player2.y, 500.0);

    for _ in 0..40 {
        clock.advance(Duration::from_millis(20));
        engine.move_paddle(BOB, Direction::Up);
    }
    assert_eq!(engine.state().paddles.player2.y, 0.0);
}

#[test]
fn moves_ignored_unless_playing_participant() {
    let clock = clock();
    let mut engine = new_match(MatchConfig::default(), &clock);
    assert!(!engine.move_paddle(ALICE, Direction::Down));

    let mut engine = playing_match(&clock);
    assert!(!engine.move_paddle(CAROL, Direction::Down));
    assert_eq!(engine.state().paddles.player1.y, 250.0);
    assert_eq!(engine.state().paddles.player2.y, 250.0);
}

// ---------------------------------------------------------------------------
// Ticks and scoring
// ---------------------------------------------------------------------------

#[test]
fn tick_is_noop_before_play() {
    let clock = clock();
    let mut engine = new_match(MatchConfig::default(), &clock);
    let before = engine.snapshot();
    let outcome = engine.tick();
    assert!(!outcome.finished);
    assert_eq!(engine.snapshot(), before);
}

#[test]
fn match_finishes_at_win_score() {
    let clock = clock();
    let mut engine = playing_match(&clock);
    play_out(&mut engine);

    let state = engine.state();
    assert_eq!(state.status, MatchStatus::Finished);
    assert_eq!(state.end_reason, Some(EndReason::ScoreLimit));
    let winner = state.winner.expect("score limit always has a winner");
    assert_eq!(state.score.get(winner), 5);
    assert!(state.score.get(winner.opponent()) < 5);
    assert!(state.winner_id().is_some());
}

#[test]
fn ball_stays_inside_canvas_every_tick() {
    let clock = clock();
    let mut engine = playing_match(&clock);
    while !engine.is_finished() {
        engine.tick();
        let ball = engine.state().ball;
        assert!(ball.y >= ball.radius && ball.y <= 600.0 - ball.radius);
        assert!(ball.x > 0.0 && ball.x < 800.0);
    }
}

#[test]
fn duration_counts_from_start() {
    let clock = clock();
    let mut engine = playing_match(&clock);
    clock.advance(Duration::from_secs(65));
    let state = engine.end(EndReason::Disconnect, Some(ALICE));

    assert_eq!(state.duration_seconds, 65);
    assert_eq!(state.duration_formatted(), "01:05");
    assert_eq!(format_duration(0), "00:00");
    assert_eq!(format_duration(3600), "60:00");
}

// ---------------------------------------------------------------------------
// Termination
// ---------------------------------------------------------------------------

#[test]
fn leaver_hands_win_to_opponent() {
    let clock = clock();
    let mut engine = playing_match(&clock);
    let state = engine.end(EndReason::Forfeit, Some(BOB));
    assert_eq!(state.winner, Some(Side::Player1));
    assert_eq!(state.winner_id(), Some(ALICE));
    assert_eq!(state.end_reason, Some(EndReason::Forfeit));
}

#[test]
fn tie_without_leaver_has_no_winner() {
    let clock = clock();
    let mut engine = playing_match(&clock);
    let state = engine.end(EndReason::Inactivity, None);
    assert_eq!(state.winner, None);
    assert_eq!(state.duration_seconds, 0);
}

#[test]
fn abandoned_waiting_match_skips_to_finished() {
    let clock = clock();
    let mut engine = new_match(MatchConfig::default(), &clock);
    let state = engine.end(EndReason::Disconnect, Some(ALICE));
    assert_eq!(state.status, MatchStatus::Finished);
    assert_eq!(state.winner, None);
    assert_eq!(state.duration_seconds, 0);
}

#[test]
fn finished_state_is_terminal() {
    let clock = clock();
    let mut engine = playing_match(&clock);
    engine.end(EndReason::Forfeit, Some(ALICE));
    let terminal = engine.snapshot();

    clock.advance(Duration::from_secs(1));
    engine.tick();
    engine.move_paddle(BOB, Direction::Up);
    let _ = engine.set_ready(BOB);
    engine.end(EndReason::Disconnect, Some(BOB));

    assert_eq!(engine.snapshot(), terminal);
}

#[test]
fn finalization_is_claimed_exactly_once() {
    let clock = clock();
    let mut engine = playing_match(&clock);
    assert!(!engine.claim_finalization());

    engine.end(EndReason::Disconnect, Some(BOB));
    assert!(engine.claim_finalization());
    assert!(!engine.claim_finalization());
}

#[test]
fn state_serializes_snake_case() {
    let clock = clock();
    let engine = playing_match(&clock);
    let json = serde_json::to_value(engine.state()).unwrap();
    assert_eq!(json["status"], "playing");
    assert_eq!(json["ball"]["radius"], 10.0);
    assert_eq!(json["players"]["player2"]["display_name"], "bob");
    assert_eq!(json["players"]["player1"]["is_ready"], true);
    assert!(json["winner"].is_null());
    assert!(json["end_reason"].is_null());
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn registry_rejects_duplicate_ids() {
    let clock = clock();
    let registry = MatchRegistry::new();
    let engine = new_match(MatchConfig::default(), &clock);
    let id = engine.id();
    registry.create(engine).unwrap();

    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let twin = MatchEngine::create(id, BOB, "bob", Arc::new(MatchConfig::default()), dyn_clock);
    assert!(matches!(registry.create(twin), Err(MatchError::DuplicateMatch(d)) if d == id));
    assert_eq!(registry.len(), 1);
}

#[test]
fn registry_get_and_remove() {
    let clock = clock();
    let registry = MatchRegistry::new();
    let engine = new_match(MatchConfig::default(), &clock);
    let id = engine.id();
    registry.create(engine).unwrap();

    assert!(registry.exists(id));
    let handle = registry.get(id).unwrap();
    lock(&handle).join(BOB, "bob").unwrap();
    assert_eq!(lock(&registry.get(id).unwrap()).status(), MatchStatus::ReadyPending);

    assert!(registry.remove(id).is_some());
    assert!(!registry.exists(id));
    assert!(registry.get(id).is_none());
    assert!(registry.is_empty());
}

#[test]
fn find_joinable_picks_oldest_foreign_waiting_match() {
    let clock = clock();
    let registry = MatchRegistry::new();
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let config = Arc::new(MatchConfig::default());

    let own = MatchEngine::create(
        MatchId::new(),
        CAROL,
        "carol",
        config.clone(),
        dyn_clock.clone(),
    );
    let own_id = own.id();
    registry.create(own).unwrap();

    let older = MatchEngine::create(
        MatchId::new(),
        ALICE,
        "alice",
        config.clone(),
        dyn_clock.clone(),
    );
    let older_id = older.id();
    registry.create(older).unwrap();

    let newer = MatchEngine::create(MatchId::new(), BOB, "bob", config, dyn_clock);
    registry.create(newer).unwrap();

    assert_eq!(registry.find_joinable(CAROL), Some(older_id));
    assert_eq!(registry.find_joinable(ALICE), Some(own_id));

    lock(&registry.get(older_id).unwrap()).join(UserId(9), "x").unwrap();
    assert_ne!(registry.find_joinable(CAROL), Some(older_id));
    assert_eq!(registry.matches_for(UserId(9)), vec![older_id]);
}
