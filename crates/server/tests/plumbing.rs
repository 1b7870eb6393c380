//! Flag parsing and topic fan-out.

use std::time::Duration;

use pong_engine::game::StartPolicy;
use pong_engine::ids::{MatchId, UserId};
use pong_server::config::ServerConfig;
use pong_server::protocol::ServerMessage;
use pong_server::pubsub::{PubSub, Topic};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

fn args(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

// ---------------------------------------------------------------------------
// ServerConfig::from_args
// ---------------------------------------------------------------------------

#[test]
fn no_flags_gives_defaults() {
    let config = ServerConfig::from_args(Vec::new());
    assert_eq!(config.bind_addr, "0.0.0.0:8080");
    assert_eq!(config.dashboard_port, 8000);
    assert_eq!(config.tick_hz, 60);
    assert_eq!(config.win_score, 5);
    assert_eq!(config.start_policy, StartPolicy::ReadyHandshake);
    assert_eq!(config.default_max_players, 8);
}

#[test]
fn flags_override_defaults() {
    let config = ServerConfig::from_args(args(
        "--bind 127.0.0.1:9000 --tick-hz 30 --win-score 11 --persist-ms 250 \
         --stale-secs 10 --data /tmp/pong --immediate-start",
    ));
    assert_eq!(config.bind_addr, "127.0.0.1:9000");
    assert_eq!(config.tick_hz, 30);
    assert_eq!(config.win_score, 11);
    assert_eq!(config.persist_interval, Duration::from_millis(250));
    assert_eq!(config.stale_after, Duration::from_secs(10));
    assert_eq!(config.data_dir, std::path::PathBuf::from("/tmp/pong"));
    assert_eq!(config.start_policy, StartPolicy::ImmediateOnJoin);

    let match_config = config.match_config();
    assert_eq!(match_config.win_score, 11);
    assert_eq!(match_config.start_policy, StartPolicy::ImmediateOnJoin);
}

#[test]
fn bad_values_fall_back() {
    let config = ServerConfig::from_args(args(
        "--tick-hz 0 --win-score lots --max-players 1 --dashboard-port 99999 --unknown x",
    ));
    let defaults = ServerConfig::default();
    assert_eq!(config.tick_hz, defaults.tick_hz);
    assert_eq!(config.win_score, defaults.win_score);
    assert_eq!(config.default_max_players, defaults.default_max_players);
    assert_eq!(config.dashboard_port, defaults.dashboard_port);
}

#[test]
fn loop_config_derives_tick_interval() {
    let config = ServerConfig::from_args(args("--tick-hz 50 --broadcast-every 3"));
    let loop_config = config.loop_config();
    assert_eq!(loop_config.tick_interval, Duration::from_millis(20));
    assert_eq!(loop_config.broadcast_every, 3);
}

// ---------------------------------------------------------------------------
// PubSub
// ---------------------------------------------------------------------------

#[test]
fn publish_without_subscribers_is_a_no_op() {
    let pubsub = PubSub::new();
    let topic = Topic::Game(MatchId::new());
    assert_eq!(pubsub.publish(topic, ServerMessage::error("nobody home")), 0);
    assert_eq!(pubsub.topic_count(), 0);
}

#[test]
fn subscribers_receive_only_their_topic() {
    let pubsub = PubSub::new();
    let mine = Topic::User(UserId(1));
    let theirs = Topic::User(UserId(2));
    let mut a = pubsub.subscribe(mine);
    let mut b = pubsub.subscribe(mine);
    let mut other = pubsub.subscribe(theirs);

    assert_eq!(pubsub.publish(mine, ServerMessage::error("hi")), 2);
    assert_eq!(pubsub.subscriber_count(mine), 2);

    for rx in [&mut a, &mut b] {
        let message = rx.try_recv().unwrap();
        assert!(matches!(&*message, ServerMessage::Error { message } if message == "hi"));
    }
    assert!(matches!(other.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn closing_a_topic_ends_its_subscribers() {
    let pubsub = PubSub::new();
    let topic = Topic::Game(MatchId::new());
    let mut rx = pubsub.subscribe(topic);

    pubsub.close(topic);
    assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    assert_eq!(pubsub.subscriber_count(topic), 0);
    assert_eq!(pubsub.publish(topic, ServerMessage::error("late")), 0);
}

#[test]
fn topics_format_as_channel_names() {
    assert_eq!(Topic::User(UserId(7)).to_string(), "user_7");
}
