//! Process configuration from command-line flags.
//!
//! Every flag is optional; `ServerConfig::default()` is what a bare
//! `pong-server` invocation runs with.

use std::path::PathBuf;
use std::time::Duration;

use pong_engine::game::{MatchConfig, StartPolicy};

use crate::simulation::LoopConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket gateway address.
    pub bind_addr: String,
    pub dashboard_port: u16,
    /// Snapshot directory for games and tournaments.
    pub data_dir: PathBuf,
    pub tick_hz: u32,
    /// Broadcast state every N ticks.
    pub broadcast_every: u32,
    /// Minimum spacing of in-play durable writes per match.
    pub persist_interval: Duration,
    pub autosave_interval: Duration,
    pub sweep_interval: Duration,
    /// Matches idle for this long are swept.
    pub stale_after: Duration,
    pub win_score: u32,
    pub start_policy: StartPolicy,
    pub move_interval: Duration,
    pub default_max_players: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            dashboard_port: 8000,
            data_dir: "data".into(),
            tick_hz: 60,
            broadcast_every: 1,
            persist_interval: Duration::from_secs(1),
            autosave_interval: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(300),
            win_score: 5,
            start_policy: StartPolicy::ReadyHandshake,
            move_interval: Duration::from_millis(16),
            default_max_players: 8,
        }
    }
}

impl ServerConfig {
    /// Parse flags like `--bind 127.0.0.1:9000 --tick-hz 30 --immediate-start`.
    /// Unknown flags are ignored; unparsable values fall back to the default.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| {
            parsed(&args, name).map(Duration::from_millis).unwrap_or(default)
        };
        let secs = |name: &str, default: Duration| {
            parsed(&args, name).map(Duration::from_secs).unwrap_or(default)
        };

        Self {
            bind_addr: flag(&args, "--bind").unwrap_or(defaults.bind_addr),
            dashboard_port: parsed(&args, "--dashboard-port").unwrap_or(defaults.dashboard_port),
            data_dir: flag(&args, "--data").map(PathBuf::from).unwrap_or(defaults.data_dir),
            tick_hz: parsed(&args, "--tick-hz")
                .filter(|hz| *hz > 0)
                .unwrap_or(defaults.tick_hz),
            broadcast_every: parsed(&args, "--broadcast-every")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.broadcast_every),
            persist_interval: millis("--persist-ms", defaults.persist_interval),
            autosave_interval: secs("--autosave-secs", defaults.autosave_interval),
            sweep_interval: secs("--sweep-secs", defaults.sweep_interval),
            stale_after: secs("--stale-secs", defaults.stale_after),
            win_score: parsed(&args, "--win-score")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.win_score),
            start_policy: if args.iter().any(|a| a == "--immediate-start") {
                StartPolicy::ImmediateOnJoin
            } else {
                defaults.start_policy
            },
            move_interval: millis("--move-ms", defaults.move_interval),
            default_max_players: parsed(&args, "--max-players")
                .filter(|n| *n >= 2)
                .unwrap_or(defaults.default_max_players),
        }
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            win_score: self.win_score,
            move_interval: self.move_interval,
            start_policy: self.start_policy,
            ..MatchConfig::default()
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            tick_interval: Duration::from_secs(1) / self.tick_hz,
            broadcast_every: self.broadcast_every,
            persist_interval: self.persist_interval,
        }
    }
}

fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter().skip_while(|a| *a != name).nth(1).cloned()
}

fn parsed<T: std::str::FromStr>(args: &[String], name: &str) -> Option<T> {
    flag(args, name).and_then(|s| s.parse().ok())
}
