use std::time::Duration;

/// How a match moves from "two players present" to "playing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPolicy {
    /// Both players must send `player_ready` first.
    #[default]
    ReadyHandshake,
    /// The match starts as soon as the second player joins.
    ImmediateOnJoin,
}

/// Physics constants and lifecycle policy for every match on a server.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub paddle_width: f64,
    pub paddle_height: f64,
    pub left_paddle_x: f64,
    pub right_paddle_x: f64,
    /// Vertical distance a paddle travels per accepted move.
    pub paddle_speed: f64,
    pub ball_radius: f64,
    /// Per-axis speed of a freshly served ball.
    pub serve_speed: f64,
    /// Multiplier applied to |dx| on every paddle hit.
    pub speedup: f64,
    /// Upper bound on |dx| after speedups.
    pub max_ball_speed: f64,
    pub win_score: u32,
    /// Minimum spacing between two accepted paddle moves of one player.
    pub move_interval: Duration,
    pub start_policy: StartPolicy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            canvas_width: 800.0,
            canvas_height: 600.0,
            paddle_width: 20.0,
            paddle_height: 100.0,
            left_paddle_x: 50.0,
            right_paddle_x: 730.0,
            paddle_speed: 25.0,
            ball_radius: 10.0,
            serve_speed: 40.0,
            speedup: 1.1,
            max_ball_speed: 60.0,
            win_score: 5,
            move_interval: Duration::from_millis(16),
            start_policy: StartPolicy::ReadyHandshake,
        }
    }
}

impl MatchConfig {
    /// Highest `y` a paddle's top edge may reach.
    pub fn paddle_max_y(&self) -> f64 {
        (self.canvas_height - self.paddle_height).max(0.0)
    }
}
