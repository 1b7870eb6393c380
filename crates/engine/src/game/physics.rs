//! Ball and paddle physics.
//!
//! Simple axis-aligned circle/rectangle collision. The paddle check is swept
//! along the ball's horizontal travel for the tick, so a fast ball cannot
//! tunnel through a 20 px paddle.

use rand::Rng;

use super::config::MatchConfig;
use super::state::{Ball, Canvas, Direction, MatchState, Paddle, Side};

/// What happened during one physics step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepEvents {
    pub paddle_hit: Option<Side>,
    pub scored: Option<Side>,
}

/// Advance the ball by one tick. Does not touch status or the win check.
pub fn step(state: &mut MatchState, config: &MatchConfig, rng: &mut impl Rng) -> StepEvents {
    let mut events = StepEvents::default();
    let prev_x = state.ball.x;

    state.ball.x += state.ball.dx;
    state.ball.y += state.ball.dy;
    reflect_walls(&mut state.ball, &state.canvas);

    for side in [Side::Player1, Side::Player2] {
        let paddle = *state.paddles.get(side);
        if swept_hit(&state.ball, prev_x, &paddle, side) {
            bounce(&mut state.ball, &paddle, side, config);
            events.paddle_hit = Some(side);
            break;
        }
    }

    let scorer = if state.ball.x <= 0.0 {
        Some(Side::Player2)
    } else if state.ball.x >= state.canvas.width {
        Some(Side::Player1)
    } else {
        None
    };
    if let Some(side) = scorer {
        state.score.add_point(side);
        serve(&mut state.ball, &state.canvas, config.serve_speed, rng);
        events.scored = Some(side);
    }

    events
}

/// Put the ball back in the centre with a random diagonal velocity of
/// `speed` on each axis.
pub fn serve(ball: &mut Ball, canvas: &Canvas, speed: f64, rng: &mut impl Rng) {
    ball.x = canvas.width / 2.0;
    ball.y = canvas.height / 2.0;
    ball.dx = if rng.gen_bool(0.5) { speed } else { -speed };
    ball.dy = if rng.gen_bool(0.5) { speed } else { -speed };
}

/// Move a paddle by one step, clamped to `[0, canvas_height - paddle_height]`.
pub fn move_paddle(paddle: &mut Paddle, direction: Direction, config: &MatchConfig) {
    let delta = match direction {
        Direction::Up => -config.paddle_speed,
        Direction::Down => config.paddle_speed,
    };
    paddle.y = (paddle.y + delta).clamp(0.0, config.paddle_max_y());
}

/// Mirror the ball off the top/bottom walls, keeping it inside the canvas.
fn reflect_walls(ball: &mut Ball, canvas: &Canvas) {
    let r = ball.radius;
    let max_y = canvas.height - r;
    if ball.y < r {
        ball.y = 2.0 * r - ball.y;
        ball.dy = ball.dy.abs();
    } else if ball.y > max_y {
        ball.y = 2.0 * max_y - ball.y;
        ball.dy = -ball.dy.abs();
    }
    ball.y = ball.y.clamp(r, max_y.max(r));
}

/// Did the ball's path this tick cross `paddle` while heading toward it?
fn swept_hit(ball: &Ball, prev_x: f64, paddle: &Paddle, side: Side) -> bool {
    let r = ball.radius;
    let vertical = ball.y + r >= paddle.y && ball.y - r <= paddle.bottom();
    if !vertical {
        return false;
    }
    match side {
        // Leading edge reached the front face, and last tick the ball was not
        // already entirely behind the paddle.
        Side::Player1 => ball.dx < 0.0 && ball.x - r <= paddle.right() && prev_x + r >= paddle.x,
        Side::Player2 => ball.dx > 0.0 && ball.x + r >= paddle.x && prev_x - r <= paddle.right(),
    }
}

fn bounce(ball: &mut Ball, paddle: &Paddle, side: Side, config: &MatchConfig) {
    let speed = (ball.dx.abs() * config.speedup).min(config.max_ball_speed);
    match side {
        Side::Player1 => {
            ball.dx = speed;
            ball.x = paddle.right() + ball.radius;
        }
        Side::Player2 => {
            ball.dx = -speed;
            ball.x = paddle.x - ball.radius;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MatchId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fresh() -> (MatchState, MatchConfig, StdRng) {
        let config = MatchConfig::default();
        let state = MatchState::new(MatchId::new(), &config);
        (state, config, StdRng::seed_from_u64(7))
    }

    #[test]
    fn left_edge_crossing_scores_for_player2_and_recentres() {
        let (mut state, config, mut rng) = fresh();
        state.ball.x = 30.0;
        state.ball.y = 100.0;
        state.ball.dx = -40.0;
        state.ball.dy = 0.0;

        let events = step(&mut state, &config, &mut rng);

        assert_eq!(events.scored, Some(Side::Player2));
        assert_eq!(state.score.player2, 1);
        assert_eq!(state.score.player1, 0);
        assert_eq!(state.ball.x, 400.0);
        assert_eq!(state.ball.y, 300.0);
        assert_eq!(state.ball.dx.abs(), 40.0);
        assert_eq!(state.ball.dy.abs(), 40.0);
    }

    #[test]
    fn right_edge_crossing_scores_for_player1() {
        let (mut state, config, mut rng) = fresh();
        state.ball.x = 780.0;
        state.ball.y = 50.0;
        state.ball.dx = 40.0;
        state.ball.dy = 0.0;

        let events = step(&mut state, &config, &mut rng);
        assert_eq!(events.scored, Some(Side::Player1));
        assert_eq!(state.score.player1, 1);
    }

    #[test]
    fn paddle_hit_reflects_away_and_speeds_up() {
        let (mut state, config, mut rng) = fresh();
        // Left paddle spans x 50..70, y 250..350.
        state.ball.x = 100.0;
        state.ball.y = 300.0;
        state.ball.dx = -40.0;
        state.ball.dy = 0.0;

        let events = step(&mut state, &config, &mut rng);

        assert_eq!(events.paddle_hit, Some(Side::Player1));
        assert!(events.scored.is_none());
        assert!(state.ball.dx > 0.0);
        assert!((state.ball.dx - 44.0).abs() < 1e-9);
        assert_eq!(state.ball.x, 80.0);
    }

    #[test]
    fn fast_ball_does_not_tunnel_through_paddle() {
        let (mut state, config, mut rng) = fresh();
        // Right paddle spans x 730..750. One tick moves the ball from 700 to 760.
        state.ball.x = 700.0;
        state.ball.y = 300.0;
        state.ball.dx = 60.0;
        state.ball.dy = 0.0;

        let events = step(&mut state, &config, &mut rng);
        assert_eq!(events.paddle_hit, Some(Side::Player2));
        assert!(state.ball.dx < 0.0);
        assert_eq!(state.ball.x, 720.0);
    }

    #[test]
    fn speed_is_capped() {
        let (mut state, config, mut rng) = fresh();
        state.ball.x = 100.0;
        state.ball.y = 300.0;
        state.ball.dx = -config.max_ball_speed;
        state.ball.dy = 0.0;

        step(&mut state, &config, &mut rng);
        assert_eq!(state.ball.dx, config.max_ball_speed);
    }

    #[test]
    fn ball_moving_away_is_not_reflected() {
        let (mut state, config, mut rng) = fresh();
        state.ball.x = 75.0;
        state.ball.y = 300.0;
        state.ball.dx = 40.0;
        state.ball.dy = 0.0;

        let events = step(&mut state, &config, &mut rng);
        assert!(events.paddle_hit.is_none());
        assert_eq!(state.ball.dx, 40.0);
    }

    #[test]
    fn walls_reflect_and_keep_ball_inside() {
        let (mut state, config, mut rng) = fresh();
        state.ball.x = 400.0;
        state.ball.y = 20.0;
        state.ball.dx = 0.0;
        state.ball.dy = -40.0;

        step(&mut state, &config, &mut rng);
        assert!(state.ball.dy > 0.0);
        assert!(state.ball.y >= state.ball.radius);

        state.ball.y = 585.0;
        state.ball.dy = 40.0;
        step(&mut state, &config, &mut rng);
        assert!(state.ball.dy < 0.0);
        assert!(state.ball.y <= 600.0 - state.ball.radius);
    }

    #[test]
    fn paddle_movement_is_clamped() {
        let config = MatchConfig::default();
        let mut paddle = Paddle {
            x: 50.0,
            y: 10.0,
            width: 20.0,
            height: 100.0,
        };
        move_paddle(&mut paddle, Direction::Up, &config);
        assert_eq!(paddle.y, 0.0);

        paddle.y = 490.0;
        move_paddle(&mut paddle, Direction::Down, &config);
        assert_eq!(paddle.y, 500.0);
    }
}
