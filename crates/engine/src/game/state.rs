//! The serializable snapshot of one match.
//!
//! [`MatchState`] is the single canonical shape of a match: it is what gets
//! broadcast to clients every tick and what is stored as the game record's
//! state blob. Field names serialize in `snake_case`.

use serde::{Deserialize, Serialize};

use crate::ids::{MatchId, UserId};

use super::config::MatchConfig;

// ── Enums ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Waiting,
    ReadyPending,
    Playing,
    Finished,
}

impl MatchStatus {
    /// Position in the forward-only lifecycle.
    pub fn rank(self) -> u8 {
        match self {
            MatchStatus::Waiting => 0,
            MatchStatus::ReadyPending => 1,
            MatchStatus::Playing => 2,
            MatchStatus::Finished => 3,
        }
    }

    pub fn is_finished(self) -> bool {
        self == MatchStatus::Finished
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Player1,
    Player2,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Player1 => Side::Player2,
            Side::Player2 => Side::Player1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    ScoreLimit,
    Disconnect,
    Forfeit,
    Inactivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

// ── Geometry ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Paddle {
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paddles {
    pub player1: Paddle,
    pub player2: Paddle,
}

impl Paddles {
    pub fn get(&self, side: Side) -> &Paddle {
        match side {
            Side::Player1 => &self.player1,
            Side::Player2 => &self.player2,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Player1 => &mut self.player1,
            Side::Player2 => &mut self.player2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub player1: u32,
    pub player2: u32,
}

impl Score {
    pub fn get(&self, side: Side) -> u32 {
        match side {
            Side::Player1 => self.player1,
            Side::Player2 => self.player2,
        }
    }

    pub fn add_point(&mut self, side: Side) {
        match side {
            Side::Player1 => self.player1 += 1,
            Side::Player2 => self.player2 += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.player1 + self.player2
    }

    /// Side with the strictly higher score; `None` on a tie.
    pub fn leader(&self) -> Option<Side> {
        match self.player1.cmp(&self.player2) {
            std::cmp::Ordering::Greater => Some(Side::Player1),
            std::cmp::Ordering::Less => Some(Side::Player2),
            std::cmp::Ordering::Equal => None,
        }
    }
}

// ── Players ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub id: UserId,
    pub display_name: String,
    pub is_ready: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    pub player1: Option<PlayerSlot>,
    pub player2: Option<PlayerSlot>,
}

impl Players {
    pub fn get(&self, side: Side) -> Option<&PlayerSlot> {
        match side {
            Side::Player1 => self.player1.as_ref(),
            Side::Player2 => self.player2.as_ref(),
        }
    }

    pub fn get_mut(&mut self, side: Side) -> Option<&mut PlayerSlot> {
        match side {
            Side::Player1 => self.player1.as_mut(),
            Side::Player2 => self.player2.as_mut(),
        }
    }

    /// Which side `user` plays on, if any.
    pub fn side_of(&self, user: UserId) -> Option<Side> {
        if self.player1.as_ref().is_some_and(|p| p.id == user) {
            Some(Side::Player1)
        } else if self.player2.as_ref().is_some_and(|p| p.id == user) {
            Some(Side::Player2)
        } else {
            None
        }
    }

    pub fn id(&self, side: Side) -> Option<UserId> {
        self.get(side).map(|p| p.id)
    }

    pub fn both_ready(&self) -> bool {
        matches!(
            (&self.player1, &self.player2),
            (Some(a), Some(b)) if a.is_ready && b.is_ready
        )
    }
}

// ── MatchState ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    pub match_id: MatchId,
    pub canvas: Canvas,
    pub ball: Ball,
    pub paddles: Paddles,
    pub paddle_speed: f64,
    pub score: Score,
    pub status: MatchStatus,
    pub players: Players,
    pub started_at: Option<u64>,
    pub winner: Option<Side>,
    pub duration_seconds: u64,
    pub end_reason: Option<EndReason>,
}

impl MatchState {
    /// Fresh waiting state: paddles centred vertically, ball at rest in the
    /// centre. The engine serves the ball right after construction.
    pub fn new(match_id: MatchId, config: &MatchConfig) -> Self {
        let paddle_y = (config.canvas_height - config.paddle_height) / 2.0;
        let paddle = |x| Paddle {
            x,
            y: paddle_y,
            width: config.paddle_width,
            height: config.paddle_height,
        };
        Self {
            match_id,
            canvas: Canvas {
                width: config.canvas_width,
                height: config.canvas_height,
            },
            ball: Ball {
                x: config.canvas_width / 2.0,
                y: config.canvas_height / 2.0,
                dx: 0.0,
                dy: 0.0,
                radius: config.ball_radius,
            },
            paddles: Paddles {
                player1: paddle(config.left_paddle_x),
                player2: paddle(config.right_paddle_x),
            },
            paddle_speed: config.paddle_speed,
            score: Score::default(),
            status: MatchStatus::Waiting,
            players: Players::default(),
            started_at: None,
            winner: None,
            duration_seconds: 0,
            end_reason: None,
        }
    }

    pub fn winner_id(&self) -> Option<UserId> {
        self.winner.and_then(|side| self.players.id(side))
    }

    pub fn duration_formatted(&self) -> String {
        format_duration(self.duration_seconds)
    }
}

/// `MM:SS`, minutes not capped at 59.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
