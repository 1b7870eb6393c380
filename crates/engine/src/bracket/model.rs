//! Tournament and bracket records.
//!
//! These are the durable shapes: the server stores a whole [`Tournament`]
//! (bracket included) as one versioned record and mutates it through the
//! pure functions in [`super::builder`], [`super::advancer`] and
//! [`super::roster`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{BracketMatchId, MatchId, TournamentId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketMatchStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl BracketMatchStatus {
    pub fn is_open(self) -> bool {
        matches!(self, BracketMatchStatus::Pending | BracketMatchStatus::InProgress)
    }
}

/// A player slot in a bracket match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "user_id")]
pub enum Slot {
    /// Waiting on a feeder match.
    Unassigned,
    /// No opponent will ever arrive.
    Bye,
    Player(UserId),
}

impl Slot {
    pub fn player(self) -> Option<UserId> {
        match self {
            Slot::Player(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentPlayer {
    pub user_id: UserId,
    pub display_name: String,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketMatch {
    pub match_id: BracketMatchId,
    pub tournament_id: TournamentId,
    pub round_number: u32,
    pub match_number: u32,
    pub player1: Slot,
    pub player2: Slot,
    pub winner_id: Option<UserId>,
    pub status: BracketMatchStatus,
    pub linked_game_id: Option<MatchId>,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
}

impl BracketMatch {
    pub fn new(
        match_id: BracketMatchId,
        tournament_id: TournamentId,
        round_number: u32,
        match_number: u32,
        player1: Slot,
        player2: Slot,
    ) -> Self {
        Self {
            match_id,
            tournament_id,
            round_number,
            match_number,
            player1,
            player2,
            winner_id: None,
            status: BracketMatchStatus::Pending,
            linked_game_id: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn has_player(&self, user: UserId) -> bool {
        self.player1 == Slot::Player(user) || self.player2 == Slot::Player(user)
    }

    /// The other seated player, if `user` is seated and has one.
    pub fn opponent_of(&self, user: UserId) -> Option<UserId> {
        if self.player1 == Slot::Player(user) {
            self.player2.player()
        } else if self.player2 == Slot::Player(user) {
            self.player1.player()
        } else {
            None
        }
    }

    pub fn players(&self) -> Option<(UserId, UserId)> {
        Some((self.player1.player()?, self.player2.player()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub tournament_id: TournamentId,
    pub name: String,
    pub creator_id: UserId,
    /// Join order is seeding order.
    #[serde(with = "roster_list")]
    pub players: IndexMap<UserId, TournamentPlayer>,
    pub status: TournamentStatus,
    pub max_players: usize,
    pub winner_id: Option<UserId>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub num_rounds: u32,
    pub matches: Vec<BracketMatch>,
}

impl Tournament {
    /// A pending tournament with the creator seated as first player.
    pub fn new(
        tournament_id: TournamentId,
        name: impl Into<String>,
        creator_id: UserId,
        creator_display_name: impl Into<String>,
        max_players: usize,
        now: u64,
    ) -> Self {
        let mut players = IndexMap::new();
        players.insert(
            creator_id,
            TournamentPlayer {
                user_id: creator_id,
                display_name: creator_display_name.into(),
                alive: true,
            },
        );
        Self {
            tournament_id,
            name: name.into(),
            creator_id,
            players,
            status: TournamentStatus::Pending,
            max_players,
            winner_id: None,
            created_at: now,
            started_at: None,
            ended_at: None,
            num_rounds: 0,
            matches: Vec::new(),
        }
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.players.contains_key(&user)
    }

    pub fn is_alive(&self, user: UserId) -> bool {
        self.players.get(&user).is_some_and(|p| p.alive)
    }

    pub fn alive_players(&self) -> Vec<UserId> {
        self.players
            .values()
            .filter(|p| p.alive)
            .map(|p| p.user_id)
            .collect()
    }

    pub fn display_name(&self, user: UserId) -> Option<&str> {
        self.players.get(&user).map(|p| p.display_name.as_str())
    }

    pub fn find_match(&self, id: BracketMatchId) -> Option<&BracketMatch> {
        self.matches.iter().find(|m| m.match_id == id)
    }

    pub fn match_index(&self, id: BracketMatchId) -> Option<usize> {
        self.matches.iter().position(|m| m.match_id == id)
    }

    /// Index of the slot at `(round, number)`, if that slot exists.
    pub fn slot_index(&self, round: u32, number: u32) -> Option<usize> {
        self.matches
            .iter()
            .position(|m| m.round_number == round && m.match_number == number)
    }

    pub fn find_by_game(&self, game: MatchId) -> Option<&BracketMatch> {
        self.matches.iter().find(|m| m.linked_game_id == Some(game))
    }

    pub fn round(&self, round: u32) -> impl Iterator<Item = &BracketMatch> {
        self.matches.iter().filter(move |m| m.round_number == round)
    }

    /// Open match in which `user` faces a seated opponent.
    pub fn playable_match_for(&self, user: UserId) -> Option<&BracketMatch> {
        self.matches.iter().find(|m| {
            m.status.is_open() && m.has_player(user) && m.opponent_of(user).is_some()
        })
    }

    pub(crate) fn eliminate(&mut self, user: UserId) {
        if let Some(player) = self.players.get_mut(&user) {
            player.alive = false;
        }
    }
}

/// The roster serializes as a plain list of players in join order.
mod roster_list {
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TournamentPlayer;
    use crate::ids::UserId;

    pub fn serialize<S: Serializer>(
        players: &IndexMap<UserId, TournamentPlayer>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(players.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<UserId, TournamentPlayer>, D::Error> {
        let list = Vec::<TournamentPlayer>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|p| (p.user_id, p)).collect())
    }
}
