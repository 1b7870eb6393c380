use thiserror::Error;

use crate::ids::{BracketMatchId, MatchId, UserId};

/// Failures of match lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("match {0} already exists")]
    DuplicateMatch(MatchId),
    #[error("match is not joinable: {0}")]
    NotJoinable(&'static str),
    #[error("user {0} is not a participant of this match")]
    NotAParticipant(UserId),
    #[error("match {0} not found")]
    MatchNotFound(MatchId),
}

/// Failures of bracket construction, advancement and roster changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BracketError {
    #[error("bracket match {0} not found")]
    MatchNotFound(BracketMatchId),
    #[error("invalid tournament state: {0}")]
    InvalidState(&'static str),
    #[error("tournament is full ({0} players)")]
    Capacity(usize),
    #[error("display name {0:?} is already taken in this tournament")]
    DuplicateDisplayName(String),
    #[error("user {0} is not a participant")]
    NotAParticipant(UserId),
}
