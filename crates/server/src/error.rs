//! Service-level error taxonomy.
//!
//! Handlers return [`ServiceError`]; the connection turns it into an
//! `error` message for that client only, via [`ServiceError::user_message`].

use pong_engine::ids::{MatchId, TournamentId, UserId};
use pong_engine::{BracketError, MatchError};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("match {0} already exists")]
    DuplicateMatch(MatchId),
    #[error("not joinable: {0}")]
    NotJoinable(&'static str),
    #[error("user {0} is not a participant")]
    NotAParticipant(UserId),
    #[error("match {0} not found")]
    MatchNotFound(String),
    #[error("tournament {0} not found")]
    TournamentNotFound(TournamentId),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("tournament is full ({0} players)")]
    Capacity(usize),
    #[error("display name {0:?} is already taken")]
    DuplicateDisplayName(String),
    #[error("gave up after repeated concurrent updates")]
    Contention,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Short, client-safe reason. Internal detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::DuplicateMatch(_) => "Game already exists".into(),
            ServiceError::NotJoinable(reason) => capitalize(reason),
            ServiceError::NotAParticipant(_) => "You are not a player in this game".into(),
            ServiceError::MatchNotFound(_) => "Game not found".into(),
            ServiceError::TournamentNotFound(_) => "Tournament not found".into(),
            ServiceError::InvalidState(reason) => capitalize(reason),
            ServiceError::Capacity(_) => "Tournament is full".into(),
            ServiceError::DuplicateDisplayName(_) => "Display name already taken".into(),
            ServiceError::Contention | ServiceError::Store(_) => {
                "Server is busy, please retry".into()
            }
            ServiceError::BadRequest(_) => "Invalid message".into(),
        }
    }
}

fn capitalize(reason: &str) -> String {
    let mut chars = reason.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<MatchError> for ServiceError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::DuplicateMatch(id) => ServiceError::DuplicateMatch(id),
            MatchError::NotJoinable(reason) => ServiceError::NotJoinable(reason),
            MatchError::NotAParticipant(user) => ServiceError::NotAParticipant(user),
            MatchError::MatchNotFound(id) => ServiceError::MatchNotFound(id.to_string()),
        }
    }
}

impl From<BracketError> for ServiceError {
    fn from(e: BracketError) -> Self {
        match e {
            BracketError::MatchNotFound(id) => ServiceError::MatchNotFound(id.to_string()),
            BracketError::InvalidState(reason) => ServiceError::InvalidState(reason),
            BracketError::Capacity(max) => ServiceError::Capacity(max),
            BracketError::DuplicateDisplayName(name) => ServiceError::DuplicateDisplayName(name),
            BracketError::NotAParticipant(user) => ServiceError::NotAParticipant(user),
        }
    }
}
