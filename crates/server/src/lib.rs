pub mod app;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod games;
pub mod history;
pub mod persistence;
pub mod protocol;
pub mod pubsub;
pub mod simulation;
pub mod store;
pub mod sweeper;
pub mod tournament;

pub mod net {
    pub mod connection;
    pub mod listener;
}
