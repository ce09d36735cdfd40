// Competition lifecycle and leaderboard engine.

pub mod api;
pub mod cache;
pub mod competition;
pub mod config;
pub mod criteria;
pub mod db;
pub mod error;
pub mod leaderboard;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod participant;
pub mod snapshot;
pub mod stats;
