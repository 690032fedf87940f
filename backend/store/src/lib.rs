//! # Store
//!
//! Events, participants and votes, plus the rules that decide when voting
//! opens and when results are shown.
//!
//! ## Redis layout
//!
//! - `event:next_id`, `participant:next_id`: id counters, `INCR`
//! - `event:{id}`: hash (name, expected_players, is_voting_open, created_at)
//! - `participant:{id}`: hash (event_id, name, photo, session_uid)
//! - `event:{id}:participants`: list of participant ids in join order
//! - `event:{id}:sessions`: hash session uid -> participant id, written with `HSETNX`
//! - `event:{id}:ballots`: hash voter id -> candidate id, written with `HSETNX`
//!
//! `HSETNX` is what keeps one registration per session and one vote per voter,
//! even with several server replicas racing on the same keys.
//!
//! ## Memory
//!
//! Same semantics behind a mutex, for local runs and tests.

use async_trait::async_trait;
use thiserror::Error;

pub mod database;
pub mod memory;
pub mod models;
pub mod tally;
pub mod voting;

pub use database::{RedisStore, init_redis};
pub use memory::MemoryStore;
pub use models::{Ballot, Event, Joined, NewParticipant, Participant, Vote};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_event(&self, name: &str, expected_players: u32) -> Result<Event>;

    async fn event(&self, id: u64) -> Result<Option<Event>>;

    async fn open_voting(&self, id: u64) -> Result<()>;

    async fn join(&self, new: NewParticipant) -> Result<Joined>;

    async fn participant(&self, id: u64) -> Result<Option<Participant>>;

    async fn participant_by_session(
        &self,
        event_id: u64,
        session_uid: &str,
    ) -> Result<Option<Participant>>;

    /// Participants of an event in join order.
    async fn participants(&self, event_id: u64) -> Result<Vec<Participant>>;

    async fn vote_of(&self, voter_id: u64) -> Result<Option<Vote>>;

    async fn cast_vote(&self, vote: Vote) -> Result<Ballot>;

    async fn votes(&self, event_id: u64) -> Result<Vec<Vote>>;

    async fn vote_count(&self, event_id: u64) -> Result<usize>;
}
