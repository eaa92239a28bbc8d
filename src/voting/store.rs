//! The storage seam between the voting core and a concrete database.
//!
//! Everything the core reads or writes goes through a [`BallotSession`],
//! which is one isolated transaction: reads observe a single consistent
//! snapshot, writes become visible together on [`BallotSession::commit`], and
//! nothing is written if the session is aborted or dropped.

use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::{
    common::election::ElectionId,
    db::{
        election::Election,
        vote::{Vote, VoteCore},
        voter::Voter,
    },
    mongodb::{errors, Id},
};

/// A failure inside the store, classified by what the caller can do about it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing was committed; retrying from scratch may succeed.
    #[error("{0}")]
    Transient(String),
    /// A vote for the same voter and position already exists.
    #[error("duplicate vote")]
    DuplicateVote,
    #[error("{0}")]
    Fatal(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if errors::is_duplicate_key_error(&err) {
            Self::DuplicateVote
        } else if errors::is_transient_error(&err) || errors::is_unknown_commit_result(&err) {
            Self::Transient(err.to_string())
        } else {
            Self::Fatal(err.to_string())
        }
    }
}

/// A handle on durable storage that can open transactions.
#[rocket::async_trait]
pub trait BallotStore: Send + Sync {
    /// Start a new transaction.
    async fn begin(&self) -> Result<Box<dyn BallotSession>, StoreError>;
}

/// One open transaction against a [`BallotStore`].
#[rocket::async_trait]
pub trait BallotSession: Send {
    async fn voter(&mut self, id: Id) -> Result<Option<Voter>, StoreError>;

    async fn election(&mut self, id: ElectionId) -> Result<Option<Election>, StoreError>;

    /// Every vote recorded for the given voter, in position order.
    async fn votes_for_voter(&mut self, voter: Id) -> Result<Vec<Vote>, StoreError>;

    async fn insert_votes(&mut self, votes: &[VoteCore]) -> Result<(), StoreError>;

    /// Move the voter from `Registered` to `Voted`. Returns `false`, changing
    /// nothing, if they were not `Registered`.
    async fn mark_voted(&mut self, voter: Id) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}
