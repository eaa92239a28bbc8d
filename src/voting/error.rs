use rocket::http::Status;
use thiserror::Error;

use crate::model::{common::election::ElectionId, mongodb::Id};

use super::store::StoreError;

/// Why a voter could not be shown a ballot, or could not submit one.
#[derive(Debug, Error)]
pub enum VotingError {
    #[error("voter {0} not found")]
    VoterNotFound(Id),
    #[error("election {0} not found")]
    ElectionNotFound(ElectionId),
    #[error("voter is not assigned to an election")]
    NotAssigned,
    #[error("voter has already voted")]
    AlreadyVoted,
    #[error("election {0} is not accepting ballots")]
    ElectionNotActive(ElectionId),
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("transient store failure: {0}")]
    TransientStoreFailure(String),
    #[error("store failure: {0}")]
    Store(String),
}

impl VotingError {
    /// Stable, machine-readable name of this rejection.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VoterNotFound(_) => "voter_not_found",
            Self::ElectionNotFound(_) => "election_not_found",
            Self::NotAssigned => "not_assigned",
            Self::AlreadyVoted => "already_voted",
            Self::ElectionNotActive(_) => "election_not_active",
            Self::InvalidSelection(_) => "invalid_selection",
            Self::TransientStoreFailure(_) => "transient_store_failure",
            Self::Store(_) => "internal",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::VoterNotFound(_) | Self::ElectionNotFound(_) => Status::NotFound,
            Self::NotAssigned | Self::ElectionNotActive(_) => Status::Forbidden,
            Self::AlreadyVoted => Status::Conflict,
            Self::InvalidSelection(_) => Status::UnprocessableEntity,
            Self::TransientStoreFailure(_) => Status::ServiceUnavailable,
            Self::Store(_) => Status::InternalServerError,
        }
    }

    /// Nothing was committed, and running the whole submission again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStoreFailure(_))
    }

    /// A message that is safe to show to the voter. Store failures are
    /// reported generically; their detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::TransientStoreFailure(_) | Self::Store(_) => {
                "Your ballot could not be recorded. Nothing was counted; please try again."
                    .to_string()
            }
            Self::AlreadyVoted => "You have already voted.".to_string(),
            Self::NotAssigned => "You are not registered for any election.".to_string(),
            other => {
                let mut message = other.to_string();
                if let Some(first) = message.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                message
            }
        }
    }
}

impl From<StoreError> for VotingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => Self::TransientStoreFailure(msg),
            // Another submission already recorded this voter's votes.
            StoreError::DuplicateVote => Self::AlreadyVoted,
            StoreError::Fatal(msg) => Self::Store(msg),
        }
    }
}
