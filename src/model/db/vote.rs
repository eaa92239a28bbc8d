use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{CandidateId, ElectionId, PositionId},
    mongodb::Id,
};

/// A single recorded vote. Votes are immutable once inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    /// Foreign key voter ID.
    pub voter_id: Id,
    /// Foreign key election ID, always the voter's own assignment.
    pub election_id: ElectionId,
    /// Foreign key position ID.
    pub position_id: PositionId,
    /// The selected candidate.
    pub candidate_id: CandidateId,
    /// Shared by every vote of one submission.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}
