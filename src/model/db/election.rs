use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::election::{CandidateId, ElectionId, ElectionStatus, PositionId};

/// An election, as stored in the database, with its positions embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    /// Unique ID.
    #[serde(rename = "_id")]
    pub id: ElectionId,
    /// Top-level metadata.
    #[serde(flatten)]
    pub metadata: ElectionMetadata,
    /// Contested positions.
    pub positions: Vec<Position>,
}

impl Election {
    /// Get the position with the given ID, if it belongs to this election.
    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    /// Can ballots be cast for this election at the given instant?
    pub fn accepts_ballots(&self, now: DateTime<Utc>) -> bool {
        self.metadata
            .status
            .accepts_ballots(self.metadata.start_time, self.metadata.end_time, now)
    }
}

/// A view on just the election's top-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionMetadata {
    /// Election name.
    pub name: String,
    /// Election status.
    pub status: ElectionStatus,
    /// Voting opens at this time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Voting closes at this time (exclusive).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
}

/// A contested position. Each voter selects exactly one of its candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub name: String,
    pub candidates: Vec<Candidate>,
}

impl Position {
    /// Get the candidate with the given ID, if they stand for this position.
    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }
}

/// Someone standing for a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub party: Option<String>,
    /// Reference to an image, resolved by the frontend.
    pub avatar: Option<String>,
}
