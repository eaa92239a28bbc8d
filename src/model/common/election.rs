use chrono::{DateTime, Utc};
use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Our election IDs are integers.
pub type ElectionId = u32;
/// Our position IDs are integers, unique across all elections.
pub type PositionId = u32;
/// Our candidate IDs are integers, unique across all elections.
pub type CandidateId = u32;

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElectionStatus {
    /// Being authored; ballots may be edited but not cast.
    Inactive,
    /// Open for voting within the election's time window.
    Active,
    /// Closed. Terminal.
    Completed,
}

impl ElectionStatus {
    /// Can ballots be cast at the given instant, for an election running over
    /// `[start_time, end_time)`?
    pub fn accepts_ballots(
        self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        self == Self::Active && start_time <= now && now < end_time
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
