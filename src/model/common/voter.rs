use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// A voter's progress through an election.
///
/// The only transition is `Registered -> Voted`, made by a committed ballot
/// submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoterStatus {
    /// May submit a ballot once assigned to an election.
    Registered,
    /// Has submitted their ballot. Terminal.
    Voted,
}

impl From<VoterStatus> for Bson {
    fn from(status: VoterStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
