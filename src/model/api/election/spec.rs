use chrono::{DateTime, Utc};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::election::{CandidateId, ElectionId, ElectionStatus, PositionId},
    db::election::{Candidate, Election, ElectionMetadata, Position},
};

/// An election specification, as authored by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    /// Election name.
    pub name: String,
    /// Voting opens at this time.
    pub start_time: DateTime<Utc>,
    /// Voting closes at this time (exclusive).
    pub end_time: DateTime<Utc>,
    /// Contested positions, in ballot order.
    pub positions: Vec<PositionSpec>,
}

impl ElectionSpec {
    /// Reject specs that could never produce a usable ballot.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::Status(Status::BadRequest, msg));
        if self.name.trim().is_empty() {
            return bad("Election name must not be empty".to_string());
        }
        if self.start_time >= self.end_time {
            return bad(format!(
                "Election must start before it ends ({} >= {})",
                self.start_time, self.end_time
            ));
        }
        if self.positions.is_empty() {
            return bad("Election must contest at least one position".to_string());
        }
        for position in &self.positions {
            if position.name.trim().is_empty() {
                return bad("Position name must not be empty".to_string());
            }
            if position.candidates.is_empty() {
                return bad(format!("Position '{}' has no candidates", position.name));
            }
            if position.candidates.iter().any(|c| c.name.trim().is_empty()) {
                return bad(format!(
                    "Position '{}' has a candidate with no name",
                    position.name
                ));
            }
        }
        Ok(())
    }

    /// Number of position IDs this spec needs.
    pub fn position_count(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Number of candidate IDs this spec needs.
    pub fn candidate_count(&self) -> u32 {
        self.positions
            .iter()
            .map(|p| p.candidates.len() as u32)
            .sum()
    }

    /// Convert this spec into an inactive election, numbering positions and
    /// candidates consecutively from the given first IDs.
    pub fn into_election(
        self,
        id: ElectionId,
        first_position: PositionId,
        first_candidate: CandidateId,
    ) -> Election {
        let mut next_candidate = first_candidate;
        let positions = self
            .positions
            .into_iter()
            .zip(first_position..)
            .map(|(spec, position_id)| Position {
                id: position_id,
                name: spec.name,
                candidates: spec
                    .candidates
                    .into_iter()
                    .map(|c| {
                        let candidate = Candidate {
                            id: next_candidate,
                            name: c.name,
                            party: c.party,
                            avatar: c.avatar,
                        };
                        next_candidate += 1;
                        candidate
                    })
                    .collect(),
            })
            .collect();

        Election {
            id,
            metadata: ElectionMetadata {
                name: self.name,
                status: ElectionStatus::Inactive,
                start_time: self.start_time,
                end_time: self.end_time,
            },
            positions,
        }
    }
}

/// A position specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSpec {
    pub name: String,
    pub candidates: Vec<CandidateSpec>,
}

/// A candidate specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use super::*;

    use chrono::Duration;

    impl ElectionSpec {
        pub fn current_example() -> Self {
            let start_time = Utc::now() - Duration::days(1);
            Self {
                name: "Student Union 2026".to_string(),
                start_time,
                end_time: start_time + Duration::days(14),
                positions: vec![
                    PositionSpec {
                        name: "President".to_string(),
                        candidates: vec![
                            CandidateSpec::named("Grace Hopper", Some("Compilers")),
                            CandidateSpec::named("Alan Turing", None),
                        ],
                    },
                    PositionSpec {
                        name: "Treasurer".to_string(),
                        candidates: vec![
                            CandidateSpec::named("Ada Lovelace", Some("Engines")),
                            CandidateSpec::named("Charles Babbage", Some("Engines")),
                        ],
                    },
                ],
            }
        }
    }

    impl CandidateSpec {
        pub fn named(name: &str, party: Option<&str>) -> Self {
            Self {
                name: name.to_string(),
                party: party.map(str::to_string),
                avatar: None,
            }
        }
    }
}
