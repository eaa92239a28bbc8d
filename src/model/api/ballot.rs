use std::collections::{btree_map::Entry, BTreeMap};
use std::fmt::Formatter;

use chrono::{DateTime, Utc};
use serde::{
    de::{Error as _, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use thiserror::Error;

use crate::model::{
    common::election::{CandidateId, ElectionId, PositionId},
    db::vote::Vote,
};

/// Why a selections map was refused at the parsing boundary.
#[derive(Debug, Error)]
pub enum SelectionsError {
    #[error("a ballot must select at least one candidate")]
    Empty,
    #[error("position {0} is selected more than once")]
    Repeated(PositionId),
}

/// A voter's choice of candidate for each position, keyed by position ID.
///
/// On the wire this is a JSON object whose keys are position IDs, e.g.
/// `{"3": 7, "4": 12}`. Non-numeric IDs, repeated IDs and empty maps are
/// rejected while parsing, before the request reaches the submission engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "BTreeMap<PositionId, CandidateId>")]
pub struct Selections(BTreeMap<PositionId, CandidateId>);

impl Selections {
    /// The candidate selected for the given position, if any.
    pub fn get(&self, position: PositionId) -> Option<CandidateId> {
        self.0.get(&position).copied()
    }

    /// Iterate `(position, candidate)` pairs in ascending position order.
    pub fn iter(&self) -> impl Iterator<Item = (PositionId, CandidateId)> + '_ {
        self.0.iter().map(|(&p, &c)| (p, c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<BTreeMap<PositionId, CandidateId>> for Selections {
    type Error = SelectionsError;

    fn try_from(map: BTreeMap<PositionId, CandidateId>) -> Result<Self, Self::Error> {
        if map.is_empty() {
            return Err(SelectionsError::Empty);
        }
        Ok(Self(map))
    }
}

impl From<Selections> for BTreeMap<PositionId, CandidateId> {
    fn from(selections: Selections) -> Self {
        selections.0
    }
}

/// Builds the map by hand, since collecting into a `BTreeMap` would let a
/// repeated key silently overwrite the earlier selection.
struct SelectionsVisitor;

impl<'de> Visitor<'de> for SelectionsVisitor {
    type Value = Selections;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        write!(formatter, "a map from position IDs to candidate IDs")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut map = BTreeMap::new();
        while let Some(position) = access.next_key::<PositionId>()? {
            let candidate = access.next_value::<CandidateId>()?;
            match map.entry(position) {
                Entry::Vacant(entry) => {
                    entry.insert(candidate);
                }
                Entry::Occupied(_) => {
                    return Err(A::Error::custom(SelectionsError::Repeated(position)));
                }
            }
        }
        Selections::try_from(map).map_err(A::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Selections {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(SelectionsVisitor)
    }
}

/// The body of a ballot submission.
///
/// Only the selections are read. Any other field a client sends, such as an
/// election or voter ID, is ignored: both come from the authenticated voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBallot {
    pub selections: Selections,
}

/// Response to a committed submission.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitted {
    pub success: bool,
}

/// A recorded vote, as shown back to the voter who cast it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDescription {
    pub election_id: ElectionId,
    pub position_id: PositionId,
    pub candidate_id: CandidateId,
    pub cast_at: DateTime<Utc>,
}

impl From<Vote> for VoteDescription {
    fn from(vote: Vote) -> Self {
        Self {
            election_id: vote.election_id,
            position_id: vote.position_id,
            candidate_id: vote.candidate_id,
            cast_at: vote.cast_at,
        }
    }
}
