use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{ElectionId, ElectionStatus},
    db::election::{Election, Position},
};

/// A full election description, as shown to admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: ElectionId,
    pub name: String,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub positions: Vec<Position>,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        Self {
            id: election.id,
            name: election.metadata.name,
            status: election.metadata.status,
            start_time: election.metadata.start_time,
            end_time: election.metadata.end_time,
            positions: election.positions,
        }
    }
}

/// Top-level election information, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: ElectionId,
    pub name: String,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<Election> for ElectionSummary {
    fn from(election: Election) -> Self {
        Self {
            id: election.id,
            name: election.metadata.name,
            status: election.metadata.status,
            start_time: election.metadata.start_time,
            end_time: election.metadata.end_time,
        }
    }
}
