use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::credentials::{hash_password, Credentials},
    common::{election::ElectionId, voter::VoterStatus},
    db::voter::{NewVoter, Voter},
};

/// A voter registration, as submitted by an admin.
#[derive(Clone, Serialize, Deserialize)]
pub struct VoterSpec {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Election to assign the voter to straight away.
    #[serde(default)]
    pub election_id: Option<ElectionId>,
}

impl TryFrom<VoterSpec> for NewVoter {
    type Error = Error;

    /// Register a voter, hashing their credential. New voters always start
    /// out `Registered`.
    fn try_from(spec: VoterSpec) -> Result<Self> {
        let credentials = Credentials {
            username: spec.username,
            password: spec.password,
        };
        credentials.check_acceptable()?;
        if spec.first_name.trim().is_empty() || spec.last_name.trim().is_empty() {
            return Err(Error::Status(
                Status::BadRequest,
                "Voter names must not be empty".to_string(),
            ));
        }
        Ok(Self {
            password_hash: hash_password(&credentials.password)?,
            username: credentials.username,
            first_name: spec.first_name,
            last_name: spec.last_name,
            status: VoterStatus::Registered,
            election_id: spec.election_id,
        })
    }
}

/// A voter, as shown to admins. Never includes the credential hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterDescription {
    /// Hex string ID.
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub status: VoterStatus,
    pub election_id: Option<ElectionId>,
}

impl From<Voter> for VoterDescription {
    fn from(voter: Voter) -> Self {
        Self {
            id: voter.id.to_string(),
            username: voter.voter.username,
            first_name: voter.voter.first_name,
            last_name: voter.voter.last_name,
            status: voter.voter.status,
            election_id: voter.voter.election_id,
        }
    }
}

/// Request to assign a voter to an election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub election_id: ElectionId,
}
