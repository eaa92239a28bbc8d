use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::{
    api::credentials::verify_password,
    common::{election::ElectionId, voter::VoterStatus},
    mongodb::Id,
};

/// Core voter user data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// Unique sign-in key.
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Argon2 encoded hash of the voter's credential.
    pub password_hash: String,
    pub status: VoterStatus,
    /// The election this voter may vote in. Unassigned voters cannot vote.
    pub election_id: Option<ElectionId>,
}

impl VoterCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        verify_password(&self.password_hash, password)
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter user from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}
