use serde::{Deserialize, Serialize};

use crate::model::{
    common::{election::ElectionId, voter::VoterStatus},
    db::voter::Voter,
    mongodb::Id,
};

use super::{error::VotingError, store::BallotStore};

/// A voter who may currently cast a ballot, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub election_id: ElectionId,
    pub status: VoterStatus,
}

impl TryFrom<&Voter> for Eligibility {
    type Error = VotingError;

    fn try_from(voter: &Voter) -> Result<Self, Self::Error> {
        let election_id = voter.election_id.ok_or(VotingError::NotAssigned)?;
        if voter.status != VoterStatus::Registered {
            return Err(VotingError::AlreadyVoted);
        }
        Ok(Self {
            election_id,
            status: voter.status,
        })
    }
}

/// Check whether the voter may vote right now.
///
/// The answer is only advisory: submission repeats the same checks inside its
/// own transaction.
pub async fn check_eligibility(
    store: &dyn BallotStore,
    voter_id: Id,
) -> Result<Eligibility, VotingError> {
    let mut session = store.begin().await?;
    let voter = session.voter(voter_id).await;
    session.abort().await?;
    let voter = voter?.ok_or(VotingError::VoterNotFound(voter_id))?;
    Eligibility::try_from(&voter)
}
