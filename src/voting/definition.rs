use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::ballot::Selections,
    common::election::{ElectionId, PositionId},
    db::election::{Election, Position},
    mongodb::Id,
};

use super::{
    eligibility::Eligibility,
    error::VotingError,
    store::{BallotSession, BallotStore},
};

/// The positions and candidates a voter in one election chooses between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotDefinition {
    pub election_id: ElectionId,
    pub name: String,
    /// Sorted by ID, as are the candidates of each position.
    pub positions: Vec<Position>,
}

impl From<Election> for BallotDefinition {
    fn from(election: Election) -> Self {
        let mut positions = election.positions;
        positions.sort_by_key(|p| p.id);
        for position in &mut positions {
            position.candidates.sort_by_key(|c| c.id);
        }
        Self {
            election_id: election.id,
            name: election.metadata.name,
            positions,
        }
    }
}

impl BallotDefinition {
    fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    /// Check the selections form a complete ballot for this election: one
    /// candidate for every position, each standing for that position, and
    /// nothing else.
    pub fn validate(&self, selections: &Selections) -> Result<(), VotingError> {
        for (position_id, candidate_id) in selections.iter() {
            let position = self.position(position_id).ok_or_else(|| {
                VotingError::InvalidSelection(format!(
                    "position {position_id} is not part of election {}",
                    self.election_id
                ))
            })?;
            if position.candidate(candidate_id).is_none() {
                return Err(VotingError::InvalidSelection(format!(
                    "candidate {candidate_id} is not standing for position {position_id}"
                )));
            }
        }

        let selected: BTreeSet<PositionId> = selections.iter().map(|(p, _)| p).collect();
        if let Some(missing) = self.positions.iter().find(|p| !selected.contains(&p.id)) {
            return Err(VotingError::InvalidSelection(format!(
                "position {} has no selection",
                missing.id
            )));
        }
        Ok(())
    }
}

/// Read the ballot for an election within an open session.
pub async fn get_ballot(
    session: &mut dyn BallotSession,
    election_id: ElectionId,
) -> Result<BallotDefinition, VotingError> {
    let election = session
        .election(election_id)
        .await?
        .ok_or(VotingError::ElectionNotFound(election_id))?;
    Ok(election.into())
}

/// The ballot a voter would fill in, if they are currently eligible to and
/// their election is accepting ballots.
pub async fn ballot_for_voter(
    store: &dyn BallotStore,
    voter_id: Id,
) -> Result<BallotDefinition, VotingError> {
    let mut session = store.begin().await?;
    let ballot = voter_ballot(session.as_mut(), voter_id).await;
    session.abort().await?;
    ballot
}

async fn voter_ballot(
    session: &mut dyn BallotSession,
    voter_id: Id,
) -> Result<BallotDefinition, VotingError> {
    let voter = session
        .voter(voter_id)
        .await?
        .ok_or(VotingError::VoterNotFound(voter_id))?;
    let election_id = Eligibility::try_from(&voter)?.election_id;
    let election = session
        .election(election_id)
        .await?
        .ok_or(VotingError::ElectionNotFound(election_id))?;
    // Same gate as submission.
    if !election.accepts_ballots(Utc::now()) {
        return Err(VotingError::ElectionNotActive(election_id));
    }
    Ok(election.into())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    use chrono::Duration;

    use crate::model::{
        common::{election::ElectionStatus, voter::VoterStatus},
        db::{election::Candidate, voter::VoterCore},
    };
    use crate::voting::MemoryStore;

    fn selections(pairs: &[(PositionId, u32)]) -> Selections {
        Selections::try_from(pairs.iter().copied().collect::<BTreeMap<_, _>>()).unwrap()
    }

    fn definition() -> BallotDefinition {
        Election::open_example(7)
            .with_position(1, &[1, 2, 3])
            .with_position(2, &[4, 5])
            .into()
    }

    #[test]
    fn sorted_by_id() {
        let mut election = Election::open_example(7)
            .with_position(9, &[30, 10, 20])
            .with_position(3, &[5]);
        election.positions[0].candidates.push(Candidate {
            id: 1,
            name: "Late entry".to_string(),
            party: Some("Independent".to_string()),
            avatar: None,
        });
        let ballot = BallotDefinition::from(election);

        let positions: Vec<_> = ballot.positions.iter().map(|p| p.id).collect();
        assert_eq!(positions, vec![3, 9]);
        let candidates: Vec<_> = ballot.positions[1].candidates.iter().map(|c| c.id).collect();
        assert_eq!(candidates, vec![1, 10, 20, 30]);
    }

    #[test]
    fn accept_full_ballot() {
        definition().validate(&selections(&[(1, 1), (2, 4)])).unwrap();
        definition().validate(&selections(&[(1, 3), (2, 5)])).unwrap();
    }

    #[test]
    fn reject_partial_ballot() {
        let err = definition().validate(&selections(&[(1, 1)])).unwrap_err();
        assert!(matches!(err, VotingError::InvalidSelection(ref msg) if msg.contains("position 2")));
    }

    #[test]
    fn reject_unknown_position() {
        let err = definition()
            .validate(&selections(&[(1, 1), (2, 4), (3, 6)]))
            .unwrap_err();
        assert!(matches!(err, VotingError::InvalidSelection(ref msg) if msg.contains("position 3")));
    }

    #[test]
    fn reject_candidate_of_other_position() {
        let err = definition()
            .validate(&selections(&[(1, 4), (2, 5)]))
            .unwrap_err();
        assert!(
            matches!(err, VotingError::InvalidSelection(ref msg) if msg.contains("candidate 4"))
        );
    }

    #[rocket::async_test]
    async fn get_ballot_from_session() {
        let store = MemoryStore::new();
        store
            .insert_election(Election::open_example(7).with_position(2, &[4]))
            .unwrap();

        let mut session = store.begin().await.unwrap();
        let ballot = get_ballot(session.as_mut(), 7).await.unwrap();
        assert_eq!(ballot.election_id, 7);
        assert_eq!(ballot.positions.len(), 1);

        let err = get_ballot(session.as_mut(), 8).await.unwrap_err();
        assert!(matches!(err, VotingError::ElectionNotFound(8)));
    }

    #[rocket::async_test]
    async fn ballot_only_for_eligible_voters() {
        let store = MemoryStore::new();
        store
            .insert_election(Election::open_example(7).with_position(2, &[4, 5]))
            .unwrap();
        let alice = store.insert_voter(VoterCore::example("alice", 7)).unwrap();
        let bob = store.insert_voter(VoterCore::example("bob", None)).unwrap();
        let mut carol = VoterCore::example("carol", 7);
        carol.status = VoterStatus::Voted;
        let carol = store.insert_voter(carol).unwrap();
        let dave = store.insert_voter(VoterCore::example("dave", 8)).unwrap();

        let ballot = ballot_for_voter(&store, alice).await.unwrap();
        assert_eq!(ballot.election_id, 7);
        assert_eq!(ballot.positions[0].candidates.len(), 2);

        let err = ballot_for_voter(&store, bob).await.unwrap_err();
        assert!(matches!(err, VotingError::NotAssigned));
        let err = ballot_for_voter(&store, carol).await.unwrap_err();
        assert!(matches!(err, VotingError::AlreadyVoted));
        let err = ballot_for_voter(&store, dave).await.unwrap_err();
        assert!(matches!(err, VotingError::ElectionNotFound(8)));
    }

    #[rocket::async_test]
    async fn no_ballot_for_closed_election() {
        let store = MemoryStore::new();
        let alice = store.insert_voter(VoterCore::example("alice", 7)).unwrap();

        let mut inactive = Election::open_example(7).with_position(2, &[4, 5]);
        inactive.metadata.status = ElectionStatus::Inactive;
        let mut completed = inactive.clone();
        completed.metadata.status = ElectionStatus::Completed;
        let mut ended = Election::open_example(7).with_position(2, &[4, 5]);
        ended.metadata.end_time = Utc::now() - Duration::minutes(1);

        for election in [inactive, completed, ended] {
            store.insert_election(election).unwrap();
            let err = ballot_for_voter(&store, alice).await.unwrap_err();
            assert!(matches!(err, VotingError::ElectionNotActive(7)));
        }

        // The definition itself stays readable.
        let mut session = store.begin().await.unwrap();
        assert_eq!(get_ballot(session.as_mut(), 7).await.unwrap().election_id, 7);
    }
}
