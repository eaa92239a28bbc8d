use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    api::ballot::Selections,
    common::{election::ElectionId, voter::VoterStatus},
    db::vote::{Vote, VoteCore},
    mongodb::Id,
};

use super::{
    definition::BallotDefinition,
    error::VotingError,
    store::{BallotSession, BallotStore},
};

/// What a committed submission recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub election_id: ElectionId,
    /// Number of votes written, one per position.
    pub positions: usize,
    pub cast_at: DateTime<Utc>,
}

/// Record a voter's full ballot, exactly once.
///
/// Every vote is written and the voter marked as voted in one transaction, or
/// nothing changes at all. Transient store failures roll the attempt back and
/// run it again from the start, up to `retries` more times.
pub async fn submit(
    store: &dyn BallotStore,
    voter_id: Id,
    selections: &Selections,
    retries: u32,
) -> Result<SubmissionReceipt, VotingError> {
    let mut attempt = 0;
    loop {
        match submit_once(store, voter_id, selections).await {
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!(
                    "Submission for voter {voter_id} failed transiently ({e}), retry {attempt}/{retries}"
                );
            }
            result => return result,
        }
    }
}

async fn submit_once(
    store: &dyn BallotStore,
    voter_id: Id,
    selections: &Selections,
) -> Result<SubmissionReceipt, VotingError> {
    let mut session = store.begin().await?;
    match record_ballot(session.as_mut(), voter_id, selections).await {
        Ok(receipt) => {
            session.commit().await?;
            Ok(receipt)
        }
        Err(e) => {
            if let Err(abort_err) = session.abort().await {
                warn!("Failed to abort submission for voter {voter_id}: {abort_err}");
            }
            Err(e)
        }
    }
}

/// Every vote the voter has cast, in position order.
pub async fn recorded_votes(
    store: &dyn BallotStore,
    voter_id: Id,
) -> Result<Vec<Vote>, VotingError> {
    let mut session = store.begin().await?;
    let votes = session.votes_for_voter(voter_id).await;
    session.abort().await?;
    Ok(votes?)
}

/// Everything up to, but not including, the commit.
async fn record_ballot(
    session: &mut dyn BallotSession,
    voter_id: Id,
    selections: &Selections,
) -> Result<SubmissionReceipt, VotingError> {
    let voter = session
        .voter(voter_id)
        .await?
        .ok_or(VotingError::VoterNotFound(voter_id))?;
    let election_id = voter.election_id.ok_or(VotingError::NotAssigned)?;
    if voter.status != VoterStatus::Registered {
        return Err(VotingError::AlreadyVoted);
    }

    let now = Utc::now();
    let election = session
        .election(election_id)
        .await?
        .ok_or(VotingError::ElectionNotFound(election_id))?;
    if !election.accepts_ballots(now) {
        return Err(VotingError::ElectionNotActive(election_id));
    }
    let ballot = BallotDefinition::from(election);
    ballot.validate(selections)?;

    let votes: Vec<VoteCore> = selections
        .iter()
        .map(|(position_id, candidate_id)| VoteCore {
            voter_id,
            election_id,
            position_id,
            candidate_id,
            cast_at: now,
        })
        .collect();
    session.insert_votes(&votes).await?;

    if !session.mark_voted(voter_id).await? {
        return Err(VotingError::AlreadyVoted);
    }

    Ok(SubmissionReceipt {
        election_id,
        positions: votes.len(),
        cast_at: now,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use chrono::Duration;

    use super::*;

    use crate::model::{
        common::election::{CandidateId, ElectionStatus, PositionId},
        db::{
            election::Election,
            voter::{Voter, VoterCore},
        },
    };
    use crate::voting::{store::StoreError, MemoryStore};

    const RETRIES: u32 = 3;

    fn selections(pairs: &[(PositionId, CandidateId)]) -> Selections {
        Selections::try_from(pairs.iter().copied().collect::<BTreeMap<_, _>>()).unwrap()
    }

    /// Election 7 with positions 1 (candidates 1..=3) and 2 (candidates 4, 5),
    /// election 8 with position 3 (candidate 9), and one voter in election 7.
    fn setup() -> (MemoryStore, Id) {
        let store = MemoryStore::new();
        store
            .insert_election(
                Election::open_example(7)
                    .with_position(1, &[1, 2, 3])
                    .with_position(2, &[4, 5]),
            )
            .unwrap();
        store
            .insert_election(Election::open_example(8).with_position(3, &[9]))
            .unwrap();
        let voter = store.insert_voter(VoterCore::example("alice", 7)).unwrap();
        (store, voter)
    }

    fn recorded(store: &MemoryStore) -> Vec<(Id, ElectionId, PositionId, CandidateId)> {
        let mut votes: Vec<_> = store
            .votes()
            .unwrap()
            .iter()
            .map(|v| (v.voter_id, v.election_id, v.position_id, v.candidate_id))
            .collect();
        votes.sort();
        votes
    }

    fn status(store: &MemoryStore, id: Id) -> VoterStatus {
        store.voter(id).unwrap().unwrap().status
    }

    #[rocket::async_test]
    async fn full_ballot_is_recorded() {
        let (store, voter) = setup();

        let receipt = submit(&store, voter, &selections(&[(1, 1), (2, 4)]), RETRIES)
            .await
            .unwrap();
        assert_eq!(receipt.election_id, 7);
        assert_eq!(receipt.positions, 2);

        assert_eq!(recorded(&store), vec![(voter, 7, 1, 1), (voter, 7, 2, 4)]);
        assert_eq!(status(&store, voter), VoterStatus::Voted);

        let own: Vec<_> = recorded_votes(&store, voter)
            .await
            .unwrap()
            .iter()
            .map(|v| (v.position_id, v.candidate_id))
            .collect();
        assert_eq!(own, vec![(1, 1), (2, 4)]);

        // One timestamp for the whole ballot.
        let votes = store.votes().unwrap();
        assert!(votes.iter().all(|v| v.cast_at == receipt.cast_at));
    }

    #[rocket::async_test]
    async fn second_submission_is_rejected() {
        let (store, voter) = setup();
        submit(&store, voter, &selections(&[(1, 1), (2, 4)]), RETRIES)
            .await
            .unwrap();

        for ballot in [&[(1, 2), (2, 5)][..], &[(1, 1), (2, 4)][..]] {
            let err = submit(&store, voter, &selections(ballot), RETRIES)
                .await
                .unwrap_err();
            assert!(matches!(err, VotingError::AlreadyVoted));
        }
        assert_eq!(recorded(&store), vec![(voter, 7, 1, 1), (voter, 7, 2, 4)]);
    }

    #[rocket::async_test]
    async fn unassigned_voter_is_rejected() {
        let (store, _) = setup();
        let voter = store.insert_voter(VoterCore::example("bob", None)).unwrap();

        let err = submit(&store, voter, &selections(&[(1, 1), (2, 4)]), RETRIES)
            .await
            .unwrap_err();
        assert!(matches!(err, VotingError::NotAssigned));
        assert!(recorded(&store).is_empty());
        assert_eq!(status(&store, voter), VoterStatus::Registered);
    }

    #[rocket::async_test]
    async fn unknown_voter_is_rejected() {
        let (store, _) = setup();
        let err = submit(&store, Id::new(), &selections(&[(1, 1), (2, 4)]), RETRIES)
            .await
            .unwrap_err();
        assert!(matches!(err, VotingError::VoterNotFound(_)));
    }

    #[rocket::async_test]
    async fn foreign_candidate_is_rejected() {
        let (store, voter) = setup();

        // Position 3 and candidate 9 belong to election 8.
        for ballot in [&[(1, 1), (2, 4), (3, 9)][..], &[(1, 9), (2, 4)][..]] {
            let err = submit(&store, voter, &selections(ballot), RETRIES)
                .await
                .unwrap_err();
            assert!(matches!(err, VotingError::InvalidSelection(_)));
        }
        assert!(recorded(&store).is_empty());
        assert_eq!(status(&store, voter), VoterStatus::Registered);
    }

    #[rocket::async_test]
    async fn partial_ballot_is_rejected() {
        let (store, voter) = setup();
        let err = submit(&store, voter, &selections(&[(1, 1)]), RETRIES)
            .await
            .unwrap_err();
        assert!(matches!(err, VotingError::InvalidSelection(_)));
        assert!(recorded(&store).is_empty());
        assert_eq!(status(&store, voter), VoterStatus::Registered);
    }

    #[rocket::async_test]
    async fn closed_election_is_rejected() {
        let (store, voter) = setup();

        let mut inactive = Election::open_example(7).with_position(1, &[1]);
        inactive.metadata.status = ElectionStatus::Inactive;
        let mut completed = inactive.clone();
        completed.metadata.status = ElectionStatus::Completed;
        let mut ended = Election::open_example(7).with_position(1, &[1]);
        ended.metadata.end_time = Utc::now() - Duration::minutes(1);
        let mut not_started = Election::open_example(7).with_position(1, &[1]);
        not_started.metadata.start_time = Utc::now() + Duration::minutes(1);

        for election in [inactive, completed, ended, not_started] {
            store.insert_election(election).unwrap();
            let err = submit(&store, voter, &selections(&[(1, 1)]), RETRIES)
                .await
                .unwrap_err();
            assert!(matches!(err, VotingError::ElectionNotActive(7)));
        }
        assert!(recorded(&store).is_empty());
        assert_eq!(status(&store, voter), VoterStatus::Registered);
    }

    #[rocket::async_test]
    async fn missing_election_is_rejected() {
        let store = MemoryStore::new();
        let voter = store.insert_voter(VoterCore::example("alice", 42)).unwrap();
        let err = submit(&store, voter, &selections(&[(1, 1)]), RETRIES)
            .await
            .unwrap_err();
        assert!(matches!(err, VotingError::ElectionNotFound(42)));
    }

    #[rocket::async_test]
    async fn concurrent_submissions_commit_once() {
        let (store, voter) = setup();
        let first = selections(&[(1, 1), (2, 4)]);
        let second = selections(&[(1, 2), (2, 5)]);

        let (a, b) = rocket::tokio::join!(
            submit(&store, voter, &first, RETRIES),
            submit(&store, voter, &second, RETRIES),
        );

        let winner = match (a, b) {
            (Ok(_), Err(VotingError::AlreadyVoted)) => &first,
            (Err(VotingError::AlreadyVoted), Ok(_)) => &second,
            other => panic!("expected exactly one success, got {other:?}"),
        };
        let expected: Vec<_> = winner.iter().map(|(p, c)| (voter, 7, p, c)).collect();
        assert_eq!(recorded(&store), expected);
        assert_eq!(status(&store, voter), VoterStatus::Voted);
    }

    #[rocket::async_test]
    async fn concurrent_submissions_across_tasks() {
        let (store, voter) = setup();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let ballot = selections(&[(1, 1 + i % 3), (2, 4 + i % 2)]);
                rocket::tokio::spawn(async move {
                    submit(store.as_ref(), voter, &ballot, RETRIES).await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(VotingError::AlreadyVoted) => {}
                Err(e) => panic!("unexpected rejection: {e}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(store.votes().unwrap().len(), 2);
    }

    /// A store whose sessions fail at a chosen point a set number of times.
    struct FlakyStore {
        inner: MemoryStore,
        fail_at: FailAt,
        failures_left: Arc<AtomicU32>,
    }

    #[derive(Clone, Copy)]
    enum FailAt {
        /// Between inserting the votes and marking the voter.
        MarkVoted,
        Commit,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore, fail_at: FailAt, failures: u32) -> Self {
            Self {
                inner,
                fail_at,
                failures_left: Arc::new(AtomicU32::new(failures)),
            }
        }
    }

    #[rocket::async_trait]
    impl BallotStore for FlakyStore {
        async fn begin(&self) -> Result<Box<dyn BallotSession>, StoreError> {
            Ok(Box::new(FlakySession {
                inner: self.inner.begin().await?,
                fail_at: self.fail_at,
                failures_left: Arc::clone(&self.failures_left),
            }))
        }
    }

    struct FlakySession {
        inner: Box<dyn BallotSession>,
        fail_at: FailAt,
        failures_left: Arc<AtomicU32>,
    }

    impl FlakySession {
        fn maybe_fail(&self, point: FailAt) -> Result<(), StoreError> {
            let matches = matches!(
                (self.fail_at, point),
                (FailAt::MarkVoted, FailAt::MarkVoted) | (FailAt::Commit, FailAt::Commit)
            );
            let fail = matches
                && self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if fail {
                Err(StoreError::Transient("injected failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[rocket::async_trait]
    impl BallotSession for FlakySession {
        async fn voter(&mut self, id: Id) -> Result<Option<Voter>, StoreError> {
            self.inner.voter(id).await
        }

        async fn election(&mut self, id: ElectionId) -> Result<Option<Election>, StoreError> {
            self.inner.election(id).await
        }

        async fn votes_for_voter(&mut self, voter: Id) -> Result<Vec<Vote>, StoreError> {
            self.inner.votes_for_voter(voter).await
        }

        async fn insert_votes(&mut self, votes: &[VoteCore]) -> Result<(), StoreError> {
            self.inner.insert_votes(votes).await
        }

        async fn mark_voted(&mut self, voter: Id) -> Result<bool, StoreError> {
            self.maybe_fail(FailAt::MarkVoted)?;
            self.inner.mark_voted(voter).await
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            self.maybe_fail(FailAt::Commit)?;
            let session = *self;
            session.inner.commit().await
        }

        async fn abort(self: Box<Self>) -> Result<(), StoreError> {
            let session = *self;
            session.inner.abort().await
        }
    }

    #[rocket::async_test]
    async fn failure_before_mark_leaves_nothing() {
        let (store, voter) = setup();
        let flaky = FlakyStore::new(store.clone(), FailAt::MarkVoted, u32::MAX);

        let err = submit(&flaky, voter, &selections(&[(1, 1), (2, 4)]), RETRIES)
            .await
            .unwrap_err();
        assert!(matches!(err, VotingError::TransientStoreFailure(_)));
        assert!(recorded(&store).is_empty());
        assert_eq!(status(&store, voter), VoterStatus::Registered);
    }

    #[rocket::async_test]
    async fn transient_failures_are_retried() {
        // Retries are only visible in the log.
        log4rs_test_utils::test_logging::init_logging_once_for(["ballot_box"], None, None);

        let (store, voter) = setup();
        let flaky = FlakyStore::new(store.clone(), FailAt::Commit, RETRIES);

        submit(&flaky, voter, &selections(&[(1, 3), (2, 5)]), RETRIES)
            .await
            .unwrap();
        assert_eq!(recorded(&store), vec![(voter, 7, 1, 3), (voter, 7, 2, 5)]);
        assert_eq!(status(&store, voter), VoterStatus::Voted);
    }

    #[rocket::async_test]
    async fn retries_are_bounded() {
        let (store, voter) = setup();
        let flaky = FlakyStore::new(store.clone(), FailAt::Commit, RETRIES + 1);

        let err = submit(&flaky, voter, &selections(&[(1, 3), (2, 5)]), RETRIES)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(recorded(&store).is_empty());
        assert_eq!(flaky.failures_left.load(Ordering::SeqCst), 0);

        // The voter can still vote once the store recovers.
        submit(&flaky, voter, &selections(&[(1, 3), (2, 5)]), RETRIES)
            .await
            .unwrap();
        assert_eq!(status(&store, voter), VoterStatus::Voted);
    }
}
