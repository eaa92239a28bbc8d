use mongodb::{
    bson::doc,
    options::{Acknowledgment, FindOptions, ReadConcern, TransactionOptions, WriteConcern},
    Client, ClientSession, Database,
};

use crate::model::{
    common::{election::ElectionId, voter::VoterStatus},
    db::{
        election::Election,
        vote::{Vote, VoteCore},
        voter::Voter,
    },
    mongodb::{errors, u32_id_filter, Coll, Id},
};

use super::store::{BallotSession, BallotStore, StoreError};

/// How many times a commit with an unknown outcome is re-sent before the
/// submission is reported as transient.
const COMMIT_ATTEMPTS: usize = 3;

/// A [`BallotStore`] backed by MongoDB multi-document transactions.
///
/// Requires a replica set or sharded cluster, since standalone servers do
/// not support transactions.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    voters: Coll<Voter>,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    new_votes: Coll<VoteCore>,
}

impl MongoStore {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            voters: Coll::from_db(db),
            elections: Coll::from_db(db),
            votes: Coll::from_db(db),
            new_votes: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl BallotStore for MongoStore {
    async fn begin(&self) -> Result<Box<dyn BallotSession>, StoreError> {
        let mut session = self.client.start_session(None).await?;
        // Snapshot reads plus majority writes: a concurrent commit touching the
        // same voter makes our own write fail with a transient write conflict.
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction(options).await?;
        Ok(Box::new(MongoSession {
            session,
            store: self.clone(),
        }))
    }
}

struct MongoSession {
    session: ClientSession,
    store: MongoStore,
}

#[rocket::async_trait]
impl BallotSession for MongoSession {
    async fn voter(&mut self, id: Id) -> Result<Option<Voter>, StoreError> {
        let voter = self
            .store
            .voters
            .find_one_with_session(id.as_doc(), None, &mut self.session)
            .await?;
        Ok(voter)
    }

    async fn election(&mut self, id: ElectionId) -> Result<Option<Election>, StoreError> {
        let election = self
            .store
            .elections
            .find_one_with_session(u32_id_filter(id), None, &mut self.session)
            .await?;
        Ok(election)
    }

    async fn votes_for_voter(&mut self, voter: Id) -> Result<Vec<Vote>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "position_id": 1 })
            .build();
        let mut cursor = self
            .store
            .votes
            .find_with_session(doc! { "voter_id": voter }, options, &mut self.session)
            .await?;
        let mut votes = Vec::new();
        while let Some(vote) = cursor.next(&mut self.session).await {
            votes.push(vote?);
        }
        Ok(votes)
    }

    async fn insert_votes(&mut self, votes: &[VoteCore]) -> Result<(), StoreError> {
        self.store
            .new_votes
            .insert_many_with_session(votes, None, &mut self.session)
            .await?;
        Ok(())
    }

    async fn mark_voted(&mut self, voter: Id) -> Result<bool, StoreError> {
        let filter = doc! {
            "_id": voter,
            "status": VoterStatus::Registered,
        };
        let update = doc! {
            "$set": { "status": VoterStatus::Voted },
        };
        let result = self
            .store
            .voters
            .update_one_with_session(filter, update, None, &mut self.session)
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(e) if errors::is_unknown_commit_result(&e) && attempt < COMMIT_ATTEMPTS => {
                    warn!("Commit outcome unknown ({e}), retrying commit");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StoreError> {
        self.session.abort_transaction().await?;
        Ok(())
    }
}
