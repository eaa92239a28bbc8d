use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::model::{
    common::{
        election::{ElectionId, PositionId},
        voter::VoterStatus,
    },
    db::{
        election::Election,
        vote::{Vote, VoteCore},
        voter::{NewVoter, Voter},
    },
    mongodb::Id,
};

use super::store::{BallotSession, BallotStore, StoreError};

#[derive(Default)]
struct Tables {
    voters: HashMap<Id, Voter>,
    elections: HashMap<ElectionId, Election>,
    votes: Vec<Vote>,
    /// `(voter, position)` of every committed vote.
    cast: HashSet<(Id, PositionId)>,
}

impl Tables {
    fn has_vote(&self, vote: &VoteCore) -> bool {
        self.cast.contains(&(vote.voter_id, vote.position_id))
    }
}

/// A [`BallotStore`] held entirely in process memory.
///
/// Sessions never copy the tables. Reads clone only the rows they touch from
/// the committed state, overlaid with the session's own pending writes, which
/// reach the shared tables only on commit. Commit re-checks, under the lock,
/// that every voter the session marked as voted is still `Registered` and that
/// none of its votes now collide with a committed one, so two sessions racing
/// on the same voter cannot both succeed.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        lock(&self.tables)
    }

    /// Register a voter, returning their new ID.
    pub fn insert_voter(&self, voter: NewVoter) -> Result<Id, StoreError> {
        let id = Id::new();
        self.lock()?.voters.insert(id, Voter { id, voter });
        Ok(id)
    }

    /// Add or replace an election.
    pub fn insert_election(&self, election: Election) -> Result<(), StoreError> {
        self.lock()?.elections.insert(election.id, election);
        Ok(())
    }

    /// The committed state of a voter.
    pub fn voter(&self, id: Id) -> Result<Option<Voter>, StoreError> {
        Ok(self.lock()?.voters.get(&id).cloned())
    }

    /// Every committed vote, in insertion order.
    pub fn votes(&self) -> Result<Vec<Vote>, StoreError> {
        Ok(self.lock()?.votes.clone())
    }
}

fn lock(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>, StoreError> {
    tables
        .lock()
        .map_err(|_| StoreError::Fatal("memory store lock poisoned".to_string()))
}

#[rocket::async_trait]
impl BallotStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn BallotSession>, StoreError> {
        Ok(Box::new(MemorySession {
            tables: Arc::clone(&self.tables),
            marked: HashSet::new(),
            inserted: Vec::new(),
        }))
    }
}

struct MemorySession {
    tables: Arc<Mutex<Tables>>,
    /// Voters this session has moved to `Voted`.
    marked: HashSet<Id>,
    /// Votes this session has written.
    inserted: Vec<Vote>,
}

impl MemorySession {
    fn has_pending_vote(&self, vote: &VoteCore) -> bool {
        self.inserted
            .iter()
            .any(|v| v.voter_id == vote.voter_id && v.position_id == vote.position_id)
    }
}

#[rocket::async_trait]
impl BallotSession for MemorySession {
    async fn voter(&mut self, id: Id) -> Result<Option<Voter>, StoreError> {
        let mut voter = lock(&self.tables)?.voters.get(&id).cloned();
        if let Some(v) = voter.as_mut() {
            if self.marked.contains(&id) {
                v.status = VoterStatus::Voted;
            }
        }
        Ok(voter)
    }

    async fn election(&mut self, id: ElectionId) -> Result<Option<Election>, StoreError> {
        Ok(lock(&self.tables)?.elections.get(&id).cloned())
    }

    async fn votes_for_voter(&mut self, voter: Id) -> Result<Vec<Vote>, StoreError> {
        let mut votes: Vec<Vote> = lock(&self.tables)?
            .votes
            .iter()
            .chain(self.inserted.iter())
            .filter(|v| v.voter_id == voter)
            .cloned()
            .collect();
        votes.sort_by_key(|v| v.position_id);
        Ok(votes)
    }

    async fn insert_votes(&mut self, votes: &[VoteCore]) -> Result<(), StoreError> {
        for vote in votes {
            if lock(&self.tables)?.has_vote(vote) || self.has_pending_vote(vote) {
                return Err(StoreError::DuplicateVote);
            }
            // Later reads in this session see their own writes.
            self.inserted.push(Vote {
                id: Id::new(),
                vote: vote.clone(),
            });
        }
        Ok(())
    }

    async fn mark_voted(&mut self, voter: Id) -> Result<bool, StoreError> {
        if self.marked.contains(&voter) {
            return Ok(false);
        }
        let registered = matches!(
            lock(&self.tables)?.voters.get(&voter),
            Some(v) if v.status == VoterStatus::Registered
        );
        if registered {
            self.marked.insert(voter);
        }
        Ok(registered)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;

        for id in &self.marked {
            match tables.voters.get(id) {
                Some(v) if v.status == VoterStatus::Registered => {}
                _ => {
                    return Err(StoreError::Transient(format!(
                        "write conflict on voter {id}"
                    )))
                }
            }
        }
        if self.inserted.iter().any(|v| tables.has_vote(v)) {
            return Err(StoreError::DuplicateVote);
        }

        for id in &self.marked {
            if let Some(v) = tables.voters.get_mut(id) {
                v.status = VoterStatus::Voted;
            }
        }
        for vote in &self.inserted {
            tables.cast.insert((vote.voter_id, vote.position_id));
            tables.votes.push(vote.clone());
        }
        debug!("Committed {} votes", self.inserted.len());
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
