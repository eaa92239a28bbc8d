//! Ballot definition, eligibility, and atomic ballot submission.

mod definition;
mod eligibility;
mod error;
mod memory;
mod mongo;
mod store;
mod submission;

pub use definition::{ballot_for_voter, get_ballot, BallotDefinition};
pub use eligibility::{check_eligibility, Eligibility};
pub use error::VotingError;
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use store::{BallotSession, BallotStore, StoreError};
pub use submission::{recorded_votes, submit, SubmissionReceipt};
