use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
    ClientSession,
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// Counter backing election IDs.
pub const ELECTION_ID_COUNTER_ID: &str = "election_id";
/// Counter backing position IDs, shared by all elections.
pub const POSITION_ID_COUNTER_ID: &str = "position_id";
/// Counter backing candidate IDs, shared by all elections.
pub const CANDIDATE_ID_COUNTER_ID: &str = "candidate_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Atomically reserve `count` consecutive values from the named counter,
    /// returning the first one.
    pub async fn reserve(
        counters: &Coll<Counter>,
        id: &str,
        count: u32,
        session: &mut ClientSession,
    ) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": i64::from(count) }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update_with_session(doc! { "_id": id }, update, options, session)
            .await?
            .ok_or_else(|| {
                Error::Status(
                    Status::InternalServerError,
                    format!("Failed to find counter with ID {}", id),
                )
            })?;
        Ok(counter.next)
    }
}

/// Ensure every ID counter exists, starting at 1.
///
/// This operation is idempotent.
pub async fn ensure_counters_exist(counters: &Coll<Counter>) -> Result<()> {
    let options = UpdateOptions::builder().upsert(true).build();
    for id in [
        ELECTION_ID_COUNTER_ID,
        POSITION_ID_COUNTER_ID,
        CANDIDATE_ID_COUNTER_ID,
    ] {
        let update = doc! {
            "$setOnInsert": { "next": 1_i64 }
        };
        counters
            .update_one(doc! { "_id": id }, update, options.clone())
            .await?;
    }
    Ok(())
}

#[cfg(all(test, feature = "db-tests"))]
mod tests {
    use super::*;

    use mongodb::Database;
    use rocket::local::asynchronous::Client;

    #[backend_test]
    async fn reserve_blocks(client: Client, db: Database) {
        let counters = Coll::<Counter>::from_db(&db);
        ensure_counters_exist(&counters).await.unwrap();
        // A second call must not reset anything.
        ensure_counters_exist(&counters).await.unwrap();

        let db_client = client.rocket().state::<mongodb::Client>().unwrap();
        let mut session = db_client.start_session(None).await.unwrap();

        let first = Counter::reserve(&counters, POSITION_ID_COUNTER_ID, 3, &mut session)
            .await
            .unwrap();
        assert_eq!(first, 1);
        let next = Counter::reserve(&counters, POSITION_ID_COUNTER_ID, 1, &mut session)
            .await
            .unwrap();
        assert_eq!(next, 4);

        // Other counters are independent.
        let election = Counter::reserve(&counters, ELECTION_ID_COUNTER_ID, 1, &mut session)
            .await
            .unwrap();
        assert_eq!(election, 1);
    }
}
