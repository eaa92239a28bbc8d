mod bson;
mod collection;
mod counter;
pub mod errors;

pub use bson::{u32_id_filter, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{
    ensure_counters_exist, Counter, CANDIDATE_ID_COUNTER_ID, ELECTION_ID_COUNTER_ID,
    POSITION_ID_COUNTER_ID,
};
