mod desc;
mod spec;

pub use desc::{ElectionDescription, ElectionSummary};
pub use spec::{CandidateSpec, ElectionSpec, PositionSpec};
