use rocket::{serde::json::Json, Route, State};

use crate::{
    config::Config,
    error::Result,
    logging::RequestId,
    model::{
        api::{
            auth::AuthToken,
            ballot::{SubmitBallot, Submitted, VoteDescription},
        },
        db::voter::Voter,
    },
    voting::{
        self, ballot_for_voter, check_eligibility, recorded_votes, BallotDefinition, BallotStore,
        Eligibility,
    },
};

pub fn routes() -> Vec<Route> {
    routes![get_eligibility, get_ballot, submit_ballot, get_votes]
}

#[get("/voter/eligibility")]
async fn get_eligibility(
    token: AuthToken<Voter>,
    store: &State<Box<dyn BallotStore>>,
) -> Result<Json<Eligibility>> {
    let eligibility = check_eligibility(store.inner().as_ref(), token.id()).await?;
    Ok(Json(eligibility))
}

#[get("/voter/ballot")]
async fn get_ballot(
    token: AuthToken<Voter>,
    store: &State<Box<dyn BallotStore>>,
) -> Result<Json<BallotDefinition>> {
    let ballot = ballot_for_voter(store.inner().as_ref(), token.id()).await?;
    Ok(Json(ballot))
}

/// Cast the voter's ballot. The voter is always the one named by the auth
/// token, and the election is always the one they are assigned to.
#[post("/voter/ballot", data = "<ballot>", format = "json")]
async fn submit_ballot(
    token: AuthToken<Voter>,
    ballot: Json<SubmitBallot>,
    store: &State<Box<dyn BallotStore>>,
    config: &State<Config>,
    request_id: &RequestId,
) -> Result<Json<Submitted>> {
    let receipt = voting::submit(
        store.inner().as_ref(),
        token.id(),
        &ballot.selections,
        config.submit_retries(),
    )
    .await?;
    info!(
        "req{request_id} recorded {} votes in election {} at {}",
        receipt.positions, receipt.election_id, receipt.cast_at
    );
    Ok(Json(Submitted { success: true }))
}

#[get("/voter/votes")]
async fn get_votes(
    token: AuthToken<Voter>,
    store: &State<Box<dyn BallotStore>>,
) -> Result<Json<Vec<VoteDescription>>> {
    let votes = recorded_votes(store.inner().as_ref(), token.id()).await?;
    Ok(Json(votes.into_iter().map(VoteDescription::from).collect()))
}
