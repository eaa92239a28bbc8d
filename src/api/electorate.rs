use mongodb::{
    bson::{doc, Bson},
    options::FindOptions,
    Client,
};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            voter::{Assignment, VoterDescription, VoterSpec},
        },
        common::{election::ElectionId, voter::VoterStatus},
        db::{
            admin::Admin,
            election::Election,
            vote::Vote,
            voter::{NewVoter, Voter},
        },
        mongodb::{errors::is_duplicate_key_error, u32_id_filter, Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![get_voters, create_voter, assign_voter, unassign_voter]
}

#[get("/voters?<election>")]
async fn get_voters(
    _token: AuthToken<Admin>,
    election: Option<ElectionId>,
    voters: Coll<Voter>,
) -> Result<Json<Vec<VoterDescription>>> {
    let filter = election.map(|id| doc! { "election_id": i64::from(id) });
    let options = FindOptions::builder()
        .sort(doc! { "username": 1 })
        .build();
    let descriptions = voters
        .find(filter, options)
        .await?
        .map_ok(VoterDescription::from)
        .try_collect()
        .await?;
    Ok(Json(descriptions))
}

#[post("/voters", data = "<spec>", format = "json")]
async fn create_voter(
    _token: AuthToken<Admin>,
    spec: Json<VoterSpec>,
    voters: Coll<Voter>,
    new_voters: Coll<NewVoter>,
    elections: Coll<Election>,
) -> Result<Json<VoterDescription>> {
    if let Some(election_id) = spec.election_id {
        ensure_election_exists(&elections, election_id).await?;
    }

    let voter = NewVoter::try_from(spec.0)?;
    let username = voter.username.clone();
    let inserted = match new_voters.insert_one(&voter, None).await {
        Ok(result) => result,
        Err(e) if is_duplicate_key_error(&e) => {
            return Err(Error::Status(
                Status::BadRequest,
                format!("Voter username already in use: {username}"),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    let id: Id = inserted
        .inserted_id
        .as_object_id()
        .ok_or_else(|| {
            Error::Status(
                Status::InternalServerError,
                format!("Voter {username} was inserted without an object ID"),
            )
        })?
        .into();

    let voter = voters
        .find_one(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {id}")))?;
    info!("Registered voter {username} ({id})");
    Ok(Json(voter.into()))
}

#[put("/voters/<voter_id>/election", data = "<assignment>", format = "json")]
async fn assign_voter(
    _token: AuthToken<Admin>,
    voter_id: Id,
    assignment: Json<Assignment>,
    voters: Coll<Voter>,
    elections: Coll<Election>,
) -> Result<()> {
    ensure_election_exists(&elections, assignment.election_id).await?;

    // The status condition stops a voter who has voted from being moved.
    let filter = doc! {
        "_id": voter_id,
        "status": VoterStatus::Registered,
    };
    let update = doc! {
        "$set": {
            "election_id": i64::from(assignment.election_id),
        }
    };
    let result = voters.update_one(filter, update, None).await?;
    if result.matched_count == 0 {
        return Err(voter_missing_or_voted(&voters, voter_id).await);
    }
    Ok(())
}

#[delete("/voters/<voter_id>/election")]
async fn unassign_voter(
    _token: AuthToken<Admin>,
    voter_id: Id,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
) -> Result<()> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let voter = voters
        .find_one_with_session(voter_id.as_doc(), None, &mut session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
    let election_id = match voter.election_id {
        Some(election_id) => election_id,
        None => {
            // Already unassigned.
            session.abort_transaction().await?;
            return Ok(());
        }
    };

    let filter = doc! {
        "voter_id": voter_id,
        "election_id": i64::from(election_id),
    };
    let cast = votes
        .count_documents_with_session(filter, None, &mut session)
        .await?;
    if cast > 0 || voter.status == VoterStatus::Voted {
        session.abort_transaction().await?;
        return Err(Error::Status(
            Status::Conflict,
            format!("Voter {voter_id} has voted in election {election_id}; cannot remove them."),
        ));
    }

    let filter = doc! {
        "_id": voter_id,
        "status": VoterStatus::Registered,
    };
    let update = doc! {
        "$set": {
            "election_id": Bson::Null,
        }
    };
    voters
        .update_one_with_session(filter, update, None, &mut session)
        .await?;

    session.commit_transaction().await?;
    Ok(())
}

async fn ensure_election_exists(
    elections: &Coll<Election>,
    election_id: ElectionId,
) -> Result<()> {
    let count = elections
        .count_documents(u32_id_filter(election_id), None)
        .await?;
    if count == 0 {
        return Err(Error::not_found(format!("Election {election_id}")));
    }
    Ok(())
}

/// Explain why a conditional update on a registered voter matched nothing.
async fn voter_missing_or_voted(voters: &Coll<Voter>, voter_id: Id) -> Error {
    match voters.find_one(voter_id.as_doc(), None).await {
        Ok(Some(_)) => Error::Status(
            Status::Conflict,
            format!("Voter {voter_id} has already voted; cannot reassign them."),
        ),
        Ok(None) => Error::not_found(format!("Voter {voter_id}")),
        Err(e) => e.into(),
    }
}
