use mongodb::{bson::doc, options::FindOptions, Client, ClientSession};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            election::{ElectionDescription, ElectionSpec, ElectionSummary},
        },
        common::election::{ElectionId, ElectionStatus},
        db::{admin::Admin, election::Election},
        mongodb::{
            u32_id_filter, Coll, Counter, CANDIDATE_ID_COUNTER_ID, ELECTION_ID_COUNTER_ID,
            POSITION_ID_COUNTER_ID,
        },
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        get_elections,
        get_election,
        create_election,
        modify_election,
        activate_election,
        complete_election,
    ]
}

#[get("/elections")]
async fn get_elections(
    _token: AuthToken<Admin>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionSummary>>> {
    let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
    let summaries = elections
        .find(None, options)
        .await?
        .map_ok(ElectionSummary::from)
        .try_collect()
        .await?;
    Ok(Json(summaries))
}

#[get("/elections/<election_id>")]
async fn get_election(
    _token: AuthToken<Admin>,
    election_id: ElectionId,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    let election = elections
        .find_one(u32_id_filter(election_id), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
    Ok(Json(election.into()))
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    _token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    elections: Coll<Election>,
    counters: Coll<Counter>,
    db_client: &State<Client>,
) -> Result<Json<ElectionDescription>> {
    spec.validate()?;

    let election = {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let election_id =
            Counter::reserve(&counters, ELECTION_ID_COUNTER_ID, 1, &mut session).await?;
        let election = number_election(spec.0, election_id, &counters, &mut session).await?;
        elections
            .insert_one_with_session(&election, None, &mut session)
            .await?;

        session.commit_transaction().await?;
        election
    };
    info!("Created election {} '{}'", election.id, election.metadata.name);

    Ok(Json(election.into()))
}

#[put("/elections/<election_id>", data = "<spec>", format = "json")]
async fn modify_election(
    _token: AuthToken<Admin>,
    election_id: ElectionId,
    spec: Json<ElectionSpec>,
    elections: Coll<Election>,
    counters: Coll<Counter>,
    db_client: &State<Client>,
) -> Result<Json<ElectionDescription>> {
    spec.validate()?;

    let election = {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        // Positions and candidates are renumbered on every edit.
        let election = number_election(spec.0, election_id, &counters, &mut session).await?;
        let filter = doc! {
            "_id": i64::from(election_id),
            "status": ElectionStatus::Inactive,
        };
        let result = elections
            .replace_one_with_session(filter, &election, None, &mut session)
            .await?;
        if result.matched_count != 1 {
            session.abort_transaction().await?;
            return Err(Error::Status(
                Status::BadRequest,
                format!("Election {election_id} doesn't exist or isn't inactive; cannot modify."),
            ));
        }

        session.commit_transaction().await?;
        election
    };

    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/activate")]
async fn activate_election(
    _token: AuthToken<Admin>,
    election_id: ElectionId,
    elections: Coll<Election>,
) -> Result<()> {
    set_status(
        &elections,
        election_id,
        ElectionStatus::Inactive,
        ElectionStatus::Active,
    )
    .await
}

#[post("/elections/<election_id>/complete")]
async fn complete_election(
    _token: AuthToken<Admin>,
    election_id: ElectionId,
    elections: Coll<Election>,
) -> Result<()> {
    set_status(
        &elections,
        election_id,
        ElectionStatus::Active,
        ElectionStatus::Completed,
    )
    .await
}

/// Turn a spec into an election with the given ID, drawing fresh position
/// and candidate IDs from their counters.
async fn number_election(
    spec: ElectionSpec,
    election_id: ElectionId,
    counters: &Coll<Counter>,
    session: &mut ClientSession,
) -> Result<Election> {
    let first_position =
        Counter::reserve(counters, POSITION_ID_COUNTER_ID, spec.position_count(), session).await?;
    let first_candidate = Counter::reserve(
        counters,
        CANDIDATE_ID_COUNTER_ID,
        spec.candidate_count(),
        session,
    )
    .await?;
    Ok(spec.into_election(election_id, first_position, first_candidate))
}

/// Move an election between statuses, failing if it is not currently in `from`.
async fn set_status(
    elections: &Coll<Election>,
    election_id: ElectionId,
    from: ElectionStatus,
    to: ElectionStatus,
) -> Result<()> {
    let filter = doc! {
        "_id": i64::from(election_id),
        "status": from,
    };
    let update = doc! {
        "$set": {
            "status": to,
        }
    };
    let result = elections.update_one(filter, update, None).await?;
    if result.modified_count != 1 {
        return Err(Error::Status(
            Status::BadRequest,
            format!("Election {election_id} doesn't exist or isn't {from:?}; cannot make it {to:?}."),
        ));
    }
    info!("Election {election_id} is now {to:?}");
    Ok(())
}

#[cfg(all(test, feature = "db-tests"))]
mod tests {
    use chrono::{Duration, Utc};
    use rocket::{
        http::ContentType,
        local::asynchronous::Client,
        serde::json::serde_json,
    };

    use crate::model::api::election::{CandidateSpec, PositionSpec};

    use super::*;

    async fn create(client: &Client, spec: &ElectionSpec) -> ElectionDescription {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(serde_json::to_string(spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    #[backend_test(admin)]
    async fn create_numbers_everything(client: Client, elections: Coll<Election>) {
        let first = create(&client, &ElectionSpec::current_example()).await;
        let second = create(&client, &ElectionSpec::current_example()).await;

        assert_eq!(first.status, ElectionStatus::Inactive);
        assert_eq!(second.id, first.id + 1);
        let position_ids: Vec<_> = first.positions.iter().map(|p| p.id).collect();
        assert_eq!(position_ids, vec![1, 2]);
        let candidate_ids: Vec<_> = first
            .positions
            .iter()
            .flat_map(|p| p.candidates.iter().map(|c| c.id))
            .collect();
        assert_eq!(candidate_ids, vec![1, 2, 3, 4]);
        // IDs are unique across elections.
        assert_eq!(second.positions[0].id, 3);
        assert_eq!(second.positions[0].candidates[0].id, 5);

        let stored = elections
            .find_one(u32_id_filter(first.id), None)
            .await
            .unwrap()
            .unwrap();
        // Stored times are truncated to milliseconds, so compare the rest.
        assert_eq!(stored.metadata.name, first.name);
        assert_eq!(stored.positions, first.positions);

        let response = client.get(uri!(get_elections)).dispatch().await;
        let summaries: Vec<ElectionSummary> = response.into_json().await.unwrap();
        assert_eq!(summaries.len(), 2);
    }

    #[backend_test(admin)]
    async fn reject_bad_spec(client: Client) {
        let mut spec = ElectionSpec::current_example();
        spec.end_time = spec.start_time - Duration::hours(1);
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let mut spec = ElectionSpec::current_example();
        spec.positions.clear();
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn lifecycle(client: Client) {
        let election = create(&client, &ElectionSpec::current_example()).await;
        let id = election.id;

        // Can't complete before activating.
        let response = client.post(uri!(complete_election(id))).dispatch().await;
        assert_eq!(Status::BadRequest, response.status());

        // Can edit while inactive.
        let mut spec = ElectionSpec::current_example();
        spec.name = "Renamed".to_string();
        spec.positions.push(PositionSpec {
            name: "Secretary".to_string(),
            candidates: vec![CandidateSpec::named("Grace Hopper", None)],
        });
        let response = client
            .put(uri!(modify_election(id)))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let modified: ElectionDescription = response.into_json().await.unwrap();
        assert_eq!(modified.name, "Renamed");
        assert_eq!(modified.positions.len(), 3);

        let response = client.post(uri!(activate_election(id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let response = client.post(uri!(activate_election(id))).dispatch().await;
        assert_eq!(Status::BadRequest, response.status());

        // Can't edit once active.
        let response = client
            .put(uri!(modify_election(id)))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&ElectionSpec::current_example()).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client.post(uri!(complete_election(id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let response = client.get(uri!(get_election(id))).dispatch().await;
        let election: ElectionDescription = response.into_json().await.unwrap();
        assert_eq!(election.status, ElectionStatus::Completed);
        assert!(election.end_time > Utc::now());
    }

    #[backend_test]
    async fn admin_only(client: Client) {
        let response = client.get(uri!(get_elections)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&ElectionSpec::current_example()).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }
}
