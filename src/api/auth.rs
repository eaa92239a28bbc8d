use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::{
            auth::{AuthToken, AUTH_TOKEN_COOKIE},
            credentials::Credentials,
        },
        db::{admin::Admin, voter::Voter},
        mongodb::Coll,
    },
};

pub fn routes() -> Vec<Route> {
    routes![authenticate, voter_authenticate, logout]
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn authenticate(
    cookies: &CookieJar<'_>,
    credentials: Json<Credentials>,
    admins: Coll<Admin>,
    config: &State<Config>,
) -> Result<()> {
    let with_username = doc! {
        "username": &credentials.username
    };

    let admin = admins
        .find_one(with_username, None)
        .await?
        .filter(|admin| admin.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No admin found with the provided username and password combination.".to_string(),
            )
        })?;

    let token = AuthToken::new(&admin);
    cookies.add(token.into_cookie(config)?);

    Ok(())
}

#[post("/auth/voter", data = "<credentials>", format = "json")]
pub async fn voter_authenticate(
    cookies: &CookieJar<'_>,
    credentials: Json<Credentials>,
    voters: Coll<Voter>,
    config: &State<Config>,
) -> Result<()> {
    let with_username = doc! {
        "username": &credentials.username
    };

    let voter = voters
        .find_one(with_username, None)
        .await?
        .filter(|voter| voter.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No voter found with the provided username and password combination.".to_string(),
            )
        })?;

    let token = AuthToken::new(&voter);
    cookies.add(token.into_cookie(config)?);

    Ok(())
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}
