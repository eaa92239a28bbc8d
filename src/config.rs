use chrono::Duration;
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::error::Result;
use crate::model::{
    api::credentials::Credentials,
    db::admin::ensure_admin_exists,
    mongodb::{ensure_counters_exist, ensure_indexes_exist, Coll},
};
use crate::voting::{BallotStore, MongoStore};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    submit_retries: u32,
    admin_username: String,
    // secrets
    jwt_secret: String,
    admin_password: String,
}

impl Config {
    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to encrypt JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// How many extra attempts a ballot submission gets after a transient
    /// store failure.
    pub fn submit_retries(&self) -> u32 {
        self.submit_retries
    }

    /// Credentials for the admin created when the database has none.
    pub fn bootstrap_admin(&self) -> Credentials {
        Credentials {
            username: self.admin_username.clone(),
            password: self.admin_password.clone(),
        }
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the database fairing and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places a `Client`, a `Database`, and the
/// ballot store into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let rocket = manage_database(rocket, client, &database_name()).await?;
        info!("...database connection online!");
        Ok(rocket)
    }
}

/// Prepare the named database for use and put it, its client, and a
/// [`MongoStore`] over it into managed state.
pub(crate) async fn manage_database(
    rocket: Rocket<Build>,
    client: MongoClient,
    name: &str,
) -> rocket::fairing::Result {
    let bootstrap = match rocket.figment().extract::<Config>() {
        Ok(config) => config.bootstrap_admin(),
        Err(e) => {
            error!("Failed to load application config");
            rocket::config::pretty_print_error(e);
            return Err(rocket);
        }
    };

    let db = client.database(name);
    if let Err(e) = prepare_database(&db, bootstrap).await {
        error!("Failed to prepare database: {e}");
        return Err(rocket);
    }

    let store: Box<dyn BallotStore> = Box::new(MongoStore::new(client.clone(), &db));
    Ok(rocket.manage(client).manage(db).manage(store))
}

/// Ensure indexes, ID counters, and at least one admin exist.
async fn prepare_database(db: &Database, bootstrap: Credentials) -> Result<()> {
    ensure_indexes_exist(db).await?;
    ensure_counters_exist(&Coll::from_db(db)).await?;
    ensure_admin_exists(&Coll::from_db(db), bootstrap).await
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn database_name() -> String {
    "ballot_box".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}
