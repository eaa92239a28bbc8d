#[macro_use]
extern crate rocket;
#[macro_use]
extern crate log;

#[cfg(all(test, feature = "db-tests"))]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod voting;

/// Assemble the server. The database connection is made when the returned
/// rocket ignites.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
}

/// Connect to the database named in the config.
#[cfg(all(test, feature = "db-tests"))]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .expect("could not connect to database")
}

/// A fresh database name for one test.
#[cfg(all(test, feature = "db-tests"))]
pub(crate) fn database() -> String {
    config::database_name()
}

/// The server, but using an existing client and the named database.
#[cfg(all(test, feature = "db-tests"))]
pub(crate) async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let rocket = rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing);
    match config::manage_database(rocket, client, db_name).await {
        Ok(rocket) => rocket,
        Err(_) => panic!("failed to prepare test database {db_name}"),
    }
}
