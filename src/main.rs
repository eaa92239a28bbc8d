use log::{error, info, LevelFilter};
use rocket::Error as RocketError;
use thiserror::Error;

/// Errors that are critical to the entire server.
#[derive(Debug, Error)]
enum Error {
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
    #[error(transparent)]
    Rocket(#[from] RocketError),
}

async fn run() -> Result<(), Error> {
    info!("Configuring server...");
    let rocket = ballot_box::build().ignite().await?;
    info!("...server configured!");
    let protocol = if rocket.config().tls_enabled() {
        "https"
    } else {
        "http"
    };
    let ip = &rocket.config().address;
    let port = &rocket.config().port;
    info!("Server launched on {protocol}://{ip}:{port}");
    // Disable rocket logging from now on.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    let _ = rocket.launch().await?;
    Ok(())
}

fn init_logging() -> Result<(), Error> {
    log4rs::init_file("log4rs.yaml", log4rs_dynamic_filters::default_deserializers())
        .map_err(|e| Error::Logging(e.to_string()))
}

#[rocket::main]
async fn main() {
    if let Err(err) = init_logging() {
        eprintln!("{err}");
        std::process::exit(1)
    }
    info!("Initialised logging");

    if let Err(err) = run().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
