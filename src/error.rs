use std::fmt::Display;

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::Responder,
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::RequestId;
use crate::voting::VotingError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Voting(#[from] VotingError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// A 404 naming the thing that could not be found.
    pub fn not_found(what: impl Display) -> Self {
        Self::Status(Status::NotFound, format!("{what} not found"))
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Voting(err) => err.status(),
            Self::Status(status, _) => *status,
        }
    }
}

/// The JSON body sent alongside a voting rejection.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable, machine-readable rejection kind.
    pub error: String,
    /// Human-readable explanation, safe to show to the voter.
    pub message: String,
}

impl From<&VotingError> for ErrorBody {
    fn from(err: &VotingError) -> Self {
        Self {
            error: err.kind().to_string(),
            message: err.public_message(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    /// Log the full error, then respond with only its status, plus a JSON
    /// body for voting rejections. Internal details never reach the client.
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        let id = req.local_cache(RequestId::next);
        match status.class() {
            StatusClass::ServerError => error!("req{id} failed: {self}"),
            _ => warn!("req{id} rejected: {self}"),
        }
        match self {
            Self::Voting(err) => (status, Json(ErrorBody::from(&err))).respond_to(req),
            _ => Err(status),
        }
    }
}
