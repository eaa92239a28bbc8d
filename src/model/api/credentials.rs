use argon2::Config;
use rand::Rng;
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::db::admin::NewAdmin;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Raw sign-in credentials, received from a user. These are never stored
/// directly, since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Enforce that the username is non-empty and the password meets minimum length.
    pub fn check_acceptable(&self) -> Result<()> {
        if self.username.trim().is_empty() || self.password.len() < MIN_PASSWORD_LENGTH {
            return Err(Error::Status(
                Status::BadRequest,
                format!(
                    "Username must be non-empty and password at least {MIN_PASSWORD_LENGTH} characters"
                ),
            ));
        }
        Ok(())
    }
}

impl TryFrom<Credentials> for NewAdmin {
    type Error = Error;

    /// Convert [`Credentials`] to a new admin by hashing the password.
    fn try_from(cred: Credentials) -> Result<Self> {
        cred.check_acceptable()?;
        let password_hash = hash_password(&cred.password)?;
        Ok(Self {
            username: cred.username,
            password_hash,
        })
    }
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> std::result::Result<String, argon2::Error> {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &Config::default())
}

/// Check a password against an encoded hash. A malformed hash never matches.
pub fn verify_password<T: AsRef<[u8]>>(hash: &str, password: T) -> bool {
    argon2::verify_encoded(hash, password.as_ref()).unwrap_or(false)
}
