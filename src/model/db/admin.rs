use std::ops::{Deref, DerefMut};

use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    api::credentials::{verify_password, Credentials},
    mongodb::{Coll, Id},
};

/// Core admin user data.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCore {
    pub username: String,
    pub password_hash: String,
}

impl AdminCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        verify_password(&self.password_hash, password)
    }
}

/// An admin without an ID.
pub type NewAdmin = AdminCore;

/// An admin user from the database, with its unique ID.
#[derive(Serialize, Deserialize)]
pub struct Admin {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub admin: AdminCore,
}

impl Deref for Admin {
    type Target = AdminCore;

    fn deref(&self) -> &Self::Target {
        &self.admin
    }
}

impl DerefMut for Admin {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.admin
    }
}

/// If the database has no admins at all, create one from the given
/// credentials so the deployment can be administered.
pub async fn ensure_admin_exists(admins: &Coll<NewAdmin>, bootstrap: Credentials) -> Result<()> {
    if admins.count_documents(doc! {}, None).await? > 0 {
        return Ok(());
    }
    let username = bootstrap.username.clone();
    let admin = NewAdmin::try_from(bootstrap)?;
    admins.insert_one(admin, None).await?;
    warn!("No admins found, created bootstrap admin '{username}'");
    Ok(())
}
