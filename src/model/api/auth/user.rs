use std::fmt::Display;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::{
    db::{admin::Admin, voter::Voter},
    mongodb::Id,
};

/// A user that can hold an [`AuthToken`](super::AuthToken).
pub trait User {
    /// The rights every token for this user type carries.
    const RIGHTS: Rights;
    /// The database ID the token is issued for.
    fn id(&self) -> Id;
}

/// Privilege levels, encoded as a small integer inside the JWT.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    /// May read their own ballot and submit it once.
    Voter = 0,
    /// May author elections and manage voters.
    Admin = 1,
}

impl Rights {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voter => "voter",
            Self::Admin => "admin",
        }
    }
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;

    fn id(&self) -> Id {
        self.id
    }
}

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;

    fn id(&self) -> Id {
        self.id
    }
}
