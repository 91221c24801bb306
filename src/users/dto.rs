use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::users::repo_types::{iso_date, User, UserId};

/// Request body for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub forenames: String,
    pub surname: String,
    pub email_address: String,
    pub telephone: String,
    #[serde(with = "iso_date")]
    pub date_of_birth: Date,
    pub password: String,
}

/// Request body for replacing a user. Every field is overwritten.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserRequest {
    pub forenames: String,
    pub surname: String,
    pub email_address: String,
    pub telephone: String,
    #[serde(with = "iso_date")]
    pub date_of_birth: Date,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddAddressRequest {
    pub line1: String,
    pub line2: Option<String>,
    pub town: String,
    pub county: Option<String>,
    pub postcode: String,
    pub country: String,
}

/// Public view of a user: no password hash, no bookkeeping flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadUser {
    pub id: UserId,
    pub forenames: String,
    pub surname: String,
    pub email_address: String,
    pub telephone: String,
    #[serde(with = "iso_date")]
    pub date_of_birth: Date,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date_added: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub date_last_modified: OffsetDateTime,
}

impl From<User> for ReadUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            forenames: u.forenames,
            surname: u.surname,
            email_address: u.email_address,
            telephone: u.telephone,
            date_of_birth: u.date_of_birth,
            username: u.username,
            date_added: u.date_added,
            date_last_modified: u.date_last_modified,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
