use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

pub type UserId = i64;

time::serde::format_description!(pub(crate) iso_date, Date, "[year]-[month]-[day]");

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub forenames: String,
    pub surname: String,
    pub email_address: String,
    pub telephone: String,
    #[serde(with = "iso_date")]
    pub date_of_birth: Date,
    pub username: String, // mirrors email_address
    #[serde(skip_serializing, default)]
    pub password_hash: String, // Argon2 PHC string, not exposed in JSON
    #[serde(with = "time::serde::rfc3339")]
    pub date_added: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub date_last_modified: OffsetDateTime,
    pub failed_login_attempts: i32,
    pub deleted: bool,
}

/// A user that has not been stored yet; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub forenames: String,
    pub surname: String,
    pub email_address: String,
    pub telephone: String,
    pub date_of_birth: Date,
    pub username: String,
    pub password_hash: String,
    pub date_added: OffsetDateTime,
    pub date_last_modified: OffsetDateTime,
    pub failed_login_attempts: i32,
    pub deleted: bool,
}

#[cfg(test)]
impl NewUser {
    pub(crate) fn into_user(self, id: UserId) -> User {
        User {
            id,
            forenames: self.forenames,
            surname: self.surname,
            email_address: self.email_address,
            telephone: self.telephone,
            date_of_birth: self.date_of_birth,
            username: self.username,
            password_hash: self.password_hash,
            date_added: self.date_added,
            date_last_modified: self.date_last_modified,
            failed_login_attempts: self.failed_login_attempts,
            deleted: self.deleted,
        }
    }
}

/// Postal address of a user. Not persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    pub line2: Option<String>,
    pub town: String,
    pub county: Option<String>,
    pub postcode: String,
    pub country: String,
}
