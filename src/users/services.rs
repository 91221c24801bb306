use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::users::dto::{AddAddressRequest, CreateUserRequest, ReadUser, UpdateUserRequest};
use crate::users::error::UserError;
use crate::users::password::PasswordHasher;
use crate::users::repo::{StoreError, UserStore};
use crate::users::repo_types::{Address, NewUser, User, UserId};

pub const USER_DELETED: &str = "User deleted";

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid");
    }
    EMAIL_RE.is_match(email)
}

/// Fields shared by create and update.
struct AccountFields<'a> {
    forenames: &'a str,
    surname: &'a str,
    email_address: &'a str,
    password: &'a str,
}

impl AccountFields<'_> {
    fn validate(&self) -> Result<(), UserError> {
        if self.forenames.trim().is_empty() || self.surname.trim().is_empty() {
            return Err(UserError::Validation("Forenames and surname are required".into()));
        }
        if !is_valid_email(self.email_address) {
            return Err(UserError::Validation("Invalid email".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(UserError::Validation("Password too short".into()));
        }
        Ok(())
    }
}

fn conflict_as_duplicate(e: StoreError) -> UserError {
    match e {
        StoreError::UniqueViolation(_) => UserError::UsernameAlreadyExists,
        other => UserError::Store(other),
    }
}

/// Account lifecycle over a [`UserStore`] and a [`PasswordHasher`].
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    fn hash(&self, plain: &str) -> Result<String, UserError> {
        self.hasher.hash(plain).map_err(UserError::Hashing)
    }

    /// Load a user that exists and is not soft-deleted.
    async fn find_active(&self, id: UserId) -> Result<User, UserError> {
        match self.store.find_by_id(id).await? {
            Some(user) if !user.deleted => Ok(user),
            _ => Err(UserError::UserNotFound),
        }
    }

    pub async fn create_user(&self, input: CreateUserRequest) -> Result<User, UserError> {
        AccountFields {
            forenames: &input.forenames,
            surname: &input.surname,
            email_address: &input.email_address,
            password: &input.password,
        }
        .validate()?;

        if self.store.exists_by_username(&input.email_address).await? {
            warn!(username = %input.email_address, "username already exists");
            return Err(UserError::UsernameAlreadyExists);
        }

        let password_hash = self.hash(&input.password)?;
        let now = OffsetDateTime::now_utc();
        let user = self
            .store
            .insert(NewUser {
                forenames: input.forenames,
                surname: input.surname,
                username: input.email_address.clone(),
                email_address: input.email_address,
                telephone: input.telephone,
                date_of_birth: input.date_of_birth,
                password_hash,
                date_added: now,
                date_last_modified: now,
                failed_login_attempts: 0,
                deleted: false,
            })
            .await
            .map_err(conflict_as_duplicate)?;

        info!(user_id = user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Result<ReadUser, UserError> {
        let user = self.find_active(id).await?;
        Ok(ReadUser::from(user))
    }

    /// Full overwrite. Only id, date added and the failed-login counter carry over.
    pub async fn update_user(
        &self,
        input: UpdateUserRequest,
        id: UserId,
    ) -> Result<User, UserError> {
        let existing = self.find_active(id).await?;
        AccountFields {
            forenames: &input.forenames,
            surname: &input.surname,
            email_address: &input.email_address,
            password: &input.password,
        }
        .validate()?;

        let password_hash = self.hash(&input.password)?;

        let replacement = User {
            id: existing.id,
            forenames: input.forenames,
            surname: input.surname,
            username: input.email_address.clone(),
            email_address: input.email_address,
            telephone: input.telephone,
            date_of_birth: input.date_of_birth,
            password_hash,
            date_added: existing.date_added,
            date_last_modified: OffsetDateTime::now_utc().max(existing.date_last_modified),
            failed_login_attempts: existing.failed_login_attempts,
            deleted: false,
        };

        let user = self
            .store
            .update(&replacement)
            .await
            .map_err(conflict_as_duplicate)?;

        info!(user_id = user.id, "user updated");
        Ok(user)
    }

    /// Soft-delete the user and drop its tokens in one transaction.
    ///
    /// Only the deleted flag and `date_last_modified` are written. Deleting an
    /// already deleted user succeeds again.
    pub async fn delete_user(&self, id: UserId) -> Result<&'static str, UserError> {
        // Dropping `tx` on any early return rolls both writes back.
        let mut tx = self.store.begin().await?;
        tx.soft_delete(id, OffsetDateTime::now_utc())
            .await
            .map_err(|e| match e {
                StoreError::Missing(_) => UserError::UserNotFound,
                other => UserError::Store(other),
            })?;
        let tokens = tx.delete_tokens_by_user_id(id).await?;
        tx.commit().await?;

        info!(user_id = id, tokens_removed = tokens, "user deleted");
        Ok(USER_DELETED)
    }

    /// Address management is not implemented; always yields nothing.
    pub async fn add_address(
        &self,
        input: AddAddressRequest,
        id: UserId,
    ) -> Result<Option<Address>, UserError> {
        debug!(user_id = id, postcode = %input.postcode, "add_address is not implemented");
        Ok(None)
    }
}
