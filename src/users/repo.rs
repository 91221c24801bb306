use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::users::repo_types::{NewUser, User, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("user {0} not found")]
    Missing(UserId),
    #[error("transaction already finished")]
    TransactionClosed,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for users and their tokens.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// True if a non-deleted user already owns `username`.
    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Insert and return the stored row with its assigned id.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    /// Overwrite every column of an existing row.
    async fn update(&self, user: &User) -> Result<User, StoreError>;

    /// Open a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn UserStoreTx>, StoreError>;
}

#[async_trait]
pub trait UserStoreTx: Send {
    /// Flag the user deleted and stamp `date_last_modified`, touching no other column.
    /// The stamp never moves backwards.
    async fn soft_delete(&mut self, id: UserId, at: OffsetDateTime) -> Result<(), StoreError>;

    /// Remove every token owned by `user_id`, returning how many went.
    async fn delete_tokens_by_user_id(&mut self, user_id: UserId) -> Result<u64, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}
