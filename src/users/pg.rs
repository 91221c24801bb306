use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::debug;

use crate::users::repo::{StoreError, UserStore, UserStoreTx};
use crate::users::repo_types::{NewUser, User, UserId};

const USER_COLUMNS: &str = r#"
    id, forenames, surname, email_address, telephone, date_of_birth, username,
    password_hash, date_added, date_last_modified, failed_login_attempts, deleted
"#;

/// PostgreSQL implementation of [`UserStore`].
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::UniqueViolation(db.constraint().unwrap_or("users").to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND NOT deleted)"#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(exists)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let stored = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (forenames, surname, email_address, telephone, date_of_birth,
                               username, password_hash, date_added, date_last_modified,
                               failed_login_attempts, deleted)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.forenames)
        .bind(&user.surname)
        .bind(&user.email_address)
        .bind(&user.telephone)
        .bind(user.date_of_birth)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.date_added)
        .bind(user.date_last_modified)
        .bind(user.failed_login_attempts)
        .bind(user.deleted)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        debug!(user_id = stored.id, "user row inserted");
        Ok(stored)
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let stored = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET forenames = $2, surname = $3, email_address = $4, telephone = $5,
                   date_of_birth = $6, username = $7, password_hash = $8,
                   date_added = $9, date_last_modified = $10,
                   failed_login_attempts = $11, deleted = $12
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.forenames)
        .bind(&user.surname)
        .bind(&user.email_address)
        .bind(&user.telephone)
        .bind(user.date_of_birth)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.date_added)
        .bind(user.date_last_modified)
        .bind(user.failed_login_attempts)
        .bind(user.deleted)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        stored.ok_or(StoreError::Missing(user.id))
    }

    async fn begin(&self) -> Result<Box<dyn UserStoreTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgUserStoreTx { tx: Some(tx) }))
    }
}

pub struct PgUserStoreTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUserStoreTx {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl UserStoreTx for PgUserStoreTx {
    async fn soft_delete(&mut self, id: UserId, at: OffsetDateTime) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"
            UPDATE users
               SET deleted = TRUE,
                   date_last_modified = GREATEST(date_last_modified, $2)
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }

    async fn delete_tokens_by_user_id(&mut self, user_id: UserId) -> Result<u64, StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query(r#"DELETE FROM user_tokens WHERE user_id = $1"#)
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}
