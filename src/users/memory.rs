//! In-memory record store used by tests and `AppState::fake()`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::repo::{StoreError, UserStore, UserStoreTx};
use crate::users::repo_types::{NewUser, User, UserId};

/// Row of the `user_tokens` table. Tokens are issued outside this service.
#[derive(Debug, Clone)]
pub struct UserToken {
    pub id: Uuid,
    pub user_id: UserId,
    pub token: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: UserId,
    users: BTreeMap<UserId, User>,
    tokens: Vec<UserToken>,
}

impl Tables {
    /// Mirrors the partial unique index on `username WHERE NOT deleted`.
    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| !u.deleted && u.username == username && Some(u.id) != except)
    }

    fn write_user(&mut self, user: &User) -> Result<(), StoreError> {
        if !self.users.contains_key(&user.id) {
            return Err(StoreError::Missing(user.id));
        }
        if !user.deleted && self.username_taken(&user.username, Some(user.id)) {
            return Err(StoreError::UniqueViolation("users_username_active".into()));
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    tables: Arc<RwLock<Tables>>,
    fail_token_cleanup: Arc<AtomicBool>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for `user_id`.
    pub async fn insert_token(&self, user_id: UserId) -> UserToken {
        let token = UserToken {
            id: Uuid::new_v4(),
            user_id,
            token: Uuid::new_v4().simple().to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.write().await.tokens.push(token.clone());
        token
    }

    pub async fn tokens_for(&self, user_id: UserId) -> Vec<UserToken> {
        self.tables
            .read()
            .await
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Make every later token cleanup fail, to exercise rollback.
    pub fn fail_token_cleanup(&self, fail: bool) {
        self.fail_token_cleanup.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.tables.read().await.username_taken(username, None))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if !user.deleted && tables.username_taken(&user.username, None) {
            return Err(StoreError::UniqueViolation("users_username_active".into()));
        }
        tables.next_id += 1;
        let stored = user.into_user(tables.next_id);
        tables.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        self.tables.write().await.write_user(user)?;
        Ok(user.clone())
    }

    async fn begin(&self) -> Result<Box<dyn UserStoreTx>, StoreError> {
        Ok(Box::new(InMemoryTx {
            store: self.clone(),
            staged: Vec::new(),
            open: true,
        }))
    }
}

#[derive(Debug)]
enum Staged {
    SoftDelete(UserId, OffsetDateTime),
    DeleteTokens(UserId),
}

/// Writes are staged and applied under one write lock on commit.
#[derive(Debug)]
pub struct InMemoryTx {
    store: InMemoryUserStore,
    staged: Vec<Staged>,
    open: bool,
}

#[async_trait]
impl UserStoreTx for InMemoryTx {
    async fn soft_delete(&mut self, id: UserId, at: OffsetDateTime) -> Result<(), StoreError> {
        if !self.open {
            return Err(StoreError::TransactionClosed);
        }
        if !self.store.tables.read().await.users.contains_key(&id) {
            return Err(StoreError::Missing(id));
        }
        self.staged.push(Staged::SoftDelete(id, at));
        Ok(())
    }

    async fn delete_tokens_by_user_id(&mut self, user_id: UserId) -> Result<u64, StoreError> {
        if !self.open {
            return Err(StoreError::TransactionClosed);
        }
        if self.store.fail_token_cleanup.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("token cleanup failed".into()));
        }
        let count = self
            .store
            .tables
            .read()
            .await
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .count();
        self.staged.push(Staged::DeleteTokens(user_id));
        Ok(count as u64)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if !self.open {
            return Err(StoreError::TransactionClosed);
        }
        self.open = false;

        let mut tables = self.store.tables.write().await;
        // Apply to a copy so a failing op leaves nothing behind.
        let mut scratch = tables.clone();
        for op in self.staged.drain(..) {
            match op {
                Staged::SoftDelete(id, at) => {
                    let user = scratch.users.get_mut(&id).ok_or(StoreError::Missing(id))?;
                    user.deleted = true;
                    user.date_last_modified = at.max(user.date_last_modified);
                }
                Staged::DeleteTokens(user_id) => scratch.tokens.retain(|t| t.user_id != user_id),
            }
        }
        *tables = scratch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn new_user(email: &str) -> NewUser {
        let now = OffsetDateTime::now_utc();
        NewUser {
            forenames: "Ada".into(),
            surname: "Lovelace".into(),
            email_address: email.into(),
            telephone: "01234 567890".into(),
            date_of_birth: date!(1815 - 12 - 10),
            username: email.into(),
            password_hash: "hash".into(),
            date_added: now,
            date_last_modified: now,
            failed_login_attempts: 0,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = InMemoryUserStore::new();
        let a = store.insert(new_user("a@x.com")).await.unwrap();
        let b = store.insert(new_user("b@x.com")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.find_by_id(2).await.unwrap().unwrap().username, "b@x.com");
    }

    #[tokio::test]
    async fn username_is_unique_among_active_users_only() {
        let store = InMemoryUserStore::new();
        let mut a = store.insert(new_user("a@x.com")).await.unwrap();
        assert!(store.exists_by_username("a@x.com").await.unwrap());

        let err = store.insert(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));

        a.deleted = true;
        store.update(&a).await.unwrap();
        assert!(!store.exists_by_username("a@x.com").await.unwrap());
        store.insert(new_user("a@x.com")).await.unwrap();
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let store = InMemoryUserStore::new();
        let ghost = new_user("g@x.com").into_user(42);
        let err = store.update(&ghost).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing(42)));
    }

    #[tokio::test]
    async fn dropped_transaction_applies_nothing() {
        let store = InMemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();
        store.insert_token(user.id).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.soft_delete(user.id, OffsetDateTime::now_utc()).await.unwrap();
            assert_eq!(tx.delete_tokens_by_user_id(user.id).await.unwrap(), 1);
        }

        assert!(!store.find_by_id(user.id).await.unwrap().unwrap().deleted);
        assert_eq!(store.tokens_for(user.id).await.len(), 1);
    }

    #[tokio::test]
    async fn committed_transaction_applies_everything() {
        let store = InMemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();
        let other = store.insert(new_user("b@x.com")).await.unwrap();
        store.insert_token(user.id).await;
        store.insert_token(user.id).await;
        store.insert_token(other.id).await;

        let mut tx = store.begin().await.unwrap();
        tx.soft_delete(user.id, OffsetDateTime::now_utc()).await.unwrap();
        assert_eq!(tx.delete_tokens_by_user_id(user.id).await.unwrap(), 2);
        tx.commit().await.unwrap();

        assert!(store.find_by_id(user.id).await.unwrap().unwrap().deleted);
        assert!(store.tokens_for(user.id).await.is_empty());
        assert_eq!(store.tokens_for(other.id).await.len(), 1);

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::TransactionClosed));
    }

    #[tokio::test]
    async fn soft_delete_keeps_writes_committed_after_begin() {
        let store = InMemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut renamed = user.clone();
        renamed.forenames = "Augusta".into();
        renamed.username = "new@x.com".into();
        store.update(&renamed).await.unwrap();

        tx.soft_delete(user.id, OffsetDateTime::now_utc()).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.deleted);
        assert_eq!(stored.forenames, "Augusta");
        assert_eq!(stored.username, "new@x.com");
    }

    #[tokio::test]
    async fn soft_delete_never_moves_timestamp_backwards() {
        let store = InMemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let earlier = user.date_last_modified - time::Duration::hours(1);
        tx.soft_delete(user.id, earlier).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.date_last_modified, user.date_last_modified);
    }

    #[tokio::test]
    async fn soft_delete_of_missing_row_fails() {
        let store = InMemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx.soft_delete(9, OffsetDateTime::now_utc()).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing(9)));
    }
}
