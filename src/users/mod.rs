//! Credential store: the `users` table and everything that reads or writes it.

use async_trait::async_trait;
use thiserror::Error;

use crate::db::DbError;

#[cfg(test)]
pub(crate) mod memory;
mod repo;
mod repo_types;

pub use repo::PgUserStore;
pub use repo_types::{Email, NewUser, User, UserUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another user already owns the normalized email.
    #[error("email already registered")]
    DuplicateEmail,

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Persistence for users. Implementations own the uniqueness guarantee on email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// Applies the present fields and refreshes `updated_at`. `None` if no such user.
    async fn update(&self, id: i64, changes: UserUpdate) -> Result<Option<User>, StoreError>;

    /// Physical delete. `false` if no such user.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Idempotent: returns the existing user for `new.email`, or inserts `new`.
    /// The flag is `true` when a row was created.
    async fn find_or_provision(&self, new: NewUser) -> Result<(User, bool), StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}
