use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{Email, NewUser, StoreError, User, UserStore, UserUpdate};

/// In-memory [`UserStore`] for tests. Enforces the same email uniqueness as the
/// database's unique index.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: Vec<User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().users.len()
    }
}

impl Inner {
    fn insert(&mut self, new: NewUser) -> Result<User, StoreError> {
        if self.users.iter().any(|u| u.email == new.email.as_str()) {
            return Err(StoreError::DuplicateEmail);
        }
        self.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: self.next_id,
            name: new.name,
            email: new.email.into_inner(),
            password: new.password_hash,
            created_at: now,
            updated_at: now,
        };
        self.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        self.inner.lock().unwrap().insert(new)
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.email == email.as_str()).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn update(&self, id: i64, changes: UserUpdate) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(email) = &changes.email {
            if inner
                .users
                .iter()
                .any(|u| u.id != id && u.email == email.as_str())
            {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email.into_inner();
        }
        if let Some(hash) = changes.password_hash {
            user.password = hash;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.users.len();
        inner.users.retain(|u| u.id != id);
        Ok(inner.users.len() != before)
    }

    async fn find_or_provision(&self, new: NewUser) -> Result<(User, bool), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.users.iter().find(|u| u.email == new.email.as_str()) {
            return Ok((existing.clone(), false));
        }
        inner.insert(new).map(|u| (u, true))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ann".into(),
            email: Email::normalize(email),
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_rejects_duplicates() {
        let store = MemoryUserStore::new();
        let a = store.create(new_user("a@b.com")).await.unwrap();
        let b = store.create(new_user("c@d.com")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        let err = store.create(new_user(" A@B.com ")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn find_or_provision_is_idempotent() {
        let store = MemoryUserStore::new();
        let (first, created) = store.find_or_provision(new_user("o@auth.io")).await.unwrap();
        assert!(created);
        let (second, created) = store.find_or_provision(new_user("O@Auth.io")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_applies_only_present_fields() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("a@b.com")).await.unwrap();
        let updated = store
            .update(
                user.id,
                UserUpdate {
                    name: Some("Anna".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .expect("user exists");
        assert_eq!(updated.name, "Anna");
        assert_eq!(updated.email, "a@b.com");
        assert_eq!(updated.password, "hash");
        assert!(store.update(99, UserUpdate::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_went_away() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("a@b.com")).await.unwrap();
        assert!(store.delete(user.id).await.unwrap());
        assert!(!store.delete(user.id).await.unwrap());
        assert!(store.find_by_id(user.id).await.unwrap().is_none());
    }
}
