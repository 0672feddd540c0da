use async_trait::async_trait;

use super::{Email, NewUser, StoreError, User, UserStore, UserUpdate};
use crate::db::{ConnectionManager, DbError, Param, Statement};

const FIND_BY_EMAIL: Statement = Statement {
    name: "users.find_by_email",
    sql: r#"
        SELECT id, name, email, password, created_at, updated_at
        FROM users
        WHERE email = $1
    "#,
};

const FIND_BY_ID: Statement = Statement {
    name: "users.find_by_id",
    sql: r#"
        SELECT id, name, email, password, created_at, updated_at
        FROM users
        WHERE id = $1
    "#,
};

const INSERT: Statement = Statement {
    name: "users.insert",
    sql: r#"
        INSERT INTO users (name, email, password)
        VALUES ($1, $2, $3)
        RETURNING id, name, email, password, created_at, updated_at
    "#,
};

const INSERT_IF_ABSENT: Statement = Statement {
    name: "users.insert_if_absent",
    sql: r#"
        INSERT INTO users (name, email, password)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO NOTHING
        RETURNING id, name, email, password, created_at, updated_at
    "#,
};

const UPDATE: Statement = Statement {
    name: "users.update",
    sql: r#"
        UPDATE users
        SET name = COALESCE($1, name),
            email = COALESCE($2, email),
            password = COALESCE($3, password),
            updated_at = now()
        WHERE id = $4
        RETURNING id, name, email, password, created_at, updated_at
    "#,
};

const DELETE: Statement = Statement {
    name: "users.delete",
    sql: "DELETE FROM users WHERE id = $1 RETURNING id",
};

/// Postgres-backed [`UserStore`].
#[derive(Clone)]
pub struct PgUserStore {
    db: ConnectionManager,
}

impl PgUserStore {
    pub fn new(db: ConnectionManager) -> Self {
        Self { db }
    }
}

/// Unique violations become `DuplicateEmail`; `email` is the only unique column.
fn map_write_error(e: DbError) -> StoreError {
    if e.is_unique_violation() {
        StoreError::DuplicateEmail
    } else {
        StoreError::Db(e)
    }
}

fn new_user_params(new: NewUser) -> [Param; 3] {
    [
        Param::from(new.name),
        Param::from(new.email.into_inner()),
        Param::from(new.password_hash),
    ]
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let rows = self
            .db
            .execute(INSERT, &new_user_params(new))
            .await
            .map_err(map_write_error)?;
        rows.first_as::<User>()?
            .ok_or(StoreError::Db(DbError::Permanent(sqlx::Error::RowNotFound)))
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        let rows = self
            .db
            .execute(FIND_BY_EMAIL, &[Param::from(email.as_str())])
            .await?;
        Ok(rows.first_as::<User>()?)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let rows = self.db.execute(FIND_BY_ID, &[Param::from(id)]).await?;
        Ok(rows.first_as::<User>()?)
    }

    async fn update(&self, id: i64, changes: UserUpdate) -> Result<Option<User>, StoreError> {
        let params = [
            Param::from(changes.name),
            Param::from(changes.email.map(Email::into_inner)),
            Param::from(changes.password_hash),
            Param::from(id),
        ];
        let rows = self
            .db
            .execute(UPDATE, &params)
            .await
            .map_err(map_write_error)?;
        Ok(rows.first_as::<User>()?)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let rows = self.db.execute(DELETE, &[Param::from(id)]).await?;
        Ok(!rows.is_empty())
    }

    async fn find_or_provision(&self, new: NewUser) -> Result<(User, bool), StoreError> {
        let email = new.email.clone();
        let rows = self
            .db
            .execute(INSERT_IF_ABSENT, &new_user_params(new))
            .await
            .map_err(map_write_error)?;
        if let Some(user) = rows.first_as::<User>()? {
            return Ok((user, true));
        }
        // Conflict: the row exists (possibly inserted by a concurrent sign-in).
        let existing = self
            .find_by_email(&email)
            .await?
            .ok_or(StoreError::Db(DbError::Permanent(sqlx::Error::RowNotFound)))?;
        Ok((existing, false))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(self.db.ping().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RetryPolicy;
    use sqlx::postgres::PgPoolOptions;

    async fn store() -> PgUserStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at Postgres");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("connect");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        PgUserStore::new(ConnectionManager::from_pool(
            pool,
            RetryPolicy::default(),
            true,
        ))
    }

    fn new_user(email: &Email, name: &str) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.clone(),
            password_hash: "$argon2id$placeholder".into(),
        }
    }

    #[tokio::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn postgres_store_round_trip() {
        let store = store().await;
        store.ping().await.expect("ping");
        let email = Email::normalize(&format!("{}@repo.test", uuid::Uuid::new_v4().simple()));

        let created = store.create(new_user(&email, "Ann")).await.unwrap();
        assert_eq!(created.email, email.as_str());
        assert_eq!(created.name, "Ann");

        assert!(matches!(
            store.create(new_user(&email, "Dup")).await,
            Err(StoreError::DuplicateEmail)
        ));

        let (first, provisioned) = store
            .find_or_provision(new_user(&email, "Fed"))
            .await
            .unwrap();
        assert!(!provisioned);
        assert_eq!(first.id, created.id);
        assert_eq!(first.name, "Ann");

        let updated = store
            .update(
                created.id,
                UserUpdate {
                    name: Some("Annie".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(updated.name, "Annie");
        assert_eq!(updated.email, created.email);
        assert_eq!(updated.password, created.password);
        assert!(updated.updated_at >= created.updated_at);

        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Annie");

        assert!(store.delete(created.id).await.unwrap());
        assert!(!store.delete(created.id).await.unwrap());
        assert!(store.find_by_email(&email).await.unwrap().is_none());

        let (fresh, provisioned) = store
            .find_or_provision(new_user(&email, "Fed"))
            .await
            .unwrap();
        assert!(provisioned);
        let (again, provisioned) = store
            .find_or_provision(new_user(&email, "Other"))
            .await
            .unwrap();
        assert!(!provisioned);
        assert_eq!(again.id, fresh.id);
        assert!(store.delete(fresh.id).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn postgres_update_to_taken_email_is_duplicate() {
        let store = store().await;
        let a = Email::normalize(&format!("{}@repo.test", uuid::Uuid::new_v4().simple()));
        let b = Email::normalize(&format!("{}@repo.test", uuid::Uuid::new_v4().simple()));
        let first = store.create(new_user(&a, "A")).await.unwrap();
        let second = store.create(new_user(&b, "B")).await.unwrap();

        let err = store
            .update(
                second.id,
                UserUpdate {
                    email: Some(a.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert!(store.update(i64::MAX, UserUpdate::default()).await.unwrap().is_none());

        store.delete(first.id).await.unwrap();
        store.delete(second.id).await.unwrap();
    }
}
