use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::users::repo_types::{NewUser, User, UserPatch, UserRow};

const EMAIL_CONSTRAINT: &str = "users_email_key";
const ROLL_NO_CONSTRAINT: &str = "users_roll_no_key";

/// Column guarded by a storage-level unique constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    RollNo,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0:?}")]
    Conflict(UniqueField),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for user records keyed by email and roll number.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_roll_no(&self, roll_no: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Fails with `Conflict` when email or roll number is already taken.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    /// Returns the updated record, or `None` when nothing matched.
    async fn update_by_roll_no(
        &self,
        roll_no: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, StoreError>;
    /// Returns the removed record, or `None` when nothing matched.
    async fn delete_by_roll_no(&self, roll_no: &str) -> Result<Option<User>, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

pub(crate) fn unique_violation_field(err: &sqlx::Error) -> Option<UniqueField> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    if !db_err.code().is_some_and(|code| code.as_ref() == "23505") {
        return None;
    }
    match db_err.constraint() {
        Some(EMAIL_CONSTRAINT) => Some(UniqueField::Email),
        Some(ROLL_NO_CONSTRAINT) => Some(UniqueField::RollNo),
        _ => None,
    }
}

fn write_error(err: sqlx::Error, what: &'static str) -> StoreError {
    match unique_violation_field(&err) {
        Some(field) => StoreError::Conflict(field),
        None => StoreError::Backend(anyhow::Error::new(err).context(what)),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, roll_no, password_hash, profile, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(row.map(User::from))
    }

    async fn find_by_roll_no(&self, roll_no: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, roll_no, password_hash, profile, created_at, updated_at
            FROM users
            WHERE roll_no = $1
            "#,
        )
        .bind(roll_no)
        .fetch_optional(&self.db)
        .await
        .context("find user by roll number")?;
        Ok(row.map(User::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, roll_no, password_hash, profile, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(row.map(User::from))
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, roll_no, password_hash, profile)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, roll_no, password_hash, profile, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.roll_no)
        .bind(&user.password_hash)
        .bind(Json(&user.profile))
        .fetch_one(&self.db)
        .await
        .map_err(|e| write_error(e, "insert user"))?;
        Ok(row.into())
    }

    async fn update_by_roll_no(
        &self,
        roll_no: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
               SET email         = COALESCE($2, email),
                   roll_no       = COALESCE($3, roll_no),
                   password_hash = COALESCE($4, password_hash),
                   profile       = profile || $5,
                   updated_at    = now()
             WHERE roll_no = $1
            RETURNING id, email, roll_no, password_hash, profile, created_at, updated_at
            "#,
        )
        .bind(roll_no)
        .bind(patch.email.as_deref())
        .bind(patch.roll_no.as_deref())
        .bind(patch.password_hash.as_deref())
        .bind(Json(&patch.profile))
        .fetch_optional(&self.db)
        .await
        .map_err(|e| write_error(e, "update user by roll number"))?;
        Ok(row.map(User::from))
    }

    async fn delete_by_roll_no(&self, roll_no: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            DELETE FROM users
             WHERE roll_no = $1
            RETURNING id, email, roll_no, password_hash, profile, created_at, updated_at
            "#,
        )
        .bind(roll_no)
        .fetch_optional(&self.db)
        .await
        .context("delete user by roll number")?;
        Ok(row.map(User::from))
    }
}
