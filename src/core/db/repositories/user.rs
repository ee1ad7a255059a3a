//! User repository
//!
//! Credential store contract plus its PostgreSQL implementation. Passwords
//! arrive here already hashed; see `core::auth::password`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{AuthUser, CreateUser, User};

/// User repository error types
#[derive(Debug, thiserror::Error)]
pub enum UserRepositoryError {
    #[error("no user found")]
    NotFound,

    #[error("username already exists")]
    UsernameAlreadyExists,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Persistence contract for user records.
///
/// Lookups report a missing user as [`UserRepositoryError::NotFound`] rather
/// than `Option`, so callers can tell "absent" apart from any other failure.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, dto: &CreateUser) -> Result<AuthUser, UserRepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<User, UserRepositoryError>;

    async fn find_by_username(&self, username: &str) -> Result<User, UserRepositoryError>;

    async fn update_username(&self, id: Uuid, username: &str)
    -> Result<User, UserRepositoryError>;

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<User, UserRepositoryError>;
}

const USER_COLUMNS: &str =
    "user_id AS id, username, password_hash, created_at, account_description";

/// PostgreSQL-backed user store
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a unique-constraint violation on `username` to the domain error
fn map_unique_violation(err: sqlx::Error) -> UserRepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            UserRepositoryError::UsernameAlreadyExists
        }
        _ => UserRepositoryError::DatabaseError(err),
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create(&self, dto: &CreateUser) -> Result<AuthUser, UserRepositoryError> {
        // The UNIQUE constraint is the source of truth: two concurrent
        // registrations for one username cannot both insert.
        let user = sqlx::query_as::<_, AuthUser>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING user_id AS id, username
            "#,
        )
        .bind(&dto.username)
        .bind(&dto.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, UserRepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(UserRepositoryError::NotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<User, UserRepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(UserRepositoryError::NotFound)
    }

    async fn update_username(
        &self,
        id: Uuid,
        username: &str,
    ) -> Result<User, UserRepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET username = $2 WHERE user_id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)?
        .ok_or(UserRepositoryError::NotFound)
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<User, UserRepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET password_hash = $2 WHERE user_id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(UserRepositoryError::NotFound)
    }
}
