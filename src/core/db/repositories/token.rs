//! Token repository for refresh token management
//!
//! Holds at most one refresh token per user. Tokens are stored as SHA-256
//! hashes; every lookup hashes the presented token first.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{Token, TokenRecord};

/// Token repository error types
#[derive(Debug, thiserror::Error)]
pub enum TokenRepositoryError {
    #[error("no token found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Persistence contract for refresh tokens.
///
/// Invariant: a user has zero or one row. `save` and `rotate` must each be a
/// single atomic statement per user, never a read followed by a write.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Find the row holding this exact refresh token
    async fn find(&self, refresh_token: &str) -> Result<Token, TokenRepositoryError>;

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Token, TokenRepositoryError>;

    /// Insert the user's row, or overwrite it in place if one exists
    async fn save(&self, record: &TokenRecord) -> Result<Token, TokenRepositoryError>;

    /// Replace `current` with `next` only if `current` is still the stored
    /// token for `user_id`. Fails with `NotFound` otherwise.
    async fn rotate(
        &self,
        user_id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<Token, TokenRepositoryError>;

    /// Delete the row holding this refresh token. Missing rows are not an error.
    async fn delete(&self, refresh_token: &str) -> Result<(), TokenRepositoryError>;

    async fn delete_by_user_id(&self, user_id: Uuid) -> Result<(), TokenRepositoryError>;
}

/// PostgreSQL-backed token store
#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    /// Create a new token repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for TokenRepository {
    async fn find(&self, refresh_token: &str) -> Result<Token, TokenRepositoryError> {
        sqlx::query_as::<_, Token>(
            r#"
            SELECT user_id, token_hash, created_at, updated_at
            FROM tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(refresh_token))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TokenRepositoryError::NotFound)
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Token, TokenRepositoryError> {
        sqlx::query_as::<_, Token>(
            r#"
            SELECT user_id, token_hash, created_at, updated_at
            FROM tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TokenRepositoryError::NotFound)
    }

    async fn save(&self, record: &TokenRecord) -> Result<Token, TokenRepositoryError> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            INSERT INTO tokens (user_id, token_hash)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash, updated_at = NOW()
            RETURNING user_id, token_hash, created_at, updated_at
            "#,
        )
        .bind(record.user_id)
        .bind(hash_token(&record.refresh_token))
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    async fn rotate(
        &self,
        user_id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<Token, TokenRepositoryError> {
        sqlx::query_as::<_, Token>(
            r#"
            UPDATE tokens
            SET token_hash = $3, updated_at = NOW()
            WHERE user_id = $1 AND token_hash = $2
            RETURNING user_id, token_hash, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(hash_token(current))
        .bind(hash_token(next))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TokenRepositoryError::NotFound)
    }

    async fn delete(&self, refresh_token: &str) -> Result<(), TokenRepositoryError> {
        let result = sqlx::query("DELETE FROM tokens WHERE token_hash = $1")
            .bind(hash_token(refresh_token))
            .execute(&self.pool)
            .await?;

        tracing::debug!(rows = result.rows_affected(), "Deleted refresh token");
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: Uuid) -> Result<(), TokenRepositoryError> {
        sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
