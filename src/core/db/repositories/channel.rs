//! Channel repository for database operations

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{Channel, CreateChannel, UpdateChannel};

/// Channel repository error types
#[derive(Debug, thiserror::Error)]
pub enum ChannelRepositoryError {
    #[error("no channel found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Persistence contract for channels
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn find_all(&self, limit: i64, offset: i64)
    -> Result<Vec<Channel>, ChannelRepositoryError>;

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Channel>, ChannelRepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Channel, ChannelRepositoryError>;

    async fn create(&self, dto: &CreateChannel) -> Result<Channel, ChannelRepositoryError>;

    async fn update(
        &self,
        id: Uuid,
        dto: &UpdateChannel,
    ) -> Result<Channel, ChannelRepositoryError>;

    /// Returns whether a row was removed
    async fn delete(&self, id: Uuid) -> Result<bool, ChannelRepositoryError>;
}

const CHANNEL_COLUMNS: &str = "channel_id AS id, user_id, created_at, title, description";

/// PostgreSQL-backed channel store
#[derive(Clone)]
pub struct ChannelRepository {
    pool: PgPool,
}

impl ChannelRepository {
    /// Create a new channel repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelStore for ChannelRepository {
    async fn find_all(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Channel>, ChannelRepositoryError> {
        let channels = sqlx::query_as::<_, Channel>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(channels)
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Channel>, ChannelRepositoryError> {
        let channels = sqlx::query_as::<_, Channel>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(channels)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Channel, ChannelRepositoryError> {
        sqlx::query_as::<_, Channel>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE channel_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ChannelRepositoryError::NotFound)
    }

    async fn create(&self, dto: &CreateChannel) -> Result<Channel, ChannelRepositoryError> {
        let channel = sqlx::query_as::<_, Channel>(&format!(
            "INSERT INTO channels (user_id, title, description) VALUES ($1, $2, $3) \
             RETURNING {CHANNEL_COLUMNS}"
        ))
        .bind(dto.user_id)
        .bind(&dto.title)
        .bind(&dto.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(channel)
    }

    async fn update(
        &self,
        id: Uuid,
        dto: &UpdateChannel,
    ) -> Result<Channel, ChannelRepositoryError> {
        sqlx::query_as::<_, Channel>(&format!(
            r#"
            UPDATE channels
            SET
                title = COALESCE($2, title),
                description = COALESCE($3, description)
            WHERE channel_id = $1
            RETURNING {CHANNEL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&dto.title)
        .bind(&dto.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ChannelRepositoryError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ChannelRepositoryError> {
        let result = sqlx::query("DELETE FROM channels WHERE channel_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
