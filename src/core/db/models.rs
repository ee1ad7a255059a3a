//! Database models
//!
//! This module defines the entity structs that map to PostgreSQL tables,
//! plus the DTOs the repositories accept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// User Model
// ============================================================================

/// User entity representing a registered account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub account_description: Option<String>,
}

/// Minimal user projection: the claim set embedded in tokens.
///
/// Carries no credential material, so it is safe to log and serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

/// User data for creation (password must already be hashed)
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub password_hash: String,
}

/// User without sensitive data (for API responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub account_description: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
            account_description: user.account_description,
        }
    }
}

// ============================================================================
// Token Model
// ============================================================================

/// Stored refresh token row. At most one per user.
#[derive(Debug, Clone, FromRow)]
pub struct Token {
    pub user_id: Uuid,
    /// SHA-256 hex digest of the refresh token
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Refresh token to persist for a user (raw value, hashed by the store)
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub user_id: Uuid,
    pub refresh_token: String,
}

// ============================================================================
// Channel Model
// ============================================================================

/// Channel entity owned by a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
}

/// Channel data for creation
#[derive(Debug, Clone, Deserialize)]
pub struct CreateChannel {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
}

/// Channel data for updates (None = keep current value)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateChannel {
    pub title: Option<String>,
    pub description: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            password_hash: "$2b$04$secret_hash".to_string(),
            created_at: Utc::now(),
            account_description: Some("hello".to_string()),
        }
    }

    #[test]
    fn test_user_serialization_skips_password_hash() {
        let json = serde_json::to_string(&sample_user()).unwrap();

        assert!(json.contains("alice"));
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("secret_hash"));
    }

    #[test]
    fn test_auth_user_from_user() {
        let user = sample_user();
        let auth_user = AuthUser::from(&user);

        assert_eq!(auth_user.id, user.id);
        assert_eq!(auth_user.username, "alice");
    }

    #[test]
    fn test_user_response_from_user() {
        let user = sample_user();
        let response: UserResponse = user.clone().into();

        assert_eq!(response.id, user.id);
        assert_eq!(response.username, user.username);
        assert_eq!(response.account_description.as_deref(), Some("hello"));
    }

    #[test]
    fn test_update_channel_partial_deserialization() {
        let update: UpdateChannel = serde_json::from_str(r#"{"title": "news"}"#).unwrap();

        assert_eq!(update.title.as_deref(), Some("news"));
        assert!(update.description.is_none());
    }
}
