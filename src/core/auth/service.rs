//! Authentication service
//!
//! Business logic for registration, login, logout and token refresh.
//! Coordinates the user store, the token store and the token service.
//!
//! A user holds at most one live refresh token. Login overwrites it, refresh
//! swaps it atomically, logout deletes it. A refresh token is accepted only
//! while it is both signature-valid and still the stored one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::jwt::{JwtError, TokenService};
use crate::core::auth::password::{PasswordError, PasswordHasher};
use crate::core::db::models::{AuthUser, CreateUser, TokenRecord, UserResponse};
use crate::core::db::repositories::{
    TokenRepositoryError, TokenStore, UserRepositoryError, UserStore,
};

/// Maximum username length (matches the `users.username` column)
pub const MAX_USERNAME_LEN: usize = 50;

/// Authentication service error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("user already exists")]
    UserExists,

    #[error("wrong password")]
    WrongPassword,

    #[error("user not found")]
    UserNotFound,

    #[error("token is expired")]
    TokenExpired,

    #[error("invalid token")]
    InvalidToken,

    #[error("unexpected signing method")]
    UnexpectedSigningMethod,

    #[error("error while signing jwt: {0}")]
    JwtSigning(String),

    #[error("refresh token not found")]
    TokenNotFound,

    #[error("missing bearer token")]
    MissingBearer,

    #[error("no refresh_token cookie found")]
    MissingRefreshCookie,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::InvalidToken | JwtError::InvalidTokenType => AuthError::InvalidToken,
            JwtError::UnexpectedSigningMethod(alg) => {
                tracing::warn!(alg = %alg, "Rejected token with unexpected signing method");
                AuthError::UnexpectedSigningMethod
            }
            JwtError::Signing(_)
            | JwtError::MissingSecret(_)
            | JwtError::SharedSecret
            | JwtError::InvalidExpiration(_) => AuthError::JwtSigning(err.to_string()),
        }
    }
}

/// Map user store errors, tagging anything unrecognized with the operation
fn user_store(operation: &'static str) -> impl FnOnce(UserRepositoryError) -> AuthError {
    move |err| match err {
        UserRepositoryError::NotFound => AuthError::UserNotFound,
        UserRepositoryError::UsernameAlreadyExists => AuthError::UserExists,
        UserRepositoryError::DatabaseError(e) => AuthError::Storage {
            operation,
            message: e.to_string(),
        },
    }
}

/// Map token store errors, tagging anything unrecognized with the operation
fn token_store(operation: &'static str) -> impl FnOnce(TokenRepositoryError) -> AuthError {
    move |err| match err {
        TokenRepositoryError::NotFound => AuthError::TokenNotFound,
        TokenRepositoryError::DatabaseError(e) => AuthError::Storage {
            operation,
            message: e.to_string(),
        },
    }
}

/// Registration request data
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Login request data
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Result of a successful authentication.
///
/// The refresh token is never serialized; the transport delivers it in a cookie.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub user: AuthUser,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    token_service: TokenService,
    hasher: PasswordHasher,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        token_service: TokenService,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            tokens,
            token_service,
            hasher,
        }
    }

    pub fn token_service(&self) -> &TokenService {
        &self.token_service
    }

    fn validate_credentials(username: &str, password: &str) -> Result<(), AuthError> {
        Self::validate_username(username)?;

        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".to_string()));
        }

        Ok(())
    }

    fn validate_username(username: &str) -> Result<(), AuthError> {
        if username.trim().is_empty() {
            return Err(AuthError::InvalidInput("username must not be empty".to_string()));
        }

        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(AuthError::InvalidInput(format!(
                "username must be at most {MAX_USERNAME_LEN} characters"
            )));
        }

        Ok(())
    }

    /// Register a new user
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        Self::validate_credentials(&request.username, &request.password)?;

        // Only a definite "not found" lets registration proceed.
        match self.users.find_by_username(&request.username).await {
            Ok(_) => return Err(AuthError::UserExists),
            Err(UserRepositoryError::NotFound) => {}
            Err(err) => return Err(user_store("register")(err)),
        }

        let password_hash = self.hasher.hash(&request.password).await?;

        // The store's uniqueness check still decides a concurrent race.
        let user = self
            .users
            .create(&CreateUser {
                username: request.username,
                password_hash,
            })
            .await
            .map_err(user_store("register"))?;

        tracing::info!(user_id = %user.id, "User registered");

        self.generate_and_save_tokens(user).await
    }

    /// Login an existing user
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        Self::validate_credentials(&request.username, &request.password)?;

        let user = self
            .users
            .find_by_username(&request.username)
            .await
            .map_err(user_store("login"))?;

        if !self
            .hasher
            .verify(&request.password, &user.password_hash)
            .await?
        {
            tracing::info!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AuthError::WrongPassword);
        }

        tracing::info!(user_id = %user.id, "User logged in");

        self.generate_and_save_tokens(AuthUser::from(&user)).await
    }

    /// Logout (delete the refresh token). Unknown tokens are not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.tokens
            .delete(refresh_token)
            .await
            .map_err(token_store("logout"))
    }

    /// Exchange a live refresh token for a fresh pair.
    ///
    /// The presented token stops working once this returns.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        let claimed = self.token_service.verify_refresh_token(refresh_token)?;

        let record = self
            .tokens
            .find(refresh_token)
            .await
            .map_err(token_store("refresh"))?;

        if record.user_id != claimed.id {
            tracing::warn!(user_id = %claimed.id, "Refresh token stored under another user");
            return Err(AuthError::TokenNotFound);
        }

        // Reload so a renamed user gets tokens carrying the current username.
        let user = self
            .users
            .find_by_id(claimed.id)
            .await
            .map_err(user_store("refresh"))?;
        let user = AuthUser::from(&user);

        let pair = self.token_service.generate_tokens(&user)?;

        // Losing a concurrent refresh surfaces as TokenNotFound.
        self.tokens
            .rotate(user.id, refresh_token, &pair.refresh_token)
            .await
            .map_err(token_store("refresh"))?;

        tracing::debug!(user_id = %user.id, "Refresh token rotated");

        Ok(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user,
        })
    }

    /// Mint a pair and make its refresh token the user's only stored one
    pub async fn generate_and_save_tokens(
        &self,
        user: AuthUser,
    ) -> Result<AuthResponse, AuthError> {
        let pair = self.token_service.generate_tokens(&user)?;

        self.tokens
            .save(&TokenRecord {
                user_id: user.id,
                refresh_token: pair.refresh_token.clone(),
            })
            .await
            .map_err(token_store("save tokens"))?;

        Ok(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user,
        })
    }

    /// Full profile of an authenticated user
    pub async fn current_user(&self, user_id: Uuid) -> Result<UserResponse, AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(user_store("current user"))?;

        Ok(user.into())
    }

    /// Rename a user. Existing access tokens keep the old name until they expire.
    pub async fn change_username(
        &self,
        user_id: Uuid,
        username: &str,
    ) -> Result<UserResponse, AuthError> {
        Self::validate_username(username)?;

        let user = self
            .users
            .update_username(user_id, username)
            .await
            .map_err(user_store("change username"))?;

        tracing::info!(user_id = %user_id, "Username changed");

        Ok(user.into())
    }

    /// Change password (requires the current one) and sign the user out
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".to_string()));
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(user_store("change password"))?;

        if !self
            .hasher
            .verify(current_password, &user.password_hash)
            .await?
        {
            return Err(AuthError::WrongPassword);
        }

        let password_hash = self.hasher.hash(new_password).await?;
        self.users
            .update_password(user_id, &password_hash)
            .await
            .map_err(user_store("change password"))?;

        // Force re-login everywhere
        self.tokens
            .delete_by_user_id(user_id)
            .await
            .map_err(token_store("change password"))?;

        tracing::info!(user_id = %user_id, "Password changed");

        Ok(())
    }
}
