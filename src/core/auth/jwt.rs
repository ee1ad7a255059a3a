//! Token generation and verification
//!
//! Access tokens are short-lived (3 hours), refresh tokens are long-lived
//! (30 days). Each class is signed with its own HMAC secret, so a leaked
//! access secret cannot be used to mint refresh tokens.

use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::db::models::AuthUser;

/// Default access token expiration time (3 hours)
const ACCESS_TOKEN_EXPIRATION_HOURS: i64 = 3;

/// Default refresh token expiration time (30 days)
const REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 30;

const DEFAULT_ISSUER: &str = "social-network";

/// Algorithm used for signing
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Algorithms accepted on verification: the HMAC family only
const ACCEPTED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Token configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret for signing access tokens
    pub access_secret: String,
    /// Secret for signing refresh tokens
    pub refresh_secret: String,
    /// Access token expiration in hours
    pub access_token_expiration_hours: i64,
    /// Refresh token expiration in days
    pub refresh_token_expiration_days: i64,
    /// Token issuer
    pub issuer: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field(
                "access_token_expiration_hours",
                &self.access_token_expiration_hours,
            )
            .field(
                "refresh_token_expiration_days",
                &self.refresh_token_expiration_days,
            )
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtConfig {
    /// Create a new configuration with default lifetimes
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_token_expiration_hours: ACCESS_TOKEN_EXPIRATION_HOURS,
            refresh_token_expiration_days: REFRESH_TOKEN_EXPIRATION_DAYS,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Result<Self, JwtError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, JwtError> {
        let secret = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(JwtError::MissingSecret(key))
        };
        let access_secret = secret("JWT_ACCESS_SECRET")?;
        let refresh_secret = secret("JWT_REFRESH_SECRET")?;

        if access_secret == refresh_secret {
            return Err(JwtError::SharedSecret);
        }

        let access_exp = expiration(
            &lookup,
            "JWT_ACCESS_EXPIRATION_HOURS",
            ACCESS_TOKEN_EXPIRATION_HOURS,
            Duration::try_hours,
        )?;
        let refresh_exp = expiration(
            &lookup,
            "JWT_REFRESH_EXPIRATION_DAYS",
            REFRESH_TOKEN_EXPIRATION_DAYS,
            Duration::try_days,
        )?;

        let issuer = lookup("JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string());

        Ok(Self {
            access_secret,
            refresh_secret,
            access_token_expiration_hours: access_exp,
            refresh_token_expiration_days: refresh_exp,
            issuer,
        })
    }

    /// Set access token expiration
    pub fn access_token_expiration(mut self, hours: i64) -> Self {
        self.access_token_expiration_hours = hours;
        self
    }

    /// Set refresh token expiration
    pub fn refresh_token_expiration(mut self, days: i64) -> Self {
        self.refresh_token_expiration_days = days;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// Read a token lifetime; it must be positive and representable as an
/// expiry timestamp
fn expiration(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<i64, JwtError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };

    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| JwtError::InvalidExpiration(key))?;

    let in_range = value > 0
        && to_duration(value)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .is_some();
    if !in_range {
        return Err(JwtError::InvalidExpiration(key));
    }

    Ok(value)
}

/// Token errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("{0} environment variable not set")]
    MissingSecret(&'static str),

    #[error("access and refresh secrets must differ")]
    SharedSecret,

    #[error("{0} must be a positive lifetime within range")]
    InvalidExpiration(&'static str),

    #[error("error while signing jwt: {0}")]
    Signing(String),

    #[error("unexpected signing method: {0}")]
    UnexpectedSigningMethod(String),

    #[error("token is expired")]
    Expired,

    #[error("invalid token")]
    InvalidToken,

    #[error("invalid token type")]
    InvalidTokenType,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidAlgorithm => JwtError::UnexpectedSigningMethod(err.to_string()),
            _ => JwtError::InvalidToken,
        }
    }
}

/// Token class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claims carried by both token classes
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub username: String,
    pub token_type: TokenType,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique per token, so two pairs minted in the same second differ
    pub jti: String,
}

impl Claims {
    /// Get user ID as UUID
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }

    /// Rebuild the user projection from the claims alone
    pub fn auth_user(&self) -> Result<AuthUser, JwtError> {
        Ok(AuthUser {
            id: self.user_id()?,
            username: self.username.clone(),
        })
    }
}

/// Access + refresh token pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiration (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiration (Unix timestamp)
    pub refresh_expires_at: i64,
}

/// Only the field needed to pin the algorithm. Unlike `jsonwebtoken::Header`
/// this accepts any `alg`, including `none`.
#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Raw `alg` of the token's header segment
fn header_algorithm(token: &str) -> Result<String, JwtError> {
    let segment = token.split('.').next().unwrap_or_default();
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| JwtError::InvalidToken)?;
    let header: RawHeader = serde_json::from_slice(&bytes).map_err(|_| JwtError::InvalidToken)?;

    Ok(header.alg)
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies tokens. Holds only immutable key material and is
/// cheap to clone across request handlers.
#[derive(Clone)]
pub struct TokenService {
    config: JwtConfig,
    access_keys: KeyPair,
    refresh_keys: KeyPair,
}

impl TokenService {
    /// Create a new token service
    pub fn new(config: JwtConfig) -> Self {
        let access_keys = KeyPair::from_secret(&config.access_secret);
        let refresh_keys = KeyPair::from_secret(&config.refresh_secret);

        Self {
            config,
            access_keys,
            refresh_keys,
        }
    }

    /// Create token service from environment variables
    pub fn from_env() -> Result<Self, JwtError> {
        Ok(Self::new(JwtConfig::from_env()?))
    }

    fn keys(&self, token_type: TokenType) -> &KeyPair {
        match token_type {
            TokenType::Access => &self.access_keys,
            TokenType::Refresh => &self.refresh_keys,
        }
    }

    fn lifetime(&self, token_type: TokenType) -> Option<Duration> {
        match token_type {
            TokenType::Access => Duration::try_hours(self.config.access_token_expiration_hours),
            TokenType::Refresh => Duration::try_days(self.config.refresh_token_expiration_days),
        }
    }

    fn sign(&self, user: &AuthUser, token_type: TokenType) -> Result<(String, i64), JwtError> {
        let now = Utc::now();
        let exp = self
            .lifetime(token_type)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                JwtError::Signing(format!("{token_type} token lifetime out of range"))
            })?;

        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            token_type,
            iss: self.config.issuer.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::new(SIGNING_ALGORITHM),
            &claims,
            &self.keys(token_type).encoding,
        )
        .map_err(|e| JwtError::Signing(e.to_string()))?;

        Ok((token, exp.timestamp()))
    }

    /// Mint a fresh access/refresh pair for `user`.
    ///
    /// Pure: persisting the refresh token is the caller's job.
    pub fn generate_tokens(&self, user: &AuthUser) -> Result<TokenPair, JwtError> {
        let (access_token, access_expires_at) = self.sign(user, TokenType::Access)?;
        let (refresh_token, refresh_expires_at) = self.sign(user, TokenType::Refresh)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Parse and validate a token of the given class
    pub fn decode_claims(&self, token: &str, token_type: TokenType) -> Result<Claims, JwtError> {
        // Pin the algorithm family before touching the signature.
        let alg = header_algorithm(token)?;
        let accepted = Algorithm::from_str(&alg)
            .map(|parsed| ACCEPTED_ALGORITHMS.contains(&parsed))
            .unwrap_or(false);
        if !accepted {
            return Err(JwtError::UnexpectedSigningMethod(alg));
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.keys(token_type).decoding, &validation)?.claims;

        if claims.exp < Utc::now().timestamp() {
            return Err(JwtError::Expired);
        }

        if claims.token_type != token_type {
            return Err(JwtError::InvalidTokenType);
        }

        Ok(claims)
    }

    /// Verify an access token and return the user it was issued to
    pub fn verify_access_token(&self, token: &str) -> Result<AuthUser, JwtError> {
        self.decode_claims(token, TokenType::Access)?.auth_user()
    }

    /// Verify a refresh token signature and expiry.
    ///
    /// Does not consult the token store; revocation is checked by the caller.
    pub fn verify_refresh_token(&self, token: &str) -> Result<AuthUser, JwtError> {
        self.decode_claims(token, TokenType::Refresh)?.auth_user()
    }

    /// Get the refresh token expiration in days
    pub fn refresh_token_expiration_days(&self) -> i64 {
        self.config.refresh_token_expiration_days
    }
}
