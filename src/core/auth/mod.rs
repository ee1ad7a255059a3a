//! Authentication module
//!
//! This module provides authentication functionality including:
//! - Access/refresh token generation and verification
//! - Password hashing
//! - User registration, login, logout and refresh-token rotation
//! - The bearer-token extractor and REST API endpoints

pub mod api;
pub mod extractor;
pub mod jwt;
pub mod password;
pub mod service;

pub use api::{AuthApiState, REFRESH_TOKEN_COOKIE, auth_api_router};
pub use extractor::CurrentUser;
pub use jwt::{Claims, JwtConfig, JwtError, TokenPair, TokenService, TokenType};
pub use password::{PasswordError, PasswordHasher};
pub use service::{AuthError, AuthResponse, AuthService, LoginRequest, RegisterRequest};
