//! Database module
//!
//! This module provides database connectivity, models, and repositories
//! for persistent storage using PostgreSQL and SQLx.

pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used items
pub use models::*;
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations, health_check};
pub use repositories::{
    ChannelRepository, ChannelRepositoryError, ChannelStore, MemoryChannelStore,
    MemoryTokenStore, MemoryUserStore, TokenRepository, TokenRepositoryError, TokenStore,
    UserRepository, UserRepositoryError, UserStore,
};

pub use sqlx::PgPool;
