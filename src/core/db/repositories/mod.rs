//! Database repositories
//!
//! Each store is a trait so the services can run against PostgreSQL in
//! production and against the in-memory implementations in tests.

pub mod channel;
pub mod memory;
pub mod token;
pub mod user;

pub use channel::{ChannelRepository, ChannelRepositoryError, ChannelStore};
pub use memory::{MemoryChannelStore, MemoryTokenStore, MemoryUserStore};
pub use token::{TokenRepository, TokenRepositoryError, TokenStore, hash_token};
pub use user::{UserRepository, UserRepositoryError, UserStore};
