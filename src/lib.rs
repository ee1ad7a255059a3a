//! Social network backend
//!
//! User registration and login with JWT access/refresh token pairs, refresh
//! token rotation and revocation, plus owner-scoped channels. State lives in
//! PostgreSQL or, without a `DATABASE_URL`, in process memory.

pub mod app;
pub mod core;
