//! Channels module
//!
//! Public read endpoints plus owner-only writes, gated by the bearer extractor.

pub mod api;

pub use api::{ChannelApiError, ChannelApiState, channel_api_router};
