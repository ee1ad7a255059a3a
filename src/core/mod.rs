//! Core domain: authentication, channels and their storage

pub mod api_error;
pub mod auth;
pub mod channels;
pub mod config;
pub mod db;
