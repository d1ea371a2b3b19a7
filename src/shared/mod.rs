//! Shared components - common types, errors, configuration and utilities

pub mod types;
pub mod errors;
pub mod utils;
pub mod config;
