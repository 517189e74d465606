//! Core types, configuration, and utilities for the Kaiwa client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_CLIENT_ID, DEFAULT_LOG_LEVEL, DEFAULT_REGION,
    DEFAULT_USER_POOL_ID,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
