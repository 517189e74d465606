//! Configuration management for the client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default user pool region (can be overridden at compile time via KAIWA_REGION).
pub const DEFAULT_REGION: &str = match option_env!("KAIWA_REGION") {
    Some(region) => region,
    None => "ap-northeast-1",
};

/// Default app client identifier (can be overridden at compile time via KAIWA_CLIENT_ID).
pub const DEFAULT_CLIENT_ID: &str = match option_env!("KAIWA_CLIENT_ID") {
    Some(id) => id,
    None => "kaiwa-dev-client",
};

/// Default user pool identifier (can be overridden at compile time via KAIWA_USER_POOL_ID).
pub const DEFAULT_USER_POOL_ID: &str = match option_env!("KAIWA_USER_POOL_ID") {
    Some(id) => id,
    None => "ap-northeast-1_kaiwadev",
};

/// Default backend base URL (can be overridden at compile time via KAIWA_API_BASE_URL).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("KAIWA_API_BASE_URL") {
    Some(url) => url,
    None => "https://api.kaiwa.chat/prod",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main client configuration.
///
/// Supplied once at startup; treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// User pool region.
    #[serde(default = "default_region")]
    pub region: String,
    /// App client identifier registered with the user pool.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// App client secret. When absent, provider requests omit the secret hash.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// User pool identifier.
    #[serde(default = "default_user_pool_id")]
    pub user_pool_id: String,
    /// Backend API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Identity provider endpoint override. When absent, the regional
    /// endpoint derived from `region` is used.
    #[serde(default)]
    pub provider_endpoint: Option<String>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_user_pool_id() -> String {
    DEFAULT_USER_POOL_ID.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            region: DEFAULT_REGION.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: None,
            user_pool_id: DEFAULT_USER_POOL_ID.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            provider_endpoint: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables override file values.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from `KAIWA_*` environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("KAIWA_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(region) = std::env::var("KAIWA_REGION") {
            self.region = region;
        }
        if let Ok(client_id) = std::env::var("KAIWA_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("KAIWA_CLIENT_SECRET") {
            self.client_secret = Some(client_secret);
        }
        if let Ok(user_pool_id) = std::env::var("KAIWA_USER_POOL_ID") {
            self.user_pool_id = user_pool_id;
        }
        if let Ok(api_base_url) = std::env::var("KAIWA_API_BASE_URL") {
            self.api_base_url = api_base_url;
        }
        if let Ok(endpoint) = std::env::var("KAIWA_PROVIDER_ENDPOINT") {
            self.provider_endpoint = Some(endpoint);
        }
    }

    /// Get the backend API base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }
}
