use dotenv::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    /// Reject anonymous create/edit/delete of transactions.
    pub require_auth: bool,
    pub request_timeout: Duration,
    /// Make the transaction listing fail with a canned internal error.
    pub force_list_error: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("jwt_secret", &"<redacted>")
            .field("require_auth", &self.require_auth)
            .field("request_timeout", &self.request_timeout)
            .field("force_list_error", &self.force_list_error)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5217,
            log_level: "info".to_string(),
            jwt_secret: "secret".to_string(),
            require_auth: false,
            request_timeout: Duration::from_secs(30),
            force_list_error: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();
        let defaults = Self::default();

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.port),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret), // Use a secure secret in production
            require_auth: flag("REQUIRE_AUTH").unwrap_or(defaults.require_auth),
            request_timeout: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            force_list_error: flag("FORCE_LIST_ERROR").unwrap_or(defaults.force_list_error),
        }
    }
}

fn flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
