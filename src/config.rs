//! Minimal runtime configuration helpers.
//! Hosts that manage their own settings can use [`crate::ClientBuilder`] directly instead.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://smart-me.com/api";
pub const DEFAULT_LOG_LEVEL: u8 = 1;

#[derive(Clone)]
pub struct Config {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Requests are traced when above 1.
    pub log_level: u8,
    /// Optional upper bound for a whole request; unset means wait indefinitely.
    pub timeout: Option<Duration>,
}

impl core::fmt::Debug for Config {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("log_level", &self.log_level)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let base_url = match lookup("SMARTME_BASE_URL") {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => DEFAULT_BASE_URL.to_string(),
        };

        let required = |key: &str| match lookup(key) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(format!("Missing credentials: set {}", key)),
        };
        let username = required("SMARTME_USERNAME")?;
        let password = required("SMARTME_PASSWORD")?;

        let log_level = match lookup("SMARTME_LOG_LEVEL") {
            Some(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<u8>()
                .map_err(|_| "SMARTME_LOG_LEVEL must be an integer between 0 and 255".to_string())?,
            _ => DEFAULT_LOG_LEVEL,
        };

        let timeout = match lookup("SMARTME_TIMEOUT_SECS") {
            Some(s) if !s.trim().is_empty() => Some(Duration::from_secs(
                s.trim()
                    .parse::<u64>()
                    .map_err(|_| "SMARTME_TIMEOUT_SECS must be a whole number of seconds".to_string())?,
            )),
            _ => None,
        };

        Ok(Config {
            base_url,
            username,
            password,
            log_level,
            timeout,
        })
    }
}
