use serde::Deserialize;
use std::time::Duration;

/// Where the backend lives and how patient we are with it.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_address")]
    pub base_address: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Has to be longer than the time the backend holds a poll open.
    #[serde(default = "default_long_poll_timeout")]
    pub long_poll_timeout_secs: u64,
    /// Attempts for a request that could not even connect.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_address() -> String {
    "http://127.0.0.1:8080/".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_long_poll_timeout() -> u64 {
    120
}

fn default_retry_count() -> u32 {
    3
}

fn default_user_agent() -> String {
    "PYX-IRC".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            base_address: default_base_address(),
            request_timeout_secs: default_request_timeout(),
            long_poll_timeout_secs: default_long_poll_timeout(),
            retry_count: default_retry_count(),
            user_agent: default_user_agent(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.long_poll_timeout_secs)
    }

    /// The full address of a backend path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_address.trim_end_matches('/'), path)
    }
}
