//! The gateway configuration, read from a JSON file at startup.

use pyx_client::BackendConfig;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enables the HTTP listing of live sessions on 127.0.0.1.
    #[serde(default)]
    pub admin_port: Option<u16>,
    /// The server name in front of every reply.
    #[serde(default = "default_advertised_name")]
    pub advertised_name: String,
    #[serde(default = "default_network_name")]
    pub network_name: String,
    /// The synthetic user announcing game events.
    #[serde(default = "default_bot_nick")]
    pub bot_nick: String,
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    #[serde(default = "default_bot_hostname")]
    pub bot_hostname: String,
    /// The host part of every user mask.
    #[serde(default = "default_user_hostname")]
    pub user_hostname: String,
    #[serde(default = "default_global_channel")]
    pub global_channel: String,
    #[serde(default = "default_game_channel_prefix")]
    pub game_channel_prefix: String,
    #[serde(default = "default_spectate_game_channel_prefix")]
    pub spectate_game_channel_prefix: String,
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6667
}

fn default_advertised_name() -> String {
    "localhost".to_string()
}

fn default_network_name() -> String {
    "PYX".to_string()
}

fn default_bot_nick() -> String {
    "Xyzzy".to_string()
}

fn default_bot_username() -> String {
    "xyzzy".to_string()
}

fn default_bot_hostname() -> String {
    "localhost".to_string()
}

fn default_user_hostname() -> String {
    "users.localhost".to_string()
}

fn default_global_channel() -> String {
    "#global".to_string()
}

fn default_game_channel_prefix() -> String {
    "#game-".to_string()
}

fn default_spectate_game_channel_prefix() -> String {
    "#watch-".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bind_address: default_bind_address(),
            port: default_port(),
            admin_port: None,
            advertised_name: default_advertised_name(),
            network_name: default_network_name(),
            bot_nick: default_bot_nick(),
            bot_username: default_bot_username(),
            bot_hostname: default_bot_hostname(),
            user_hostname: default_user_hostname(),
            global_channel: default_global_channel(),
            game_channel_prefix: default_game_channel_prefix(),
            spectate_game_channel_prefix: default_spectate_game_channel_prefix(),
            backend: BackendConfig::default(),
        }
    }
}

/// Loads the configuration file. A missing file gives the defaults.
pub async fn load_config(path: &Path) -> Result<GatewayConfig, String> {
    let json_content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "No config file, using defaults.");
            return Ok(GatewayConfig::default());
        }
        Err(error) => return Err(format!("Failed to read file: {}", error)),
    };
    serde_json::from_str(&json_content).map_err(|e| format!("Failed to parse JSON: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config: GatewayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 6667);
        assert_eq!(config.global_channel, "#global");
        assert_eq!(config.spectate_game_channel_prefix, "#watch-");
        assert_eq!(config.backend.retry_count, 3);
        assert!(config.admin_port.is_none());
    }

    #[test]
    fn nested_backend_section() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"bot_nick": "Bot", "backend": {"base_address": "http://pyx:8080/", "retry_count": 1}}"#,
        )
        .unwrap();
        assert_eq!(config.bot_nick, "Bot");
        assert_eq!(config.backend.base_address, "http://pyx:8080/");
        assert_eq!(config.backend.retry_count, 1);
        assert_eq!(config.backend.request_timeout_secs, 60);
    }

    #[tokio::test]
    async fn missing_file_falls_back() {
        let config = load_config(Path::new("/nonexistent/gateway.json"))
            .await
            .unwrap();
        assert_eq!(config.advertised_name, "localhost");
    }
}
