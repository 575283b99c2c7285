use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfig {
    /// WebSocket endpoint of the browser-automation driver.
    #[serde(default = "default_driver_url")]
    pub url: String,
    /// Key the driver persists the authenticated login under.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_driver_url() -> String {
    "ws://127.0.0.1:3001".to_string()
}

fn default_client_id() -> String {
    "wabridge".to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_headless() -> bool {
    true
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            url: default_driver_url(),
            client_id: default_client_id(),
            reconnect_delay_secs: default_reconnect_delay(),
            headless: default_headless(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Bearer token required on every route except `/health`. Unset disables auth.
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_gateway_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderConfig {
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default = "default_forward_timeout")]
    pub timeout_secs: u64,
}

fn default_forward_timeout() -> u64 {
    10
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            timeout_secs: default_forward_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesConfig {
    /// Capability descriptor path. Defaults to `~/.wabridge/capabilities.json`.
    #[serde(default)]
    pub file: Option<String>,
    /// Operator override: skip the allow-list entirely.
    #[serde(default)]
    pub allow_all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupsConfig {
    #[serde(default = "default_invite_base_url")]
    pub invite_base_url: String,
    /// Private invite text. `{link}` and `{group}` are substituted.
    #[serde(default = "default_invite_message")]
    pub invite_message: String,
    #[serde(default = "default_sends_per_second")]
    pub sends_per_second: f64,
}

fn default_invite_base_url() -> String {
    "https://chat.whatsapp.com/".to_string()
}

fn default_invite_message() -> String {
    "You have been invited to join the group \"{group}\": {link}".to_string()
}

fn default_sends_per_second() -> f64 {
    1.0
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            invite_base_url: default_invite_base_url(),
            invite_message: default_invite_message(),
            sends_per_second: default_sends_per_second(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub forwarder: ForwarderConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub groups: GroupsConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides. `lookup` is injected so tests do not touch
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = non_empty("PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.gateway.port = port;
        }
        if let Some(token) = non_empty("WABRIDGE_API_TOKEN") {
            self.gateway.api_token = Some(token);
        }
        if let Some(flag) = non_empty("WABRIDGE_ALLOW_ALL_METHODS") {
            self.capabilities.allow_all = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = non_empty("WABRIDGE_DRIVER_URL") {
            self.driver.url = url;
        }
        if let Some(url) = non_empty("WABRIDGE_CALLBACK_URL") {
            self.forwarder.callback_url = Some(url);
        }
    }

    pub fn capabilities_path(&self, paths: &Paths) -> PathBuf {
        match self.capabilities.file.as_deref().map(str::trim) {
            Some(f) if !f.is_empty() => PathBuf::from(f),
            _ => paths.capabilities_file(),
        }
    }

    pub fn api_token(&self) -> Option<&str> {
        self.gateway
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_config_uses_defaults() {
        let raw = r#"{ "gateway": { "port": 8080 }, "groups": { "sendsPerSecond": 2.5 } }"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.gateway.port, 8080);
        assert_eq!(cfg.gateway.host, "0.0.0.0");
        assert_eq!(cfg.driver.url, "ws://127.0.0.1:3001");
        assert_eq!(cfg.groups.sends_per_second, 2.5);
        assert!(cfg.groups.invite_message.contains("{link}"));
        assert!(!cfg.capabilities.allow_all);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "4100"),
            ("WABRIDGE_ALLOW_ALL_METHODS", "true"),
            ("WABRIDGE_API_TOKEN", "  "),
            ("WABRIDGE_CALLBACK_URL", "http://localhost:5000/webhook"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.gateway.port, 4100);
        assert!(cfg.capabilities.allow_all);
        assert!(cfg.api_token().is_none());
        assert_eq!(cfg.forwarder.callback_url.as_deref(), Some("http://localhost:5000/webhook"));
    }

    #[test]
    fn test_save_and_load_roundtrip_through_paths() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());

        let mut cfg = Config::default();
        cfg.gateway.api_token = Some("secret".to_string());
        cfg.save(&paths.config_file()).unwrap();

        let loaded = Config::load(&paths.config_file()).unwrap();
        assert_eq!(loaded.api_token(), Some("secret"));
        assert_eq!(loaded.capabilities_path(&paths), paths.capabilities_file());
    }
}
