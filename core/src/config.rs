use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub moderation: ModerationConfig,

    #[serde(default)]
    pub wechat: WechatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Scheme and host of the text-generation API; the chat `action` is appended.
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,

    /// Shared privileged credential handed out under the daily quota.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            api_key: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// A `key` containing this marker asks for the shared credential.
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            sentinel: default_sentinel(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModerationConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

impl ModerationConfig {
    /// Both endpoint and key must be present for the gate to be active.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.endpoint.as_deref(), self.api_key.as_deref()) {
            (Some(endpoint), Some(key)) if !endpoint.is_empty() && !key.is_empty() => {
                Some((endpoint, key))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WechatConfig {
    #[serde(default = "default_wechat_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub app_id: String,

    #[serde(default)]
    pub secret: String,
}

impl Default for WechatConfig {
    fn default() -> Self {
        Self {
            base_url: default_wechat_base_url(),
            app_id: String::new(),
            secret: String::new(),
        }
    }
}

// Default value functions
fn default_port() -> u16 { 8008 }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_upstream_base_url() -> String { "https://api.openai.com".to_string() }
fn default_connect_timeout() -> u64 { 20 }
fn default_daily_limit() -> u32 { 3 }
fn default_sentinel() -> String { "l5e2e0".to_string() }
fn default_wechat_base_url() -> String { "https://api.weixin.qq.com".to_string() }

/// Get default config file path
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("chat-relay")
        .join("config.toml")
}

/// Load config from file, or return defaults if not found, then apply
/// environment overrides.
///
/// Loading order:
/// 1. Specified path (if provided)
/// 2. ./config.toml (if exists)
/// 3. default_config_path() (usually ~/.config/chat-relay/config.toml)
pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut config = load_config_file(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

fn load_config_file(path: Option<PathBuf>) -> anyhow::Result<Config> {
    if let Some(config_path) = path {
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::info!("Loaded config from specified path {:?}", config_path);
            return Ok(config);
        } else {
            anyhow::bail!("Specified config file not found: {:?}", config_path);
        }
    }

    let local_config = PathBuf::from("config.toml");
    if local_config.exists() {
        match std::fs::read_to_string(&local_config) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from current directory {:?}", local_config);
                    return Ok(config);
                }
                Err(e) => {
                    tracing::error!("Failed to parse ./config.toml: {}. Falling back to default path.", e);
                }
            },
            Err(e) => {
                tracing::error!("Failed to read ./config.toml: {}. Falling back to default path.", e);
            }
        }
    }

    let default_path = default_config_path();
    if default_path.exists() {
        let content = std::fs::read_to_string(&default_path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::info!("Loaded config from default path {:?}", default_path);
        Ok(config)
    } else {
        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}

/// Environment variables win over file values. `lookup` is injected so the
/// override rules can be exercised without touching the process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(port) = get("PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => tracing::warn!("Ignoring invalid PORT {:?}: {}", port, e),
        }
    }
    if let Some(key) = get("OPEN_AI_KEY") {
        config.upstream.api_key = Some(key);
    }
    if let Some(app_id) = get("APPID") {
        config.wechat.app_id = app_id;
    }
    if let Some(secret) = get("SECRET") {
        config.wechat.secret = secret;
    }
    if let Some(endpoint) = get("MODERATION_ENDPOINT") {
        config.moderation.endpoint = Some(endpoint);
    }
    if let Some(key) = get("MODERATION_KEY") {
        config.moderation.api_key = Some(key);
    }
}

/// Expand ~ in path to home directory
pub fn expand_path(path: &PathBuf) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(rest) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
    }
    path.clone()
}
