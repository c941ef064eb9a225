//! Configuration types and loading.
//!
//! Config is layered: defaults, then an optional JSON file (e.g. `~/.pongbot/config.json`),
//! then environment variables (`SLACK_*`, `PORT`). The CLI loads `.env` before any of this runs.
//! [`Settings::resolve`] validates the result once at startup; everything downstream takes `&Settings`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const ENV_APP_TOKEN: &str = "SLACK_APP_LEVEL_TOKEN";
pub const ENV_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";
pub const ENV_SIGNING_SECRET: &str = "SLACK_SIGNING_SECRET";
pub const ENV_PORT: &str = "PORT";

const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

/// Top-level application config (file + env, before validation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Slack credentials and delivery mode.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Keyword matching options.
    #[serde(default)]
    pub responder: ResponderConfig,
}

/// HTTP listener bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the HTTP listener (default 3000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Slack app credentials. Each token is overridden by its env variable when set.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// App-level token (`xapp-...`), used to open Socket Mode connections.
    pub app_token: Option<String>,
    /// Bot token (`xoxb-...`), used for Web API calls such as chat.postMessage.
    pub bot_token: Option<String>,
    /// Signing secret, used to verify Events API requests in HTTP mode.
    pub signing_secret: Option<String>,
    /// Receive events over a Socket Mode WebSocket (default). When false, Slack POSTs to /slack/events.
    #[serde(default = "default_socket_mode")]
    pub socket_mode: bool,
    /// Web API base URL (default https://slack.com/api).
    pub api_base_url: Option<String>,
}

fn default_socket_mode() -> bool {
    true
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            app_token: None,
            bot_token: None,
            signing_secret: None,
            socket_mode: default_socket_mode(),
            api_base_url: None,
        }
    }
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("app_token", &redacted(&self.app_token))
            .field("bot_token", &redacted(&self.bot_token))
            .field("signing_secret", &redacted(&self.signing_secret))
            .field("socket_mode", &self.socket_mode)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

fn redacted(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

/// How trigger keywords are compared against message text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchPolicy {
    /// Case-sensitive substring ("hello" matches "othello").
    #[default]
    Substring,
    /// Case-insensitive substring ("HELLO" matches "hello").
    IgnoreCase,
    /// Case-sensitive, bounded by non-alphanumeric characters or the ends of the text.
    WholeWord,
}

/// Responder options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderConfig {
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {0} (set it in the environment, .env, or the config file)")]
    MissingCredential(&'static str),
    #[error("SLACK_APP_LEVEL_TOKEN must be an app-level token starting with \"xapp-\"")]
    InvalidAppToken,
    #[error("invalid PORT value {0:?}: expected a port number")]
    InvalidPort(String),
}

/// Trim and drop blank values.
fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

impl Config {
    /// Apply environment overrides using `lookup` (normally `std::env::var`).
    /// Blank values are ignored. A non-numeric PORT is an error.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).as_deref().and_then(non_empty);
        if let Some(t) = get(ENV_APP_TOKEN) {
            self.slack.app_token = Some(t);
        }
        if let Some(t) = get(ENV_BOT_TOKEN) {
            self.slack.bot_token = Some(t);
        }
        if let Some(s) = get(ENV_SIGNING_SECRET) {
            self.slack.signing_secret = Some(s);
        }
        if let Some(p) = get(ENV_PORT) {
            self.gateway.port = p.parse().map_err(|_| ConfigError::InvalidPort(p))?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }
}

/// Validated Slack credentials. Secrets never appear in `Debug` output.
#[derive(Clone)]
pub struct SlackCredentials {
    pub app_token: Option<String>,
    pub bot_token: String,
    pub signing_secret: Option<String>,
}

impl fmt::Debug for SlackCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackCredentials")
            .field("app_token", &redacted(&self.app_token))
            .field("bot_token", &"<redacted>")
            .field("signing_secret", &redacted(&self.signing_secret))
            .finish()
    }
}

/// Process-wide settings, resolved once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub port: u16,
    pub socket_mode: bool,
    pub api_base_url: String,
    pub credentials: SlackCredentials,
    pub match_policy: MatchPolicy,
}

impl Settings {
    /// Validate a layered config. Socket mode needs an `xapp-` app token; HTTP mode needs a signing secret.
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        let slack = &config.slack;
        let clean = |v: &Option<String>| v.as_deref().and_then(non_empty);

        let bot_token = clean(&slack.bot_token).ok_or(ConfigError::MissingCredential(ENV_BOT_TOKEN))?;
        let app_token = clean(&slack.app_token);
        let signing_secret = clean(&slack.signing_secret);

        if slack.socket_mode {
            let token = app_token
                .as_deref()
                .ok_or(ConfigError::MissingCredential(ENV_APP_TOKEN))?;
            if !token.starts_with("xapp-") {
                return Err(ConfigError::InvalidAppToken);
            }
        } else if signing_secret.is_none() {
            return Err(ConfigError::MissingCredential(ENV_SIGNING_SECRET));
        }

        let api_base_url = clean(&slack.api_base_url)
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SLACK_API_BASE.to_string());

        Ok(Self {
            bind: non_empty(&config.gateway.bind).unwrap_or_else(default_gateway_bind),
            port: config.gateway.port,
            socket_mode: slack.socket_mode,
            api_base_url,
            credentials: SlackCredentials {
                app_token,
                bot_token,
                signing_secret,
            },
            match_policy: config.responder.match_policy,
        })
    }

    /// "socket" or "http", as reported by the health endpoint.
    pub fn mode_name(&self) -> &'static str {
        if self.socket_mode {
            "socket"
        } else {
            "http"
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PONGBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".pongbot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from `path` (or the default path). Missing file => default config.
/// Environment overrides are not applied here; see [`Config::apply_process_env`].
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
