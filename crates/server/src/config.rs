use std::{
    collections::HashMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::Context;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bot_token: Option<String>,
    /// Overrides the username reported by `getMe`.
    pub bot_username: Option<String>,
    pub database_url: String,
    pub webhook: bool,
    pub public_url: Option<String>,
    pub listen_host: String,
    pub port: u16,
    pub telegram_api_url: String,
    pub poll_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_username: None,
            database_url: "sqlite://planner.db".into(),
            webhook: false,
            public_url: None,
            listen_host: "0.0.0.0".into(),
            port: 8443,
            telegram_api_url: "https://api.telegram.org".into(),
            poll_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingToken,
    #[error("webhook delivery requires a public url (RENDER_EXTERNAL_URL or APP__PUBLIC_URL)")]
    MissingPublicUrl,
    #[error("invalid public url '{url}': {reason}")]
    InvalidPublicUrl { url: String, reason: String },
    #[error("invalid listen address '{addr}'")]
    InvalidListenAddr { addr: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    Polling,
    Webhook { public_url: Url, listen: SocketAddr },
}

impl Settings {
    pub fn bot_token(&self) -> Result<&str, ConfigError> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingToken)
    }

    pub fn delivery_mode(&self) -> Result<DeliveryMode, ConfigError> {
        if !self.webhook {
            return Ok(DeliveryMode::Polling);
        }

        let raw_url = self
            .public_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingPublicUrl)?;
        let public_url = Url::parse(raw_url).map_err(|err| ConfigError::InvalidPublicUrl {
            url: raw_url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(public_url.scheme(), "https" | "http") {
            return Err(ConfigError::InvalidPublicUrl {
                url: raw_url.to_string(),
                reason: "scheme must be http or https".into(),
            });
        }

        let addr = format!("{}:{}", self.listen_host, self.port);
        let listen = addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidListenAddr { addr })?;

        Ok(DeliveryMode::Webhook { public_url, listen })
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    settings_from_sources(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then `server.toml` keys, then environment variables.
pub fn settings_from_sources(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) {
            let get = |key: &str| file_cfg.get(key).map(toml_value_to_string);
            if let Some(v) = get("bot_token") {
                settings.bot_token = Some(v);
            }
            if let Some(v) = get("bot_username") {
                settings.bot_username = Some(v);
            }
            if let Some(v) = get("database_url") {
                settings.database_url = v;
            }
            if let Some(v) = get("delivery") {
                settings.webhook = v.eq_ignore_ascii_case("webhook");
            }
            if let Some(v) = get("public_url") {
                settings.public_url = Some(v);
            }
            if let Some(v) = get("listen_host") {
                settings.listen_host = v;
            }
            if let Some(port) = get("port").and_then(|v| v.parse().ok()) {
                settings.port = port;
            }
            if let Some(v) = get("telegram_api_url") {
                settings.telegram_api_url = v;
            }
            if let Some(timeout) = get("poll_timeout_seconds").and_then(|v| v.parse().ok()) {
                settings.poll_timeout_seconds = timeout;
            }
        }
    }

    if let Some(v) = env("TELEGRAM_BOT_TOKEN") {
        settings.bot_token = Some(v);
    }
    if let Some(v) = env("APP__BOT_TOKEN") {
        settings.bot_token = Some(v);
    }

    if let Some(v) = env("APP__BOT_USERNAME") {
        settings.bot_username = Some(v);
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    // Render sets RENDER and RENDER_EXTERNAL_URL for web services.
    if env("RENDER").is_some() {
        settings.webhook = true;
    }
    if let Some(v) = env("APP__DELIVERY") {
        settings.webhook = v.eq_ignore_ascii_case("webhook");
    }

    if let Some(v) = env("RENDER_EXTERNAL_URL") {
        settings.public_url = Some(v);
    }
    if let Some(v) = env("APP__PUBLIC_URL") {
        settings.public_url = Some(v);
    }

    if let Some(v) = env("APP__LISTEN_HOST") {
        settings.listen_host = v;
    }
    if let Some(port) = env("PORT").and_then(|v| v.parse().ok()) {
        settings.port = port;
    }
    if let Some(port) = env("APP__PORT").and_then(|v| v.parse().ok()) {
        settings.port = port;
    }

    if let Some(v) = env("APP__TELEGRAM_API_URL") {
        settings.telegram_api_url = v;
    }
    if let Some(timeout) = env("APP__POLL_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
        settings.poll_timeout_seconds = timeout;
    }

    settings
}

fn toml_value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
