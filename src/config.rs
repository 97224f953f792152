// src/config.rs
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::time::Duration;

pub const DEFAULT_STATE_FILE: &str = "subscriptions.json";
pub const DEFAULT_ENDPOINT: &str = "https://tiktok-analytics.app/api/rpc";
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Settings as they appear in `config.toml`. Every field is optional so the
/// bot can be configured from the environment alone.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfig {
    pub token: Option<String>,
    pub admin_id: Option<i64>,
    pub log_level: Option<String>,
    pub socks5_proxy: Option<String>,
    pub state_file: Option<String>,
    pub endpoint: Option<String>,
    pub timezone: Option<String>,
    pub interval_hours: Option<u64>,
    pub pause_ms: Option<u64>,
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    /// `None` means every caller is treated as admin.
    pub admin_id: Option<i64>,
    pub log_level: Option<String>,
    pub socks5_proxy: Option<String>,
    pub state_file: String,
    pub endpoint: String,
    pub timezone: String,
    pub interval: Duration,
    pub pause: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Read `path` if it exists, then apply environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let file = match fs::read_to_string(path) {
            Ok(s) => toml::from_str(&s)?,
            Err(e) if e.kind() == ErrorKind::NotFound => FileConfig::default(),
            Err(e) => return Err(Error::Config(format!("cannot read {}: {}", path, e))),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge file settings with values looked up through `env`.
    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let token = env("BOT_TOKEN")
            .or(file.token)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config("BOT_TOKEN is not set".into()))?;

        let admin_id = match env("ADMIN_ID") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| Error::Config(format!("ADMIN_ID is not a user id: {}", raw)))?,
            ),
            None => file.admin_id,
        };

        Ok(Config {
            token,
            admin_id,
            log_level: env("LOG_LEVEL").or(file.log_level),
            socks5_proxy: env("SOCKS5_PROXY").or(file.socks5_proxy),
            state_file: env("STATE_FILE")
                .or(file.state_file)
                .unwrap_or_else(|| DEFAULT_STATE_FILE.to_string()),
            endpoint: env("ANALYTICS_ENDPOINT")
                .or(file.endpoint)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timezone: env("ANALYTICS_TIMEZONE")
                .or(file.timezone)
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            interval: Duration::from_secs(file.interval_hours.unwrap_or(12).max(1) * 3600),
            pause: Duration::from_millis(file.pause_ms.unwrap_or(1500)),
            http_timeout: Duration::from_secs(file.http_timeout_secs.unwrap_or(30)),
        })
    }

    /// 获取日志级别（默认 "info"）
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_id.map_or(true, |admin| admin == user_id)
    }

    /// HTTP client shared by the bot and the fetcher, routed through the
    /// configured SOCKS5 proxy if any.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.http_timeout);
        if let Some(proxy) = &self.socks5_proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("bad socks5_proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))
    }
}
