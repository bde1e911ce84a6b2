//! Session configuration from the environment.
//!
//! The store endpoint and credential are both required for networked
//! mode. Anything missing, unparsable or left as a template placeholder
//! makes the session local-only.

use crate::error::{Error, Result};
use reqwest::Url;
use std::time::Duration;

pub const DEFAULT_FEED_TOPIC: &str = "memories";
pub const DEFAULT_PRESENCE_TOPIC: &str = "presence";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the node, always ending in `/`
    pub endpoint: Option<Url>,
    /// Bearer key presented to the node
    pub credential: Option<String>,
    pub feed_topic: String,
    pub presence_topic: String,
    /// Bound on each store call and connect attempt
    pub timeout: Duration,
    /// Presence heartbeat period
    pub heartbeat: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            credential: None,
            feed_topic: DEFAULT_FEED_TOPIC.to_string(),
            presence_topic: DEFAULT_PRESENCE_TOPIC.to_string(),
            timeout: DEFAULT_TIMEOUT,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

impl SessionConfig {
    /// Read the `RESONANCE_*` variables. Never fails; bad values fall back
    /// to defaults or to local-only.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let topic = |name: &str, default: String| {
            lookup(name)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or(default)
        };
        let millis = |name: &str, default: Duration, scale: u64| {
            lookup(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map(|v| Duration::from_millis(v.saturating_mul(scale)))
                .unwrap_or(default)
        };

        let config = Self {
            endpoint: lookup("RESONANCE_STORE_URL").as_deref().and_then(parse_endpoint),
            credential: lookup("RESONANCE_STORE_KEY").as_deref().and_then(parse_credential),
            feed_topic: topic("RESONANCE_FEED_TOPIC", defaults.feed_topic),
            presence_topic: topic("RESONANCE_PRESENCE_TOPIC", defaults.presence_topic),
            timeout: millis("RESONANCE_TIMEOUT_MS", defaults.timeout, 1),
            heartbeat: millis("RESONANCE_HEARTBEAT_SECS", defaults.heartbeat, 1000),
        };
        if config.is_local_only() {
            tracing::info!("No usable store endpoint and key; session is local-only");
        }
        config
    }

    /// Networked config for the given endpoint and key, other settings
    /// at their defaults.
    pub fn remote(url: &str, key: &str) -> Self {
        Self {
            endpoint: parse_endpoint(url),
            credential: parse_credential(key),
            ..Self::default()
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.endpoint.is_none() || self.credential.is_none()
    }

    /// HTTP URL of `path` under the endpoint.
    pub fn api_url(&self, path: &str) -> Result<Url> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| Error::Config("no store endpoint configured".into()))?;
        endpoint
            .join(path)
            .map_err(|e| Error::Config(format!("invalid path {:?}: {}", path, e)))
    }

    /// WebSocket URL of `path` under the endpoint.
    pub fn ws_url(&self, path: &str) -> Result<Url> {
        let mut url = self.api_url(path)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| Error::Config(format!("cannot use {} over WebSocket", url)))?;
        Ok(url)
    }
}

/// Template values shipped in sample env files.
fn is_placeholder(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    lower.is_empty()
        || lower.starts_with("your-")
        || lower.starts_with("your_")
        || lower.contains("changeme")
        || (lower.starts_with('<') && lower.ends_with('>'))
}

fn parse_endpoint(raw: &str) -> Option<Url> {
    if is_placeholder(raw) {
        return None;
    }
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    if host.starts_with("example.") || host.starts_with("your-") {
        return None;
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Some(url)
}

fn parse_credential(raw: &str) -> Option<String> {
    if is_placeholder(raw) {
        None
    } else {
        Some(raw.trim().to_string())
    }
}
