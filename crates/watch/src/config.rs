use std::time::Duration;

use crate::feed::{BackoffConfig, FeedConfig};

/// Watcher configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Base URL of the curator API (default: `http://localhost:3000`).
    pub api_url: String,
    /// Realtime change feed endpoint. Derived from `api_url` when unset.
    pub ws_url: String,
    /// Bearer token identifying the watching user.
    pub token: String,
    pub poll_interval: Duration,
    pub subscribe_timeout: Duration,
}

/// Default interval between fallback polls.
const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Default time allowed for every source to acknowledge its subscription.
const DEFAULT_SUBSCRIBE_TIMEOUT_SECS: u64 = 10;

impl WatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Required | Default                          |
    /// |--------------------------|----------|----------------------------------|
    /// | `CURATOR_API_URL`        | no       | `http://localhost:3000`          |
    /// | `CURATOR_WS_URL`         | no       | `ws://<api host>/api/v1/ws`      |
    /// | `CURATOR_TOKEN`          | **yes**  | --                               |
    /// | `POLL_INTERVAL_MS`       | no       | `5000`                           |
    /// | `SUBSCRIBE_TIMEOUT_SECS` | no       | `10`                             |
    ///
    /// # Panics
    ///
    /// Panics if `CURATOR_TOKEN` is missing or a numeric variable does not
    /// parse.
    pub fn from_env() -> Self {
        let api_url = std::env::var("CURATOR_API_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();

        let ws_url = std::env::var("CURATOR_WS_URL").unwrap_or_else(|_| derive_ws_url(&api_url));

        let token = std::env::var("CURATOR_TOKEN").expect("CURATOR_TOKEN must be set");
        assert!(!token.trim().is_empty(), "CURATOR_TOKEN must not be empty");

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| DEFAULT_POLL_INTERVAL_MS.to_string())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let subscribe_timeout_secs: u64 = std::env::var("SUBSCRIBE_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_SUBSCRIBE_TIMEOUT_SECS.to_string())
            .parse()
            .expect("SUBSCRIBE_TIMEOUT_SECS must be a valid u64");

        Self {
            api_url,
            ws_url,
            token: token.trim().to_string(),
            poll_interval: Duration::from_millis(poll_interval_ms),
            subscribe_timeout: Duration::from_secs(subscribe_timeout_secs),
        }
    }

    /// Change feed settings; reconnect backoff uses the defaults.
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            poll_interval: self.poll_interval,
            reconnect: BackoffConfig::default(),
            subscribe_timeout: self.subscribe_timeout,
        }
    }
}

/// `http(s)://host` becomes `ws(s)://host/api/v1/ws`.
fn derive_ws_url(api_url: &str) -> String {
    let base = if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    };
    format!("{base}/api/v1/ws")
}
