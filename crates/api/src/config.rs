use crate::auth::jwt::JwtConfig;
use crate::auth::service_key::ServiceKey;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Seconds between keep-alive pings on realtime sockets (default: `30`).
    pub ws_ping_interval_secs: u64,
    /// JWT token configuration for user callers.
    pub jwt: JwtConfig,
    /// Credential for the workflow engine. Service callers are rejected when unset.
    pub service_key: Option<ServiceKey>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `WS_PING_INTERVAL_SECS`| `30`                       |
    /// | `SERVICE_API_KEY`      | unset                      |
    ///
    /// See [`JwtConfig::from_env`] for the JWT variables.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let ws_ping_interval_secs: u64 = std::env::var("WS_PING_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .ok()
            .filter(|secs| *secs > 0)
            .expect("WS_PING_INTERVAL_SECS must be a positive u64");

        let jwt = JwtConfig::from_env();

        let service_key = std::env::var("SERVICE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|k| ServiceKey::new(k.trim()));
        if service_key.is_none() {
            tracing::warn!("SERVICE_API_KEY is not set; workflow engine callbacks will be rejected");
        }

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            ws_ping_interval_secs,
            jwt,
            service_key,
        }
    }
}
