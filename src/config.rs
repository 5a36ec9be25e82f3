//! Configuration module for the market data feed engine

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the downstream WebSocket/health server
    pub listen_addr: String,

    /// Feed authorization endpoint (bearer-token handshake)
    pub authorize_url: String,

    /// Static upstream access token; takes precedence over the token file
    pub access_token: Option<String>,

    /// Path to a file holding the upstream access token, re-read on every
    /// connection cycle
    pub token_file: String,

    /// Wait between credential lookups while no token is available
    pub credential_poll_secs: u64,

    /// Reconnection backoff for transient failures
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,

    /// Backoff after the upstream rejects our credentials
    pub auth_backoff_secs: u64,

    /// Upstream keep-alive settings
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,

    /// Per-downstream-connection outgoing queue capacity
    pub downstream_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            listen_addr: env::var("FEED_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            authorize_url: env::var("FEED_AUTHORIZE_URL").unwrap_or_else(|_| {
                "https://api.upstox.com/v3/feed/market-data-feed/authorize".to_string()
            }),
            access_token: env::var("FEED_ACCESS_TOKEN").ok(),
            token_file: env::var("FEED_TOKEN_FILE").unwrap_or_else(|_| ".feed-token".to_string()),
            credential_poll_secs: env::var("FEED_CREDENTIAL_POLL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            reconnect_base_ms: env::var("FEED_RECONNECT_BASE_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            reconnect_max_ms: env::var("FEED_RECONNECT_MAX_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30000),
            auth_backoff_secs: env::var("FEED_AUTH_BACKOFF_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            ping_interval_secs: env::var("FEED_PING_INTERVAL_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            pong_timeout_secs: env::var("FEED_PONG_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            downstream_buffer: env::var("FEED_DOWNSTREAM_BUFFER")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(256),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            authorize_url: "https://api.upstox.com/v3/feed/market-data-feed/authorize".to_string(),
            access_token: None,
            token_file: ".feed-token".to_string(),
            credential_poll_secs: 30,
            reconnect_base_ms: 1000,
            reconnect_max_ms: 30000,
            auth_backoff_secs: 60,
            ping_interval_secs: 20,
            pong_timeout_secs: 30,
            downstream_buffer: 256,
        }
    }
}
