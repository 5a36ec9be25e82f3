//! Error types for the market data feed engine

use thiserror::Error;

/// Feed engine errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Upstream access token not available")]
    CredentialMissing,

    #[error("Feed authorization rejected: HTTP {status}")]
    AuthRejected { status: u16 },

    #[error("Feed authorization failed: {0}")]
    Authorization(String),

    #[error("WebSocket connection error: {0}")]
    Connection(String),

    #[error("Upstream stream ended")]
    StreamEnded,

    #[error("Upstream keep-alive timed out")]
    KeepaliveTimeout,

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Connection(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Authorization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for FeedError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
