//! Upstream session handshake and control frames
//!
//! The feed authorizes over REST with a bearer token, receives a one-shot
//! session endpoint, and speaks JSON control frames on the WebSocket it
//! then opens.

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, Result};
use crate::tick::InstrumentKey;

/// Client id sent with every subscription frame
pub const FEED_GUID: &str = "campus-trade-feed";

/// Subscription mode requested from the upstream
pub const FEED_MODE: &str = "full";

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    data: AuthorizeData,
}

#[derive(Debug, Deserialize)]
struct AuthorizeData {
    authorized_redirect_uri: String,
}

/// Exchange the bearer token for a single-use session endpoint
///
/// A 401 or 403 is a structural rejection the caller backs off longer on;
/// every other failure is transient.
pub async fn authorize(client: &reqwest::Client, url: &str, token: &str) -> Result<String> {
    let response = client.get(url).bearer_auth(token).send().await?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FeedError::AuthRejected {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(FeedError::Authorization(format!(
            "unexpected status {status}"
        )));
    }

    let body: AuthorizeResponse = response.json().await?;
    Ok(body.data.authorized_redirect_uri)
}

/// JSON control frame subscribing a set of instruments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub guid: String,
    pub method: String,
    pub data: SubscriptionData,
}

/// Payload of a subscription frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionData {
    pub mode: String,

    #[serde(rename = "instrumentKeys")]
    pub instrument_keys: Vec<InstrumentKey>,
}

impl SubscriptionRequest {
    /// Frame subscribing `instrument_keys` in the configured feed mode
    pub fn subscribe(instrument_keys: Vec<InstrumentKey>) -> Self {
        Self {
            guid: FEED_GUID.to_string(),
            method: "sub".to_string(),
            data: SubscriptionData {
                mode: FEED_MODE.to_string(),
                instrument_keys,
            },
        }
    }

    /// Serialize for the wire
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
