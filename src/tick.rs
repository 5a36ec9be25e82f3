//! Core data types for the feed engine
//!
//! Normalized ticks, upstream connectivity status, and the JSON messages
//! exchanged with downstream consumers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque identifier for a tradable instrument
pub type InstrumentKey = String;

/// One normalized price update for an instrument
///
/// Immutable once constructed; the cache replaces the whole value on the
/// next update for the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument this tick belongs to
    pub instrument_key: InstrumentKey,

    /// Last traded price
    pub last_price: Decimal,

    /// Last traded quantity, 0 when the feed omits it
    pub volume: u64,

    /// Prior session's closing price, when the feed supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_price: Option<Decimal>,

    /// First price observed for this instrument since process start
    pub open_price: Decimal,

    /// Percent change against the close price, or the open price when no
    /// close price is known
    pub change_percent: Decimal,

    /// When this tick was decoded (UTC)
    pub timestamp: DateTime<Utc>,
}

/// Upstream feed connectivity, broadcast to downstream consumers on change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    AuthError,
}

/// Message pushed to downstream consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    PriceUpdate {
        instrument_key: InstrumentKey,
        data: Tick,
    },
    Status {
        status: ConnectionStatus,
        message: String,
    },
}

/// Request sent by a downstream consumer over its WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
    Subscribe { instruments: Vec<InstrumentKey> },
    Unsubscribe { instruments: Vec<InstrumentKey> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_message_shape() {
        let msg = ServerMessage::Status {
            status: ConnectionStatus::Connected,
            message: "Connected to upstream market feed".to_string(),
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["status"], "connected");
        assert_eq!(value["message"], "Connected to upstream market feed");
    }

    #[test]
    fn test_price_update_shape() {
        let tick = Tick {
            instrument_key: "NSE_EQ|INE002A01018".to_string(),
            last_price: dec!(2450.50),
            volume: 1200,
            close_price: None,
            open_price: dec!(2440.00),
            change_percent: dec!(0.43),
            timestamp: Utc::now(),
        };
        let msg = ServerMessage::PriceUpdate {
            instrument_key: tick.instrument_key.clone(),
            data: tick,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "price_update");
        assert_eq!(value["instrument_key"], "NSE_EQ|INE002A01018");
        assert_eq!(value["data"]["last_price"], "2450.50");
        // Absent close price is omitted entirely, not serialized as null
        assert!(value["data"].get("close_price").is_none());
    }

    #[test]
    fn test_parse_client_request() {
        let raw = r#"{"action": "subscribe", "instruments": ["NSE_EQ|A", "NSE_EQ|B"]}"#;

        let req: ClientRequest = serde_json::from_str(raw).unwrap();
        if let ClientRequest::Subscribe { instruments } = req {
            assert_eq!(instruments, vec!["NSE_EQ|A", "NSE_EQ|B"]);
        } else {
            panic!("Expected Subscribe");
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let raw = r#"{"action": "replay", "instruments": []}"#;
        assert!(serde_json::from_str::<ClientRequest>(raw).is_err());
    }
}
