//! Decoder for upstream binary feed frames
//!
//! Each frame is a MessagePack envelope carrying a map of instrument key to
//! per-instrument record. Records are polymorphic over the subscription
//! mode; the decoder extracts the same uniform quote from every variant.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::Result;
use crate::tick::InstrumentKey;

/// Envelope wrapping one batch of per-instrument records
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEnvelope {
    /// Frame kind, e.g. "live_feed"; heartbeats carry no feeds map
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Upstream send time in epoch milliseconds
    #[serde(default)]
    pub ts: Option<i64>,

    /// Per-instrument payload
    #[serde(default)]
    pub feeds: HashMap<InstrumentKey, FeedRecord>,
}

/// Per-instrument record, tagged by subscription mode
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FeedRecord {
    Ltpc(LtpcQuote),
    Full(FullQuote),
}

/// Compact last-traded-price record
#[derive(Debug, Clone, Deserialize)]
pub struct LtpcQuote {
    /// Last traded price
    #[serde(default)]
    pub ltp: Option<Decimal>,

    /// Last traded quantity
    #[serde(default)]
    pub ltq: Option<u64>,

    /// Prior session's close price
    #[serde(default)]
    pub cp: Option<Decimal>,
}

/// Full-mode record: flat summary fields plus an optional nested quote
#[derive(Debug, Clone, Deserialize)]
pub struct FullQuote {
    #[serde(default)]
    pub ltp: Option<Decimal>,

    #[serde(default)]
    pub vol: Option<u64>,

    #[serde(default)]
    pub cp: Option<Decimal>,

    /// Nested quote block; its fields win over the flat ones when present
    #[serde(default)]
    pub quote: Option<MarketQuote>,
}

/// Nested quote block inside a full-mode record
#[derive(Debug, Clone, Deserialize)]
pub struct MarketQuote {
    #[serde(default)]
    pub ltp: Option<Decimal>,

    #[serde(default)]
    pub vol: Option<u64>,

    #[serde(default)]
    pub cp: Option<Decimal>,
}

/// Uniform quote extracted from any record variant
#[derive(Debug, Clone)]
pub struct QuoteUpdate {
    pub instrument_key: InstrumentKey,
    pub last_price: Decimal,
    pub volume: u64,
    pub close_price: Option<Decimal>,
}

impl FeedRecord {
    /// Extract last price, volume, and close price from either variant
    ///
    /// Returns `None` when the record carries no usable last price, as
    /// partial and heartbeat records are expected.
    fn into_update(self, instrument_key: InstrumentKey) -> Option<QuoteUpdate> {
        let (last_price, volume, close_price) = match self {
            FeedRecord::Ltpc(q) => (q.ltp, q.ltq, q.cp),
            FeedRecord::Full(q) => match q.quote {
                Some(nested) => (
                    nested.ltp.or(q.ltp),
                    nested.vol.or(q.vol),
                    nested.cp.or(q.cp),
                ),
                None => (q.ltp, q.vol, q.cp),
            },
        };

        Some(QuoteUpdate {
            instrument_key,
            last_price: last_price?,
            volume: volume.unwrap_or(0),
            close_price,
        })
    }
}

/// Decode one binary frame into zero or more quote updates
///
/// Records without a last price are skipped silently. An unparseable frame
/// is an error for the caller to log and drop; it never carries further.
pub fn decode_frame(raw: &[u8]) -> Result<Vec<QuoteUpdate>> {
    let envelope: FeedEnvelope = rmp_serde::from_slice(raw)?;

    Ok(envelope
        .feeds
        .into_iter()
        .filter_map(|(key, record)| record.into_update(key))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn frame(value: serde_json::Value) -> Vec<u8> {
        rmp_serde::to_vec(&value).unwrap()
    }

    #[test]
    fn test_decode_ltpc_record() {
        let raw = frame(json!({
            "type": "live_feed",
            "ts": 1672531200000i64,
            "feeds": {
                "NSE_EQ|INE002A01018": {
                    "mode": "ltpc",
                    "ltp": "2450.50",
                    "ltq": 25,
                    "cp": "2440.00"
                }
            }
        }));

        let updates = decode_frame(&raw).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].instrument_key, "NSE_EQ|INE002A01018");
        assert_eq!(updates[0].last_price, dec!(2450.50));
        assert_eq!(updates[0].volume, 25);
        assert_eq!(updates[0].close_price, Some(dec!(2440.00)));
    }

    #[test]
    fn test_full_record_nested_quote_wins() {
        let raw = frame(json!({
            "type": "live_feed",
            "feeds": {
                "NSE_EQ|X": {
                    "mode": "full",
                    "ltp": "99.00",
                    "vol": 10,
                    "cp": "95.00",
                    "quote": { "ltp": "101.50", "vol": 42 }
                }
            }
        }));

        let updates = decode_frame(&raw).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].last_price, dec!(101.50));
        assert_eq!(updates[0].volume, 42);
        // Close price falls through to the flat field
        assert_eq!(updates[0].close_price, Some(dec!(95.00)));
    }

    #[test]
    fn test_full_record_flat_fields() {
        let raw = frame(json!({
            "type": "live_feed",
            "feeds": {
                "NSE_EQ|X": { "mode": "full", "ltp": "99.00", "vol": 10 }
            }
        }));

        let updates = decode_frame(&raw).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].last_price, dec!(99.00));
        assert_eq!(updates[0].volume, 10);
        assert_eq!(updates[0].close_price, None);
    }

    #[test]
    fn test_missing_last_price_skipped() {
        let raw = frame(json!({
            "type": "live_feed",
            "feeds": {
                "NSE_EQ|X": { "mode": "ltpc", "cp": "95.00" }
            }
        }));

        let updates = decode_frame(&raw).unwrap();
        assert!(updates.is_empty());
    }

    #[test]
    fn test_mixed_batch_keeps_valid_records() {
        let raw = frame(json!({
            "type": "live_feed",
            "feeds": {
                "NSE_EQ|A": { "mode": "ltpc", "ltp": "10.00" },
                "NSE_EQ|B": { "mode": "ltpc", "cp": "5.00" }
            }
        }));

        let updates = decode_frame(&raw).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].instrument_key, "NSE_EQ|A");
        assert_eq!(updates[0].volume, 0);
    }

    #[test]
    fn test_heartbeat_without_feeds() {
        let raw = frame(json!({ "type": "keepalive" }));

        let updates = decode_frame(&raw).unwrap();
        assert!(updates.is_empty());
    }

    #[test]
    fn test_unknown_mode_is_an_error() {
        let raw = frame(json!({
            "feeds": {
                "NSE_EQ|X": { "mode": "oi", "ltp": "10.00" }
            }
        }));

        assert!(decode_frame(&raw).is_err());
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(decode_frame(&[0x01, 0x02, 0x03]).is_err());
    }
}
