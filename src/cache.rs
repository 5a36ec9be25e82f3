//! Latest-tick cache
//!
//! Holds the most recent tick per instrument. Written from the upstream
//! read loop, read by broadcast fan-out and by collaborators needing a
//! point-in-time price.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::decoder::QuoteUpdate;
use crate::tick::{InstrumentKey, Tick};

/// Latest known tick per instrument
///
/// All operations are in-memory and never suspend, so a slow downstream
/// consumer cannot stall ingestion through this type.
#[derive(Debug, Default)]
pub struct PriceCache {
    ticks: RwLock<HashMap<InstrumentKey, Tick>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self {
            ticks: RwLock::new(HashMap::new()),
        }
    }

    /// Fold a decoded quote into the cache, returning the stored tick
    ///
    /// The first price seen for an instrument becomes its session open
    /// price and stays fixed until process restart; reconnects do not
    /// reset it. Change percent is computed against the close price when
    /// the feed supplied one, otherwise against the session open.
    pub fn apply(&self, update: QuoteUpdate) -> Tick {
        let mut ticks = self.ticks.write();

        let open_price = ticks
            .get(&update.instrument_key)
            .map(|tick| tick.open_price)
            .unwrap_or(update.last_price);

        let change = change_percent(update.last_price, update.close_price, open_price);
        let tick = Tick {
            instrument_key: update.instrument_key.clone(),
            last_price: update.last_price,
            volume: update.volume,
            close_price: update.close_price,
            open_price,
            change_percent: change,
            timestamp: Utc::now(),
        };

        ticks.insert(update.instrument_key, tick.clone());
        tick
    }

    /// Latest tick for one instrument
    pub fn latest(&self, key: &str) -> Option<Tick> {
        self.ticks.read().get(key).cloned()
    }

    /// Latest ticks for a set of instruments; keys never seen are omitted
    pub fn latest_many(&self, keys: &[InstrumentKey]) -> HashMap<InstrumentKey, Tick> {
        let ticks = self.ticks.read();
        keys.iter()
            .filter_map(|key| ticks.get(key).map(|tick| (key.clone(), tick.clone())))
            .collect()
    }

    /// Number of instruments with a cached tick
    pub fn len(&self) -> usize {
        self.ticks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.read().is_empty()
    }
}

/// Percent change of `last` against the close price, falling back to the
/// session open when no usable close is available
///
/// A zero baseline, or a ratio too extreme for the decimal range, yields
/// zero instead of panicking mid-ingest.
fn change_percent(last: Decimal, close: Option<Decimal>, open: Decimal) -> Decimal {
    let base = close.filter(|price| !price.is_zero()).unwrap_or(open);
    if base.is_zero() {
        return Decimal::ZERO;
    }
    last.checked_sub(base)
        .and_then(|delta| delta.checked_div(base))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}
