//! Engine facade
//!
//! One process-wide instance wiring the subscription registry, the price
//! cache, and the broadcaster together. The serving surface and the
//! upstream feed task share it behind an `Arc`; nothing here ever
//! suspends, so callers may hold it from any task.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broadcast::{Broadcaster, ConnectionId, PublishReport};
use crate::cache::PriceCache;
use crate::config::Config;
use crate::credentials::CredentialSource;
use crate::decoder::QuoteUpdate;
use crate::feed::FeedManager;
use crate::metrics;
use crate::registry::SubscriptionRegistry;
use crate::tick::{ConnectionStatus, InstrumentKey, ServerMessage, Tick};

/// Shared feed engine state
pub struct FeedEngine {
    registry: SubscriptionRegistry,
    cache: PriceCache,
    broadcaster: Broadcaster,
    status: RwLock<ConnectionStatus>,
    push_tx: mpsc::UnboundedSender<Vec<InstrumentKey>>,
}

impl FeedEngine {
    /// Build the engine and the feed task that drives it
    ///
    /// The manager owns the receiving end of the incremental-push channel;
    /// run it as its own task alongside the serving surface.
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialSource>,
    ) -> (Arc<FeedEngine>, FeedManager) {
        let (push_tx, push_rx) = mpsc::unbounded_channel();

        let engine = Arc::new(FeedEngine {
            registry: SubscriptionRegistry::new(),
            cache: PriceCache::new(),
            broadcaster: Broadcaster::new(config.downstream_buffer),
            status: RwLock::new(ConnectionStatus::Connecting),
            push_tx,
        });

        let manager = FeedManager::new(config, credentials, engine.clone(), push_rx);
        (engine, manager)
    }

    /// Track instruments, returning the subset that was newly added
    ///
    /// Newly added keys are pushed upstream immediately when the session
    /// is streaming; otherwise the next successful connect re-sends the
    /// full set anyway. Registry mutation never waits on the network.
    pub fn subscribe(&self, keys: &[InstrumentKey]) -> Vec<InstrumentKey> {
        let added = self.registry.subscribe(keys);
        if !added.is_empty() && self.status() == ConnectionStatus::Connected {
            if self.push_tx.send(added.clone()).is_err() {
                debug!("Feed task gone, subscription push skipped");
            }
        }
        added
    }

    /// Stop tracking instruments
    ///
    /// No upstream notification is sent; unwanted ticks keep arriving and
    /// are simply no longer of interest.
    pub fn unsubscribe(&self, keys: &[InstrumentKey]) {
        self.registry.unsubscribe(keys);
    }

    /// Point-in-time snapshot of the subscription set
    pub fn subscriptions(&self) -> Vec<InstrumentKey> {
        self.registry.snapshot()
    }

    /// Latest cached tick for one instrument
    pub fn latest(&self, key: &str) -> Option<Tick> {
        self.cache.latest(key)
    }

    /// Latest cached ticks for a set of instruments
    pub fn latest_many(&self, keys: &[InstrumentKey]) -> HashMap<InstrumentKey, Tick> {
        self.cache.latest_many(keys)
    }

    /// Current upstream connectivity
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    /// Number of registered downstream connections
    pub fn active_connections(&self) -> usize {
        self.broadcaster.active()
    }

    /// Number of instruments with a cached tick
    pub fn cached_instruments(&self) -> usize {
        self.cache.len()
    }

    /// Register a downstream connection, receiving its outgoing queue
    pub fn register_connection(&self) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let registered = self.broadcaster.register();
        metrics::set_active_connections(self.broadcaster.active());
        registered
    }

    /// Remove a downstream connection; safe to call more than once
    pub fn unregister_connection(&self, id: ConnectionId) {
        self.broadcaster.unregister(id);
        metrics::set_active_connections(self.broadcaster.active());
    }

    /// Fold a decoded quote into the cache and fan the tick out
    ///
    /// Cache write and publish happen back to back on the caller's task,
    /// so no consumer can observe a tick that is not yet cached.
    pub(crate) fn ingest(&self, update: QuoteUpdate) {
        let tick = self.cache.apply(update);
        let report = self.broadcaster.publish(tick);
        self.note_fanout(report);
    }

    /// Record a connectivity change and broadcast it downstream
    pub(crate) fn transition(&self, status: ConnectionStatus, message: &str) {
        *self.status.write() = status;
        metrics::set_upstream_connected(status == ConnectionStatus::Connected);

        let report = self.broadcaster.publish_status(status, message);
        self.note_fanout(report);
    }

    fn note_fanout(&self, report: PublishReport) {
        metrics::add_messages_delivered(report.delivered);
        if report.had_failures() {
            metrics::add_connections_pruned(report.pruned.len());
            metrics::set_active_connections(self.broadcaster.active());
            warn!(
                pruned = ?report.pruned,
                delivered = report.delivered,
                "Dropped downstream connections that failed to receive"
            );
        }
    }
}
