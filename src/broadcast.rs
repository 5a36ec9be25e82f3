//! Fan-out broadcaster for downstream consumers
//!
//! Owns the active connection set. Delivery goes through bounded
//! per-connection queues with non-blocking sends; a connection that cannot
//! accept a message is pruned in the same pass and reported to the caller,
//! never letting one bad consumer hold up the rest.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::tick::{ConnectionStatus, ServerMessage, Tick};

/// Identifier handed out for each registered downstream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of one fan-out pass
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Connections the message was queued for
    pub delivered: usize,

    /// Connections pruned because their queue was full or closed
    pub pruned: Vec<ConnectionId>,
}

impl PublishReport {
    pub fn had_failures(&self) -> bool {
        !self.pruned.is_empty()
    }
}

#[derive(Debug)]
struct Downstream {
    id: ConnectionId,
    sender: mpsc::Sender<ServerMessage>,
}

/// Active downstream connection set with best-effort delivery
#[derive(Debug)]
pub struct Broadcaster {
    connections: Mutex<Vec<Downstream>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            // mpsc::channel panics on a zero capacity
            buffer: buffer.max(1),
        }
    }

    /// Register a downstream connection
    ///
    /// Returns the connection id and the receiving half its owner drains
    /// into the socket. No history is replayed; only messages published
    /// after registration arrive. Callers wanting current prices query the
    /// cache instead.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.lock().push(Downstream { id, sender: tx });
        (id, rx)
    }

    /// Drop a connection; ids already removed are a no-op
    pub fn unregister(&self, id: ConnectionId) {
        self.connections.lock().retain(|conn| conn.id != id);
    }

    /// Number of currently registered connections
    pub fn active(&self) -> usize {
        self.connections.lock().len()
    }

    /// Deliver a tick to every registered connection
    pub fn publish(&self, tick: Tick) -> PublishReport {
        self.send_to_all(ServerMessage::PriceUpdate {
            instrument_key: tick.instrument_key.clone(),
            data: tick,
        })
    }

    /// Deliver a connectivity status change to every registered connection
    pub fn publish_status(&self, status: ConnectionStatus, message: &str) -> PublishReport {
        self.send_to_all(ServerMessage::Status {
            status,
            message: message.to_string(),
        })
    }

    fn send_to_all(&self, message: ServerMessage) -> PublishReport {
        let mut report = PublishReport::default();
        let mut connections = self.connections.lock();

        connections.retain(|conn| match conn.sender.try_send(message.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(_) => {
                report.pruned.push(conn.id);
                false
            }
        });

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn tick(key: &str, last: rust_decimal::Decimal) -> Tick {
        Tick {
            instrument_key: key.to_string(),
            last_price: last,
            volume: 0,
            close_price: None,
            open_price: last,
            change_percent: dec!(0),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_publish_reaches_every_connection_in_order() {
        let broadcaster = Broadcaster::new(8);
        let (_id_a, mut rx_a) = broadcaster.register();
        let (_id_b, mut rx_b) = broadcaster.register();

        broadcaster.publish(tick("X", dec!(10)));
        broadcaster.publish(tick("X", dec!(11)));

        for rx in [&mut rx_a, &mut rx_b] {
            for expected in [dec!(10), dec!(11)] {
                match rx.try_recv().unwrap() {
                    ServerMessage::PriceUpdate { data, .. } => {
                        assert_eq!(data.last_price, expected)
                    }
                    other => panic!("Expected PriceUpdate, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_dead_connection_pruned_within_one_publish() {
        let broadcaster = Broadcaster::new(8);
        let (dead_id, rx_dead) = broadcaster.register();
        let (_live_id, mut rx_live) = broadcaster.register();
        drop(rx_dead);

        let report = broadcaster.publish(tick("X", dec!(10)));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec![dead_id]);
        assert!(report.had_failures());
        assert_eq!(broadcaster.active(), 1);

        // The live connection still got the message from the same pass
        assert!(rx_live.try_recv().is_ok());

        let report = broadcaster.publish(tick("X", dec!(11)));
        assert_eq!(report.delivered, 1);
        assert!(report.pruned.is_empty());
    }

    #[test]
    fn test_slow_connection_with_full_queue_pruned() {
        let broadcaster = Broadcaster::new(1);
        let (id, _rx) = broadcaster.register();

        assert_eq!(broadcaster.publish(tick("X", dec!(1))).delivered, 1);
        let report = broadcaster.publish(tick("X", dec!(2)));
        assert_eq!(report.pruned, vec![id]);
        assert_eq!(broadcaster.active(), 0);
    }

    #[test]
    fn test_zero_buffer_clamped_to_one() {
        let broadcaster = Broadcaster::new(0);
        let (_id, mut rx) = broadcaster.register();

        assert_eq!(broadcaster.publish(tick("X", dec!(1))).delivered, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let broadcaster = Broadcaster::new(8);
        let (id, _rx) = broadcaster.register();

        broadcaster.unregister(id);
        broadcaster.unregister(id);
        assert_eq!(broadcaster.active(), 0);
    }

    #[test]
    fn test_no_replay_for_late_registrations() {
        let broadcaster = Broadcaster::new(8);
        broadcaster.publish(tick("X", dec!(10)));

        let (_id, mut rx) = broadcaster.register();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_status_fanout() {
        let broadcaster = Broadcaster::new(8);
        let (_id, mut rx) = broadcaster.register();

        let report =
            broadcaster.publish_status(ConnectionStatus::Disconnected, "Market feed disconnected");
        assert_eq!(report.delivered, 1);

        match rx.try_recv().unwrap() {
            ServerMessage::Status { status, message } => {
                assert_eq!(status, ConnectionStatus::Disconnected);
                assert_eq!(message, "Market feed disconnected");
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }
}
