//! CampusTrade Feed Engine Library
//!
//! This crate provides the real-time market data distribution engine for the
//! CampusTrade virtual trading platform: one resilient upstream feed
//! connection, a binary protocol decoder, a latest-tick cache, and WebSocket
//! fan-out to downstream consumers.

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod tick;

pub use broadcast::{Broadcaster, ConnectionId, PublishReport};
pub use cache::PriceCache;
pub use config::Config;
pub use credentials::{CredentialSource, FileCredentialSource, StaticCredentialSource};
pub use decoder::{decode_frame, QuoteUpdate};
pub use engine::FeedEngine;
pub use error::{FeedError, Result};
pub use feed::{Backoff, FeedManager};
pub use registry::SubscriptionRegistry;
pub use tick::{ClientRequest, ConnectionStatus, InstrumentKey, ServerMessage, Tick};
