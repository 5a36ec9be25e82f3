//! Upstream feed session management

mod backoff;
mod manager;
mod session;

pub use backoff::Backoff;
pub use manager::FeedManager;
pub use session::{authorize, SubscriptionData, SubscriptionRequest, FEED_GUID, FEED_MODE};
