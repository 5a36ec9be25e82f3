//! Upstream feed manager
//!
//! Owns the single upstream connection for the life of the process:
//! credential lookup, authorization handshake, the streaming read loop,
//! and the backoff between attempts. Every failure is retried; the only
//! way out is the shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::credentials::CredentialSource;
use crate::decoder;
use crate::engine::FeedEngine;
use crate::error::{FeedError, Result};
use crate::metrics;
use crate::tick::{ConnectionStatus, InstrumentKey};

use super::backoff::Backoff;
use super::session::{self, SubscriptionRequest};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Status message broadcast on successful connection
const CONNECTED_MESSAGE: &str = "Connected to upstream market feed";

/// Status message broadcast when the feed drops
const DISCONNECTED_MESSAGE: &str = "Market feed disconnected - retrying";

/// Status message broadcast when the upstream rejects our credentials
const AUTH_ERROR_MESSAGE: &str = "Upstream authorization rejected - waiting for new credentials";

/// Drives the upstream connection with automatic reconnection
pub struct FeedManager {
    config: Config,
    credentials: Arc<dyn CredentialSource>,
    engine: Arc<FeedEngine>,
    push_rx: mpsc::UnboundedReceiver<Vec<InstrumentKey>>,
    http: reqwest::Client,
    transient: Backoff,
}

impl FeedManager {
    pub(crate) fn new(
        config: Config,
        credentials: Arc<dyn CredentialSource>,
        engine: Arc<FeedEngine>,
        push_rx: mpsc::UnboundedReceiver<Vec<InstrumentKey>>,
    ) -> Self {
        let transient = Backoff::exponential(
            Duration::from_millis(config.reconnect_base_ms),
            Duration::from_millis(config.reconnect_max_ms),
        );

        Self {
            config,
            credentials,
            engine,
            push_rx,
            http: reqwest::Client::new(),
            transient,
        }
    }

    /// Run until the shutdown signal fires, retrying every failure
    ///
    /// A missing credential polls on a fixed interval, an authorization
    /// rejection backs off long with an `auth_error` broadcast, and any
    /// other failure backs off exponentially with a `disconnected`
    /// broadcast.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting upstream feed manager with infinite retry");
        let mut first_attempt = true;

        loop {
            if !first_attempt {
                metrics::inc_reconnects();
            }
            first_attempt = false;

            let wait = match self.connect_and_stream(&mut shutdown).await {
                Ok(()) => {
                    info!("Feed manager stopped by shutdown signal");
                    return;
                }
                Err(FeedError::CredentialMissing) => {
                    warn!("Upstream access token not available, waiting");
                    Duration::from_secs(self.config.credential_poll_secs)
                }
                Err(FeedError::AuthRejected { status }) => {
                    error!(status, "Upstream rejected feed authorization");
                    self.engine
                        .transition(ConnectionStatus::AuthError, AUTH_ERROR_MESSAGE);
                    Duration::from_secs(self.config.auth_backoff_secs)
                }
                Err(e) => {
                    error!(error = %e, "Upstream feed error");
                    self.engine
                        .transition(ConnectionStatus::Disconnected, DISCONNECTED_MESSAGE);
                    let delay = self.transient.next();
                    warn!(delay_ms = delay.as_millis() as u64, "Reconnecting after error...");
                    delay
                }
            };

            if !self.pause(wait, &mut shutdown).await {
                info!("Feed manager stopped by shutdown signal");
                return;
            }
        }
    }

    /// Sleep for `delay` unless shutdown fires first; false means stop
    async fn pause(&self, delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = sleep(delay) => true,
            _ = shutdown.recv() => false,
        }
    }

    /// One full session: credential, handshake, subscribe, stream
    ///
    /// Returns `Ok(())` only when shut down; every other exit is an error
    /// classified by the caller.
    async fn connect_and_stream(&mut self, shutdown: &mut broadcast::Receiver<()>) -> Result<()> {
        let token = self
            .credentials
            .bearer_token()
            .ok_or(FeedError::CredentialMissing)?;

        info!("Authorizing upstream market feed");
        let handshake = async {
            let session_url =
                session::authorize(&self.http, &self.config.authorize_url, &token).await?;
            info!(url = %session_url, "Connecting to upstream feed");
            let (ws, response) = connect_async(&session_url).await?;
            Ok::<_, FeedError>((ws, response))
        };
        let (ws, response) = tokio::select! {
            connected = handshake => connected?,
            _ = shutdown.recv() => return Ok(()),
        };
        info!(status = ?response.status(), "Upstream feed connected");

        let (mut sink, mut stream) = ws.split();

        self.engine
            .transition(ConnectionStatus::Connected, CONNECTED_MESSAGE);
        self.transient.reset();

        // Pushes queued while disconnected are superseded by the full-set
        // snapshot sent below; drain them before reading the snapshot so a
        // concurrent subscribe cannot fall through the gap.
        while self.push_rx.try_recv().is_ok() {}
        self.push_subscription(&mut sink, self.engine.subscriptions())
            .await?;

        let mut ping_timer = interval(Duration::from_secs(self.config.ping_interval_secs));
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let pong_timeout = Duration::from_secs(self.config.pong_timeout_secs);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Closing upstream connection");
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                pushed = self.push_rx.recv() => {
                    if let Some(keys) = pushed {
                        self.push_subscription(&mut sink, keys).await?;
                    }
                }
                frame = stream.next() => {
                    last_inbound = Instant::now();
                    match frame {
                        Some(Ok(Message::Binary(raw))) => self.handle_frame(&raw),
                        Some(Ok(Message::Text(text))) => {
                            debug!(len = text.len(), "Ignoring upstream text frame");
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            warn!(frame = ?frame, "Upstream sent close frame");
                            return Err(FeedError::StreamEnded);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(FeedError::StreamEnded),
                    }
                }
                _ = ping_timer.tick() => {
                    if last_inbound.elapsed() > pong_timeout {
                        warn!(
                            idle_secs = last_inbound.elapsed().as_secs(),
                            "Upstream went silent past the pong timeout"
                        );
                        return Err(FeedError::KeepaliveTimeout);
                    }
                    sink.send(Message::Ping(Vec::new())).await?;
                }
            }
        }
    }

    /// Send one subscription frame; an empty set is a no-op
    async fn push_subscription(&self, sink: &mut WsSink, keys: Vec<InstrumentKey>) -> Result<()> {
        if keys.is_empty() {
            debug!("Subscription set empty, nothing to push");
            return Ok(());
        }

        let count = keys.len();
        let frame = SubscriptionRequest::subscribe(keys).to_frame()?;
        sink.send(Message::Text(frame)).await?;
        info!(instruments = count, "Pushed subscription to upstream");
        Ok(())
    }

    /// Decode one binary frame and feed the results through the engine
    ///
    /// Decode failures are logged and dropped here; they never reach the
    /// read loop.
    fn handle_frame(&self, raw: &[u8]) {
        match decoder::decode_frame(raw) {
            Ok(updates) => {
                metrics::add_ticks_decoded(updates.len());
                for update in updates {
                    self.engine.ingest(update);
                }
            }
            Err(e) => {
                warn!(error = %e, len = raw.len(), "Dropping undecodable frame");
                metrics::inc_frames_dropped();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn try_recv_push(&mut self) -> Option<Vec<InstrumentKey>> {
        self.push_rx.try_recv().ok()
    }
}
