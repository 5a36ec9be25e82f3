//! Downstream serving surface
//!
//! axum router exposing the consumer WebSocket plus health and metrics
//! endpoints, all sharing one engine instance.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::engine::FeedEngine;
use crate::metrics;
use crate::tick::ClientRequest;

/// Build the downstream router around one shared engine
pub fn router(engine: Arc<FeedEngine>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(engine): State<Arc<FeedEngine>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, engine))
}

/// Serve one downstream consumer until either side closes
///
/// Inbound text frames carry subscribe/unsubscribe requests; everything
/// the broadcaster queues for this connection flows back out as JSON text.
/// The connection is unregistered on every exit path.
async fn handle_socket(mut socket: WebSocket, engine: Arc<FeedEngine>) {
    let (id, mut rx) = engine.register_connection();
    info!(connection = %id, "Downstream consumer connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                // The channel closes when the broadcaster prunes us.
                let Some(message) = outbound else { break };
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize outbound message"),
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => handle_request(&engine, &text),
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/Pong are answered by the protocol layer.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(connection = %id, error = %e, "Downstream socket error");
                        break;
                    }
                }
            }
        }
    }

    engine.unregister_connection(id);
    info!(connection = %id, "Downstream consumer disconnected");
}

/// Apply one inbound consumer request; unparseable input is ignored
fn handle_request(engine: &FeedEngine, text: &str) {
    match serde_json::from_str::<ClientRequest>(text) {
        Ok(ClientRequest::Subscribe { instruments }) => {
            let added = engine.subscribe(&instruments);
            debug!(
                requested = instruments.len(),
                added = added.len(),
                "Subscribe request"
            );
        }
        Ok(ClientRequest::Unsubscribe { instruments }) => {
            engine.unsubscribe(&instruments);
            debug!(removed = instruments.len(), "Unsubscribe request");
        }
        Err(e) => warn!(error = %e, "Ignoring unparseable consumer request"),
    }
}

async fn health_handler(State(engine): State<Arc<FeedEngine>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "feed": engine.status(),
        "active_connections": engine.active_connections(),
        "cached_instruments": engine.cached_instruments(),
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::credentials::StaticCredentialSource;
    use crate::engine::FeedEngine;

    #[tokio::test]
    async fn test_router_builds_with_engine_state() {
        let credentials = Arc::new(StaticCredentialSource::new("token"));
        let (engine, _manager) = FeedEngine::new(Config::default(), credentials);
        let _app = router(engine);
    }

    #[test]
    fn test_subscribe_request_parses() {
        let raw = r#"{"action":"subscribe","instruments":["NSE_EQ|INE002A01018"]}"#;
        match serde_json::from_str::<ClientRequest>(raw) {
            Ok(ClientRequest::Subscribe { instruments }) => {
                assert_eq!(instruments, vec!["NSE_EQ|INE002A01018".to_string()]);
            }
            other => panic!("Expected subscribe request, got {:?}", other),
        }
    }
}
