//! WebSocket transport server using Axum.
//!
//! Handles HTTP upgrade to WebSocket, connection identity, heartbeat pings,
//! and the hand-off of inbound frames and lifecycle events to the routing
//! core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::{
    Router as HttpRouter,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use courier_core::RoutingCore;
use courier_protocol::{DisconnectCause, Events, OutboundEnvelope};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::senders::SenderTable;

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable permissive CORS on the HTTP surface
    pub enable_cors: bool,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Interval between server pings
    pub ping_interval: Duration,
    /// Grace period after a ping before the peer counts as gone
    pub ping_timeout: Duration,
    /// Enable verbose frame logging
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 6555,
            hostname: "127.0.0.1".into(),
            enable_cors: false,
            max_connections: Some(256),
            ping_interval: Duration::from_millis(10_000),
            ping_timeout: Duration::from_millis(5_000),
            verbose_logging: false,
        }
    }
}

/// Shared state for the transport server.
struct AppState {
    core: Arc<RoutingCore>,
    senders: SenderTable,
    config: TransportConfig,
    /// Connected client count (upgrade limit + logging)
    client_count: Arc<AtomicUsize>,
    /// Fan-in signal telling every connection task to close
    shutdown_tx: broadcast::Sender<()>,
}

/// The transport server — owns the listener and the per-connection tasks.
pub struct TransportServer {
    senders: SenderTable,
    shutdown_tx: broadcast::Sender<()>,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
    client_count: Arc<AtomicUsize>,
    port: u16,
}

impl TransportServer {
    /// Start the transport server over the given routing core.
    ///
    /// `senders` must be the same table the core's router delivers through.
    pub async fn start(
        config: TransportConfig,
        core: Arc<RoutingCore>,
        senders: SenderTable,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        let client_count = Arc::new(AtomicUsize::new(0));

        let state = Arc::new(AppState {
            core,
            senders: senders.clone(),
            config: config.clone(),
            client_count: client_count.clone(),
            shutdown_tx: shutdown_tx.clone(),
        });

        let mut app = HttpRouter::new()
            .route("/ws", get(ws_upgrade_handler))
            .route("/health", get(health_handler))
            .with_state(state);
        if config.enable_cors {
            app = app.layer(tower_http::cors::CorsLayer::permissive());
        }

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!(
            "courier transport listening on ws://{}:{}/ws",
            config.hostname, actual_port
        );

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            senders,
            shutdown_tx,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            client_count,
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Currently connected clients.
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Force-close one connection from the server side. Its task observes
    /// the detached queue and tears down with a forced-disconnect cause.
    pub fn disconnect(&self, id: &str) {
        self.senders.remove(id);
    }

    /// Gracefully stop the server: every connection task tears down with a
    /// shutdown cause, then the listener closes.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("courier transport stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if let Some(max) = state.config.max_connections {
        let current = state.client_count.load(Ordering::Relaxed);
        if current >= max {
            warn!("connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.core.registry.connection_count(),
        "rooms": state.core.rooms.room_count(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    state.client_count.fetch_add(1, Ordering::Relaxed);

    let id = uuid::Uuid::new_v4().to_string();
    if let Err(e) = state.core.registry.register(&id) {
        // Unreachable with uuid identifiers; checked anyway.
        warn!(connection = %id, error = %e, "failed to register connection");
        state.client_count.fetch_sub(1, Ordering::Relaxed);
        return;
    }
    info!("client connected: {id}");

    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    state.senders.insert(&id, out_tx);

    let cause = connection_loop(socket, &id, &state, out_rx).await;

    // The queue detaches first so nothing new is enqueued, then the core
    // evicts the connection from its rooms and notifies the remainers.
    state.senders.remove(&id);
    state.core.lifecycle.handle_disconnect(&id, cause);

    state.client_count.fetch_sub(1, Ordering::Relaxed);
    info!(
        "client disconnected: {id} (total: {})",
        state.client_count.load(Ordering::Relaxed)
    );
}

/// Run one connection until it terminates, returning the classified cause.
///
/// Inbound frames are processed in arrival order, and the disconnect cause
/// is only returned once no inbound frame is in flight, so cleanup never
/// races this connection's own messages.
async fn connection_loop(
    socket: WebSocket,
    id: &str,
    state: &AppState,
    mut out_rx: mpsc::UnboundedReceiver<String>,
) -> DisconnectCause {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    // Tell the client its identifier so peers can address it directly.
    let welcome =
        OutboundEnvelope::success(Events::CONNECTED).with_payload(json!({ "connectionId": id }));
    if let Ok(frame) = serde_json::to_string(&welcome) {
        if ws_tx.send(Message::Text(frame.into())).await.is_err() {
            return DisconnectCause::TransportError;
        }
    }

    let mut ping_interval = tokio::time::interval(state.config.ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately — consume it.
    ping_interval.tick().await;
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            // Incoming WebSocket message
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        if state.config.verbose_logging {
                            debug!(connection = %id, frame = %text, "inbound frame");
                        }
                        state.core.router.handle_text(id, &text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_activity = Instant::now();
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) => {
                        return DisconnectCause::ClientInitiatedDisconnect;
                    }
                    // Binary frames are not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(connection = %id, error = %e, "websocket error");
                        return DisconnectCause::TransportError;
                    }
                    None => {
                        return DisconnectCause::TransportClose;
                    }
                }
            }

            // Outbound queue — envelopes enqueued by the router
            frame = out_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                            return DisconnectCause::TransportClose;
                        }
                    }
                    None => {
                        // Queue detached: the server is force-closing us.
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return DisconnectCause::ServerForcedDisconnect;
                    }
                }
            }

            // Heartbeat
            _ = ping_interval.tick() => {
                if last_activity.elapsed() > state.config.ping_interval + state.config.ping_timeout {
                    return DisconnectCause::PingTimeout;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return DisconnectCause::TransportClose;
                }
            }

            // Server shutdown
            _ = shutdown_rx.recv() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return DisconnectCause::ServerShutdown;
            }
        }
    }
}
