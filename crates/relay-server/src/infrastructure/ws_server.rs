//! WebSocket server: accept loop, admission during the upgrade handshake and
//! per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Spawning the single [`BroadcastHub`] consumer task.
//! 3. Accepting TCP connections and giving each one its own Tokio task.
//! 4. Admitting or refusing each connection while the HTTP upgrade request is
//!    inspected: wrong path (404), unparseable client address (400) and the
//!    per-address cap (429) are all answered before any WebSocket exists.
//! 5. Registering admitted connections and handing them to
//!    [`session::Session`](super::session::Session).
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Scalability
//!
//! Each connection runs in its own Tokio task and only contends with others
//! on the registry mutex, which is never held across an `.await`.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::StreamExt;
use relay_core::{ConnectionId, Sanitizer, SessionId};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, error, info, warn};

use super::session::{Session, SessionError};
use super::ws_recipient::WsRecipient;
use crate::application::{
    AdmissionError, BotRouter, BroadcastHub, ConnectionRegistry, HubHandle, IngressGuard,
    NluClient, Reservation,
};
use crate::domain::{IngressLimits, RelayConfig};

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Header consulted when `trust_forwarded_for` is enabled.
const FORWARDED_FOR: &str = "x-forwarded-for";

// ── Shared state ──────────────────────────────────────────────────────────────

/// Everything a connection task needs, shared behind one `Arc`.
pub struct RelayState {
    pub config: RelayConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub guard: IngressGuard,
    pub hub: HubHandle,
    pub router: BotRouter,
    pub sanitizer: Box<dyn Sanitizer>,
}

impl RelayState {
    /// Wires the registry, guard, hub and router together.
    ///
    /// Returns the hub's consumer half, which the caller must spawn with
    /// [`BroadcastHub::run`].
    pub fn new(config: RelayConfig, nlu: Arc<dyn NluClient>) -> (Arc<Self>, BroadcastHub) {
        let registry = Arc::new(ConnectionRegistry::new());
        let guard = IngressGuard::new(
            Arc::clone(&registry),
            config.limits.clone(),
            config.trust_forwarded_for,
        );
        let (hub, handle) = BroadcastHub::new(Arc::clone(&registry), config.timeouts.write);
        let router = BotRouter::new(
            Arc::new(config.agents.clone()),
            nlu,
            handle.clone(),
            config.timeouts.nlu,
        );
        let sanitizer = config.sanitize.build();
        let state = Self {
            config,
            registry,
            guard,
            hub: handle,
            router,
            sanitizer,
        };
        (Arc::new(state), hub)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the listener, starts the hub and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(
    config: RelayConfig,
    nlu: Arc<dyn NluClient>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    let (state, hub) = RelayState::new(config, nlu);
    tokio::spawn(hub.run());

    serve(listener, state, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Split out from [`run_server`] so tests can bind an ephemeral port and keep
/// a handle on the shared state.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn serve(
    listener: TcpListener,
    state: Arc<RelayState>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(
        "chat relay listening on ws://{local}{}",
        state.config.ws_path
    );

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!(%peer, "TCP connection accepted");
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "failed to set TCP_NODELAY");
                }
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    handle_connection(stream, peer, state).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

/// WebSocket transport limits derived from the ingress limits.
///
/// Frames and reassembled messages above `max_frame_bytes` are rejected by
/// tungstenite while reading, before any JSON parsing happens.
pub fn transport_config(limits: &IngressLimits) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_frame_size = Some(limits.max_frame_bytes);
    config.max_message_size = Some(limits.max_frame_bytes);
    config
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Task entry point for one TCP connection.  Logs the outcome of
/// [`run_connection`].
async fn handle_connection<S>(stream: S, peer: SocketAddr, state: Arc<RelayState>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match run_connection(stream, peer, state).await {
        Ok(()) => debug!(%peer, "connection closed"),
        Err(SessionError::Refused(e)) => info!(%peer, "connection refused: {e}"),
        Err(e @ (SessionError::IdleTimeout(_) | SessionError::Evicted)) => {
            info!(%peer, "connection closed: {e}")
        }
        Err(e) => warn!(%peer, "connection closed with error: {e}"),
    }
}

async fn run_connection<S>(
    stream: S,
    peer: SocketAddr,
    state: Arc<RelayState>,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // ── Step 1: admission inside the upgrade handshake ─────────────────────────
    let mut reservation: Option<Reservation> = None;
    let mut refusal: Option<AdmissionError> = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        match admit(&state, peer, req) {
            Ok(r) => {
                reservation = Some(r);
                Ok(resp)
            }
            Err(Refusal { status, body, cause }) => {
                refusal = cause;
                Err(error_response(status, body))
            }
        }
    };

    let config = transport_config(&state.config.limits);
    let handshake = accept_hdr_async_with_config(stream, callback, Some(config)).await;

    let (ws_stream, reservation) = match (handshake, reservation, refusal) {
        (Ok(ws), Some(reservation), _) => (ws, reservation),
        (Err(WsError::Http(_)), None, Some(cause)) => return Err(SessionError::Refused(cause)),
        (Err(WsError::Http(resp)), None, None) => {
            debug!(%peer, status = %resp.status(), "upgrade rejected");
            return Ok(());
        }
        (Err(e), _, _) => return Err(SessionError::Handshake(e.to_string())),
        (Ok(_), None, _) => {
            return Err(SessionError::Handshake(
                "handshake completed without admission".to_string(),
            ))
        }
    };

    // ── Step 2: register ───────────────────────────────────────────────────────
    let conn = ConnectionId::new();
    let session_id = SessionId::generate();
    let addr = reservation.addr();
    let (sink, source) = ws_stream.split();
    let recipient = Arc::new(WsRecipient::new(sink));
    let _registration = reservation.register(conn, session_id.clone(), recipient.clone())?;

    info!(%conn, %addr, session = %session_id, "client connected");

    // ── Step 3: serve until the client leaves ──────────────────────────────────
    //
    // `_registration` unregisters on every exit path below, including panics.
    let session = Session::new(conn, session_id, Arc::clone(&recipient), state);
    let result = session.run(source).await;
    session.finish(&result).await;

    info!(%conn, %addr, "client disconnected");
    result
}

// ── Admission helpers ─────────────────────────────────────────────────────────

struct Refusal {
    status: StatusCode,
    body: &'static str,
    /// `None` for requests that were never chat clients (wrong path).
    cause: Option<AdmissionError>,
}

fn admit(state: &RelayState, peer: SocketAddr, req: &Request) -> Result<Reservation, Refusal> {
    if req.uri().path() != state.config.ws_path {
        return Err(Refusal {
            status: StatusCode::NOT_FOUND,
            body: "Not found",
            cause: None,
        });
    }

    let forwarded = req
        .headers()
        .get(FORWARDED_FOR)
        .map(|v| v.to_str().unwrap_or_default());

    let addr = state
        .guard
        .resolve_client_addr(peer, forwarded)
        .map_err(|e| Refusal {
            status: StatusCode::BAD_REQUEST,
            body: "Invalid client address",
            cause: Some(e),
        })?;

    state.guard.admit(addr).map_err(|e| Refusal {
        status: StatusCode::TOO_MANY_REQUESTS,
        body: "Too many connections",
        cause: Some(e),
    })
}

fn error_response(status: StatusCode, body: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(body.to_string()));
    *resp.status_mut() = status;
    resp
}

// ── Tests ─────────────────────────────────────────────────────────────────────
