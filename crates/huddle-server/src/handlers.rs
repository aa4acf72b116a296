//! HTTP and WebSocket handlers for the Huddle server.
//!
//! The handlers are thin: they validate input, read hub snapshots, and
//! submit events. All membership changes happen in the hub event loop.

use crate::chat::ChatService;
use crate::config::Config;
use crate::dto::{
    fail, ok, ok_empty, CreateRoomRequest, JoinRoomRequest, LeaveRoomRequest, LoginRequest,
    LoginResponse, WsQuery,
};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, ws::WebSocket, ws::WebSocketUpgrade, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use huddle_core::{validate_room_name, Hub, HubError, Identity, Room};
use huddle_protocol::Encoding;
use huddle_transport::{websocket, Connection, OriginPolicy, PumpConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Prefix of the HTTP API.
pub const API_PREFIX: &str = "/v1/api";

/// Shared server state.
pub struct AppState {
    /// The connection hub.
    pub hub: Hub,
    /// Handler for inbound chat frames.
    pub chat: Arc<ChatService>,
    /// Upgrade origin allow-list.
    pub origins: OriginPolicy,
    /// Per-connection pump settings.
    pub pump: PumpConfig,
}

impl AppState {
    /// Create new app state around a running hub.
    #[must_use]
    pub fn new(config: &Config, hub: Hub) -> Self {
        Self {
            chat: Arc::new(ChatService::new(hub.clone())),
            hub,
            origins: config.origin_policy(),
            pump: config.pump_config(),
        }
    }
}

/// Build the application router.
pub fn router(config: &Config, state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/ping", get(ping_handler))
        .route("/login", post(login_handler))
        .route("/rooms", get(list_rooms_handler).post(create_room_handler))
        .route("/rooms/:room_id", get(room_detail_handler))
        .route("/rooms/:room_id/join", post(join_room_handler))
        .route("/rooms/:room_id/leave", post(leave_room_handler))
        .route("/users", get(users_handler));

    Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .nest(API_PREFIX, api)
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let hub = Hub::spawn(config.hub_config());
    let state = Arc::new(AppState::new(&config, hub.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        match metrics::start_metrics_server(config.metrics.port) {
            Ok(()) => {
                metrics::spawn_stats_reporter(hub, Duration::from_secs(5));
            }
            Err(e) => error!("Failed to start metrics server: {:#}", e),
        }
    }

    let app = router(&config, state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn hub_failure(e: &HubError) -> Response {
    match e {
        HubError::RoomNotFound(_) => fail(StatusCode::BAD_REQUEST, "room not found"),
        HubError::WrongPassword(_) => fail(StatusCode::BAD_REQUEST, "wrong password"),
        HubError::InvalidIdentity(reason) | HubError::InvalidRoomName(reason) => {
            fail(StatusCode::BAD_REQUEST, *reason)
        }
        HubError::HubClosed | HubError::HubBusy => {
            fail(StatusCode::SERVICE_UNAVAILABLE, "hub unavailable")
        }
        other => fail(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn bad_body(rejection: &JsonRejection) -> Response {
    fail(StatusCode::BAD_REQUEST, rejection.body_text())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "stats": state.hub.stats(),
    }))
}

async fn ping_handler() -> &'static str {
    "pong"
}

/// Issue a fresh user id for a display name.
async fn login_handler(body: Result<Json<LoginRequest>, JsonRejection>) -> Response {
    let Ok(Json(req)) = body else {
        return fail(StatusCode::OK, "invalid parameters");
    };
    if req.username.trim().is_empty() {
        return fail(StatusCode::OK, "username cannot be empty");
    }
    ok(LoginResponse {
        id: Uuid::new_v4().to_string(),
        username: req.username,
    })
}

async fn list_rooms_handler(State(state): State<Arc<AppState>>) -> Response {
    ok(state.hub.rooms())
}

async fn create_room_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return bad_body(&rejection),
    };
    if let Err(reason) = validate_room_name(&req.name) {
        return hub_failure(&HubError::InvalidRoomName(reason));
    }
    if req.user_id.is_empty() {
        return hub_failure(&HubError::InvalidIdentity("user id cannot be empty"));
    }

    let owner_name = state.hub.first_display_name(&req.user_id).unwrap_or_default();
    let room = Room::new(
        Uuid::new_v4().to_string(),
        req.name,
        req.password,
        req.user_id.clone(),
        owner_name,
    );
    let summary = room.summary();

    if let Err(e) = state.hub.create_room(&req.user_id, room).await {
        return hub_failure(&e);
    }
    info!(room = %summary.id, user = %req.user_id, "Room creation submitted");
    ok(summary)
}

async fn room_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Response {
    match state.hub.room_detail(&room_id) {
        Some(detail) => ok(detail),
        None => hub_failure(&HubError::RoomNotFound(room_id)),
    }
}

async fn join_room_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Result<Json<JoinRoomRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return bad_body(&rejection),
    };
    if let Err(e) = state.hub.check_room_access(&room_id, &req.password) {
        debug!(room = %room_id, user = %req.user_id, "Join rejected: {}", e);
        return hub_failure(&e);
    }
    match state.hub.join_room(&req.user_id, &req.device_id, &room_id).await {
        Ok(()) => ok_empty(),
        Err(e) => hub_failure(&e),
    }
}

async fn leave_room_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Result<Json<LeaveRoomRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return bad_body(&rejection),
    };
    if !state.hub.room_exists(&room_id) {
        return hub_failure(&HubError::RoomNotFound(room_id));
    }
    match state.hub.leave_room(&req.user_id, &req.device_id, &room_id).await {
        Ok(()) => ok_empty(),
        Err(e) => hub_failure(&e),
    }
}

async fn users_handler(State(state): State<Arc<AppState>>) -> Response {
    ok(state.hub.users())
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origins.allows(origin) {
        warn!(origin = ?origin, "Upgrade rejected: origin not allowed");
        return fail(StatusCode::FORBIDDEN, "origin not allowed");
    }

    let Ok(identity) = Identity::new(query.token, query.device_id, query.username) else {
        return fail(StatusCode::UNAUTHORIZED, "token and deviceId are required");
    };

    let encoding = match query.encoding.as_deref() {
        None => Encoding::default(),
        Some(name) => match Encoding::from_name(name) {
            Some(encoding) => encoding,
            None => return fail(StatusCode::BAD_REQUEST, format!("unknown encoding: {name}")),
        },
    };

    let Some(ws) = ws else {
        return fail(StatusCode::BAD_REQUEST, "websocket upgrade required");
    };

    ws.max_message_size(state.pump.max_frame_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, identity, encoding))
}

/// Handle an upgraded WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, identity: Identity, encoding: Encoding) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection = match Connection::open(&state.hub, identity, encoding).await {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to open connection: {}", e);
            return;
        }
    };

    let (writer, reader) = websocket::split(socket);
    connection
        .run(
            state.hub.clone(),
            reader,
            writer,
            Arc::clone(&state.chat),
            state.pump.clone(),
        )
        .await;
}
