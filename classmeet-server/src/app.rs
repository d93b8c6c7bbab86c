use crate::config::ServerConfig;
use crate::room::{BearerTokenGuard, Broker, BrokerHandle, JoinGuard, OpenAccess};
use crate::signaling::{SignalingService, socketio, ws_handler};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::Router;
use axum::routing::get;
use classmeet_core::IceServerConfig;
use socketioxide::SocketIo;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared by every transport handler.
#[derive(Clone)]
pub struct AppState {
    pub service: SignalingService,
    pub broker: BrokerHandle,
    pub ice_servers: Arc<Vec<IceServerConfig>>,
}

impl AppState {
    pub fn new(service: SignalingService, broker: BrokerHandle, ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            service,
            broker,
            ice_servers: Arc::new(ice_servers),
        }
    }
}

/// A wired server: HTTP routes plus the broker they feed.
pub struct App {
    pub router: Router,
    pub broker: BrokerHandle,
    pub broker_task: JoinHandle<()>,
}

/// Spawns the broker and builds the routes around it. Must run inside a
/// tokio runtime.
pub fn build_app(config: &ServerConfig) -> App {
    let guard: Arc<dyn JoinGuard> = match &config.jwt_secret {
        Some(secret) => Arc::new(BearerTokenGuard::new(secret)),
        None => {
            warn!("CLASSMEET_JWT_SECRET not set, any client may join any room");
            Arc::new(OpenAccess)
        }
    };

    let service = SignalingService::new();
    let (broker, broker_task) = Broker::spawn(
        Arc::new(service.clone()),
        guard,
        config.command_buffer,
        config.max_room_members,
    );

    let state = AppState::new(service, broker.clone(), config.ice_servers());
    App {
        router: build_router(state, config),
        broker,
        broker_task,
    }
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/ice-servers", get(ice_servers_handler));

    if config.socketio {
        let (sio_layer, io) = SocketIo::builder()
            .with_state(state.clone())
            .build_layer();
        io.ns("/", socketio::on_connect);
        router = router.layer(sio_layer);
        info!("Socket.IO transport mounted");
    }

    router
        .layer(build_cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.broker.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "rooms": stats.rooms,
                "connections": stats.connections,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "error": e.to_string(),
            })),
        ),
    }
}

async fn ice_servers_handler(State(state): State<AppState>) -> Json<Vec<IceServerConfig>> {
    Json(state.ice_servers.as_ref().clone())
}

fn build_cors_layer(allowed_origins: &str) -> CorsLayer {
    if allowed_origins == "*" {
        warn!("CORS: permissive mode (allow all origins)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(_) => {
                warn!(origin = s, "CORS: skipping invalid origin");
                None
            }
        })
        .collect();

    info!("CORS: restricted to {} origin(s)", origins.len());

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ])
}
