use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, Query, State, WebSocketUpgrade},
    http::{HeaderValue, Method, StatusCode, header::{AUTHORIZATION, CONTENT_TYPE}},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use greenpact_api::auth::bootstrap_admin;
use greenpact_api::config::Config;
use greenpact_api::contract_channel::ContractChannel;
use greenpact_api::routes::build_router;
use greenpact_api::state::{AppState, AppStateInner};
use greenpact_gateway::auth::handshake_user;
use greenpact_gateway::chat::ChatChannel;
use greenpact_gateway::notifications::NotificationChannel;
use greenpact_gateway::{Dispatcher, run_channel};

/// Uploads travel base64-encoded inside JSON bodies.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greenpact=debug,greenpact_api=debug,greenpact_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(greenpact_db::Database::open(&config.db_path)?);
    bootstrap_admin(&db, &config)?;

    let addr: SocketAddr = config.bind_addr().parse()?;
    let cors = cors_layer(&config.allowed_origins);
    let state = AppStateInner::new(config, db, Dispatcher::new()).await?;

    let ws_routes = Router::new()
        .route("/ws/chat/{room}/", get(chat_ws))
        .route("/ws/notifications/", get(notifications_ws))
        .route("/ws/contract/", get(contract_ws))
        .with_state(state.clone());

    let app = build_router(state.clone())
        .merge(ws_routes)
        .nest_service("/media", ServeDir::new(state.media.root()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("GreenPact server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

/// An empty allow-list means any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let list: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring malformed CORS origin {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false)
}

/// The token may come with the upgrade request; otherwise the first payload
/// has to carry it. A query token that does not resolve refuses the upgrade.
async fn chat_ws(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match handshake_user(state.db(), &state.config.jwt_secret, query.token.as_deref()).await {
        Ok(user) => user,
        Err(_) => {
            warn!("chat upgrade for room {} refused: invalid token", room);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| {
        let dispatcher = gateway.dispatcher.clone();
        run_channel(socket, dispatcher, user, ChatChannel::new(gateway, room))
    })
}

async fn notifications_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| {
        let dispatcher = gateway.dispatcher.clone();
        run_channel(socket, dispatcher, None, NotificationChannel::new(gateway))
    })
}

async fn contract_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let dispatcher = state.dispatcher().clone();
        run_channel(socket, dispatcher, None, ContractChannel::new(state))
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
