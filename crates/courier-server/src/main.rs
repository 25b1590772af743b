mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use courier_api::auth::{self, AppState, AppStateInner};
use courier_api::error::ApiError;
use courier_crypto::MessageCipher;
use courier_db::Database;
use courier_gateway::{DeliveryEngine, Directory, MessageStore, PresenceRegistry, connection};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "courier=debug,courier_gateway=debug,courier_api=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Shared state; presence lives exactly as long as this process
    let store = MessageStore::new(db.clone(), MessageCipher::new(config.message_key));
    let engine = DeliveryEngine::new(store, Directory::new(db), PresenceRegistry::new());
    let state: AppState = Arc::new(AppStateInner { engine, jwt_secret: config.jwt_secret });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .merge(courier_api::routes(state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Courier server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Authenticate before upgrading so the connection is bound to one user for
/// its whole life.
async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match auth::authenticate(&state, &headers, uri.query()).await {
        Ok(id) => id,
        Err(e) => {
            warn!("gateway upgrade refused: {}", e);
            return ApiError::from(e).into_response();
        }
    };

    let engine = state.engine.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, engine, user_id))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(e) => {
                    warn!("failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
