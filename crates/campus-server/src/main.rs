use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use campus_api::auth::{self, AppState, AppStateInner};
use campus_api::middleware::require_auth;
use campus_api::notifications;
use campus_gateway::{Registry, connection};
use campus_notify::{DbDirectory, Engine, Mailer, RecipientDirectory, email};
use campus_types::api::Claims;

#[derive(Clone)]
struct ServerState {
    registry: Registry,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("CAMPUS_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("CAMPUS_DB_PATH").unwrap_or_else(|_| "campus.db".into());
    let host = std::env::var("CAMPUS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CAMPUS_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(campus_db::Database::open(&PathBuf::from(&db_path))?);

    // Fan-out engine wiring: push registry, mail worker, directory
    let registry = Registry::new();
    let mailer = Mailer::start(email::channel_from_env());
    let directory: Arc<dyn RecipientDirectory> = Arc::new(DbDirectory::new(db.clone()));
    let engine = Arc::new(Engine::new(
        db.clone(),
        registry.clone(),
        directory,
        mailer,
    ));

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        engine,
        jwt_secret: jwt_secret.clone(),
    });

    let state = ServerState {
        registry,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/notifications", get(notifications::list))
        .route("/notifications", post(notifications::publish))
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route("/notifications/{id}/read", put(notifications::mark_read))
        .route(
            "/notifications/email-opt-out",
            put(notifications::set_email_opt_out),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Campus notifier listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
}

/// Authenticate the WebSocket at upgrade time; the session identity comes
/// from the verified token, never from a client-supplied join.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token_data = decode::<Claims>(
        &query.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let claims = token_data.claims;
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.registry,
            claims.sub,
            claims.username,
            claims.role,
        )
    }))
}
