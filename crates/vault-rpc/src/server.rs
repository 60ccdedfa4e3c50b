//! HTTP server implementation using Axum.

use crate::auth::{bearer_token, SessionStore};
use crate::files::{handle_archive_file, handle_upload};
use crate::handlers::{handle_health, handle_rpc};
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use model_vault::{BlobStore, Principal, Registry};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Largest multipart upload body accepted.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Application state shared across handlers.
pub struct AppState {
    /// Model registry
    pub registry: Registry,
    /// Bearer sessions for accounts and archive tokens
    pub sessions: SessionStore,
    /// Bcrypt cost for passwords set at registration
    pub password_cost: u32,
}

impl AppState {
    pub fn new(registry: Registry, password_cost: u32) -> Self {
        Self {
            registry,
            sessions: SessionStore::default(),
            password_cost,
        }
    }

    /// Principal behind the request's bearer token, if any.
    pub async fn principal(&self, headers: &HeaderMap) -> Option<Principal> {
        let token = bearer_token(headers)?;
        self.sessions.resolve(token).await
    }
}

/// Build the router for `state`.
pub fn router(state: Arc<AppState>) -> Router {
    // Configure CORS for browser front ends
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let uploads = ServeDir::new(state.registry.data_root().join(BlobStore::uploads_dir()));

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .route(
            "/api/models/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/archives/:archive_name/files/:file_name",
            get(handle_archive_file),
        )
        .nest_service("/uploads", uploads)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    registry: Registry,
    host: &str,
    port: u16,
    password_cost: u32,
) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(AppState::new(registry, password_cost)));

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
