//! Local HTTP API
//!
//! `GET /v1/logs`, `GET /v1/health` and `POST /v1/commands`, served with
//! permissive CORS so a UI on another origin can call it.

mod handlers;
mod response;

pub use handlers::{CommandRequest, HealthCheckResponse};
pub use response::ApiMessage;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ServerError;
use crate::executor::CommandExecutor;
use crate::tracker::FileChangesTracker;

#[derive(Clone)]
pub struct ApiState {
    pub tracker: Arc<FileChangesTracker>,
    pub executor: Arc<CommandExecutor>,
}

/// Build the API routes
pub fn router(tracker: Arc<FileChangesTracker>, executor: Arc<CommandExecutor>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::LINK])
        .max_age(Duration::from_secs(300));

    Router::new()
        .route("/v1/commands", post(handlers::submit_commands))
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/logs", get(handlers::get_logs))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ApiState { tracker, executor })
}

/// Running HTTP server
pub struct HttpServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl HttpServer {
    /// Bind `addr` and serve `router` on a background task
    pub async fn start(addr: SocketAddr, router: Router) -> Result<Self, ServerError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        tracing::info!("starting-http-server url=http://{}", local_addr);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn stop(self) -> Result<(), ServerError> {
        tracing::info!("stopping-http-server");
        self.shutdown.cancel();
        match self.task.await {
            Ok(result) => result.map_err(ServerError::Serve),
            Err(e) => Err(ServerError::Join(e.to_string())),
        }
    }
}
