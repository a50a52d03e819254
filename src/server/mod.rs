// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! API server
//!
//! # Endpoints
//!
//! - `POST /api/login` - Admin login
//! - `POST /api/logout` - Destroy the session
//! - `GET /api/session` - Admin flag of the current session
//! - `POST /api/demo-login` - Demo viewer login
//! - `GET /api/demo-session` - Demo flag of the current session
//! - `GET /api/menu` - Current menu (public)
//! - `POST /api/menu` - Replace the menu (admin)
//! - `POST /api/upload` - Upload a menu image (admin)
//! - `GET /health` - Health check
//!
//! # Example
//!
//! ```no_run
//! use menu_admin::{AppConfig, Server};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::from_env()?;
//! Server::new(config).start().await?;
//! # Ok(())
//! # }
//! ```

mod extract;

pub use extract::LoginRequest;

use extract::has_json_content_type;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::errors::{ApiError, ADMIN_LOGIN_FAILED, DEMO_LOGIN_FAILED};
use crate::menu::{MenuDocument, MenuRepository};
use crate::security::{SessionContext, SessionCookie, SessionFlag, SessionStore};
use crate::upload::{receive_image, UploadError, UploadStore};

/// Requests taking longer than this are answered with 408.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How often expired sessions are dropped from memory.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Server state shared across handlers.
pub struct AppState {
    /// Server configuration.
    pub config: AppConfig,
    /// Live sessions.
    pub sessions: SessionStore,
    /// Session cookie format and signing key.
    pub cookie: SessionCookie,
    /// Menu document storage.
    pub menu: Arc<MenuRepository>,
    /// Upload directory.
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let cookie = SessionCookie::new(
            config.cookie_name.clone(),
            &config.session_secret,
            config.cookie_secure,
        )
        .map_err(|e| anyhow::anyhow!("SESSION_SECRET cannot key the cookie signature: {}", e))?;

        Ok(Self {
            sessions: SessionStore::new(config.session_ttl),
            cookie,
            menu: Arc::new(MenuRepository::new(config.menu_path.clone())),
            uploads: UploadStore::new(
                config.upload_dir.clone(),
                config.upload_public_prefix.clone(),
                config.max_upload_bytes,
            ),
            config,
        })
    }
}

/// API server.
#[derive(Debug)]
pub struct Server {
    config: AppConfig,
}

impl Server {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Get the port.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Build the router with fresh state.
    pub fn build_router(&self) -> Result<Router> {
        Ok(router(Arc::new(AppState::new(self.config.clone())?)))
    }

    /// Start the server with graceful shutdown.
    pub async fn start(&self) -> Result<()> {
        self.prepare_storage().await?;

        let state = Arc::new(AppState::new(self.config.clone())?);
        let app = router(Arc::clone(&state));
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);

        if self.config.uses_dev_secret() {
            tracing::warn!("Using the development session secret. Set SESSION_SECRET in production.");
        }
        if self.config.admin.is_none() {
            tracing::warn!("No admin credentials configured; /api/login will reject every attempt.");
        }
        if self.config.bind_address == "0.0.0.0" {
            tracing::warn!("Server is binding to 0.0.0.0 which exposes the API to the network.");
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                anyhow::anyhow!(
                    "Port {} is already in use. Stop the other instance or set PORT to a free port.",
                    self.config.port
                )
            } else {
                anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
            }
        })?;

        let sweeper = spawn_session_sweeper(Arc::clone(&state));

        tracing::info!("Server running on http://{}", addr);
        tracing::info!("Menu file: {}", self.config.menu_path.display());
        tracing::info!("Upload directory: {}", self.config.upload_dir.display());

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.abort();
        served.context("Server error")?;
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Create the menu and upload directories if they are missing.
    async fn prepare_storage(&self) -> Result<()> {
        if let Some(parent) = self.config.menu_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create menu directory {:?}", parent))?;
        }
        tokio::fs::create_dir_all(&self.config.upload_dir)
            .await
            .with_context(|| format!("Failed to create upload directory {:?}", self.config.upload_dir))?;

        if !self.config.menu_path.exists() {
            tracing::warn!(
                "Menu file {} does not exist yet; GET /api/menu fails until the first save.",
                self.config.menu_path.display()
            );
        }
        Ok(())
    }
}

/// All routes over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    // Leave room above the image limit so the upload check, not the
    // transport limit, reports oversized files.
    let body_limit = usize::try_from(state.config.max_upload_bytes.saturating_mul(2)).unwrap_or(usize::MAX);

    Router::new()
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/session", get(session_handler))
        .route("/api/demo-login", post(demo_login_handler))
        .route("/api/demo-session", get(demo_session_handler))
        .route("/api/menu", get(get_menu_handler).post(save_menu_handler))
        .route("/api/upload", post(upload_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

const OK: OkResponse = OkResponse { ok: true };

#[derive(Serialize)]
struct SessionStatus {
    authenticated: bool,
}

#[derive(Serialize)]
struct UploadResponse {
    ok: bool,
    path: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    active_sessions: usize,
}

// =============================================================================
// Handlers
// =============================================================================

/// Admin login.
async fn login_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    login: LoginRequest,
) -> Result<Response, ApiError> {
    let accepted = state
        .config
        .admin
        .as_ref()
        .is_some_and(|admin| admin.matches(&login.username, &login.password));

    if !accepted {
        return Err(ApiError::authentication_failed(ADMIN_LOGIN_FAILED, &login.username));
    }
    Ok(grant(&state, &session, SessionFlag::Admin))
}

/// Demo viewer login. Same protocol, separate credentials and flag.
async fn demo_login_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    login: LoginRequest,
) -> Result<Response, ApiError> {
    if !state.config.demo.matches(&login.username, &login.password) {
        return Err(ApiError::authentication_failed(DEMO_LOGIN_FAILED, &login.username));
    }
    Ok(grant(&state, &session, SessionFlag::Demo))
}

/// Raise `flag` on the caller's session, starting one if needed.
fn grant(state: &AppState, session: &SessionContext, flag: SessionFlag) -> Response {
    if let Some(token) = session.token() {
        if state.sessions.set_flag(token, flag) {
            return Json(OK).into_response();
        }
    }

    // No live session: start one and hand out its cookie.
    let token = state.sessions.create();
    state.sessions.set_flag(&token, flag);
    let cookie = state.cookie.issue(&token, state.sessions.ttl());
    (AppendHeaders([(SET_COOKIE, cookie)]), Json(OK)).into_response()
}

/// Destroy the session. Always succeeds.
async fn logout_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Response {
    if let Some(token) = session.token() {
        state.sessions.destroy(token);
    }
    (AppendHeaders([(SET_COOKIE, state.cookie.clear())]), Json(OK)).into_response()
}

async fn session_handler(session: SessionContext) -> Json<SessionStatus> {
    Json(SessionStatus {
        authenticated: session.is_admin(),
    })
}

async fn demo_session_handler(session: SessionContext) -> Json<SessionStatus> {
    Json(SessionStatus {
        authenticated: session.is_demo(),
    })
}

/// Public menu read. Returns the stored bytes untouched.
async fn get_menu_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let repo = Arc::clone(&state.menu);
    let bytes = tokio::task::spawn_blocking(move || repo.load_raw())
        .await
        .map_err(|e| ApiError::storage("Could not read the menu.", &e))??;

    Ok(([(CONTENT_TYPE, "application/json")], bytes).into_response())
}

/// Replace the menu.
async fn save_menu_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let access = session.require_admin("menu write")?;

    let body = body.map_err(|rejection| ApiError::validation(rejection.body_text()))?;
    // Bodies not declared as JSON are read as an empty document.
    let parsed = if has_json_content_type(&headers) {
        MenuDocument::from_slice(&body)
    } else {
        MenuDocument::from_value(Value::Object(Map::new()))
    };
    let menu = parsed.inspect_err(|e| {
        tracing::info!(constraint = %e.constraint(), "Menu rejected");
    })?;

    let repo = Arc::clone(&state.menu);
    tokio::task::spawn_blocking(move || repo.replace(&access, &menu))
        .await
        .map_err(|e| ApiError::storage("Could not save the menu.", &e))??;

    Ok(Json(OK))
}

/// Store one menu image.
async fn upload_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let access = session.require_admin("image upload")?;

    // Not a multipart body at all: there is no file to speak of.
    let multipart = multipart.map_err(|_| UploadError::NoFile)?;
    let stored = receive_image(&state.uploads, &access, multipart).await?;

    Ok(Json(UploadResponse {
        ok: true,
        path: stored.public_path,
    }))
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.sessions.active_session_count(),
    })
}

// =============================================================================
// Background tasks
// =============================================================================

/// Periodically drop expired sessions.
fn spawn_session_sweeper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = state.sessions.cleanup_expired();
            tracing::debug!(removed, "Session sweep finished");
        }
    })
}

/// Graceful shutdown signal handler.
///
/// Waits for SIGINT/SIGTERM (Ctrl+C on non-Unix platforms).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                    }
                }
            }
            _ => {
                tracing::error!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
    }
}
