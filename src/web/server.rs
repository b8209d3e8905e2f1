//! Web server implementation using axum

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::config::{Mount, Settings};
use crate::wisp::{self, WispPolicy};

use super::headers;
use super::static_files::{self, AssetRoots};
use super::AppState;

/// Web server for the application shell
pub struct WebServer {
    settings: Settings,
}

impl WebServer {
    /// Create a new web server
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Run the web server until interrupted
    pub async fn run(self) -> Result<()> {
        let root = self.settings.assets.active_root().clone();
        tracing::info!(root = %root.display(), "serving application from");

        let roots = AssetRoots {
            root,
            public: self.settings.assets.public_dir.clone(),
        };

        let policy = Arc::new(WispPolicy::new(&self.settings.wisp)?);
        let state = AppState { roots, wisp: policy };

        let app = build_router(state, &self.settings.assets.mounts);

        let addr: SocketAddr = format!("{}:{}", self.settings.server.host, self.settings.server.port)
            .parse()
            .context("invalid bind address")?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        let local = listener.local_addr().context("listener has no address")?;

        log_listening(local);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

/// Assemble the router: vendor mounts first, then the catch-all shell
/// handler, with the isolation-header layer over everything.
pub(crate) fn build_router(state: AppState, mounts: &[Mount]) -> Router {
    let mut app = Router::new();

    for mount in mounts {
        let prefix = mount.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            tracing::warn!(prefix = %mount.prefix, "mount prefix names the root, skipping");
        } else if mount.dir.is_dir() {
            app = app.nest_service(prefix, ServeDir::new(&mount.dir));
        } else {
            tracing::warn!(
                prefix = %mount.prefix,
                dir = %mount.dir.display(),
                "mount directory missing, skipping"
            );
        }
    }

    app.fallback(shell_handler)
        .layer(middleware::from_fn(headers::isolation_headers))
        .with_state(state)
}

/// The catch-all handler: upgrade dispatch first, static assets otherwise
///
/// Upgrade requests whose path ends in `/wisp/` are handed to the tunnel
/// endpoint. Any other upgrade request is refused and the connection
/// closed. Plain requests get the asset tree with the SPA fallback.
async fn shell_handler(State(state): State<AppState>, request: Request) -> Response {
    if request.headers().contains_key(header::UPGRADE) {
        if request.uri().path().ends_with("/wisp/") {
            let (mut parts, _body) = request.into_parts();
            return match axum::extract::WebSocketUpgrade::from_request_parts(&mut parts, &())
                .await
            {
                Ok(ws) => wisp::upgrade(ws, state.wisp.clone()),
                Err(rejection) => rejection.into_response(),
            };
        }
        return refuse_upgrade();
    }

    static_files::asset_or_fallback(&state.roots, request.uri().path()).await
}

/// Refuse a protocol upgrade and close the connection
fn refuse_upgrade() -> Response {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header(header::CONNECTION, "close")
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::BAD_REQUEST.into_response())
}

/// Log the URLs the server is reachable on
///
/// The listener binds every interface by default, so name a few useful
/// ones: loopback, the machine hostname, and the LAN address.
fn log_listening(addr: SocketAddr) {
    tracing::info!("Listening on:");
    tracing::info!("  http://localhost:{}", addr.port());
    if let Ok(name) = hostname::get() {
        tracing::info!("  http://{}:{}", name.to_string_lossy(), addr.port());
    }
    if let Ok(ip) = local_ip_address::local_ip() {
        tracing::info!("  http://{}:{}", ip, addr.port());
    }
}

/// Resolve when the process receives SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, closing listener");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, closing listener");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received SIGINT, closing listener");
    }
}
