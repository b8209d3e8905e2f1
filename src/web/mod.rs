//! HTTP server for the application shell
//!
//! Serves the single-page application and vendor bundles with the
//! cross-origin isolation headers on every response. Upgrade requests at
//! `/wisp/` are dispatched to the tunnel endpoint.

mod headers;
mod server;
mod static_files;

pub use server::WebServer;
pub use static_files::AssetRoots;

use std::sync::Arc;

use crate::wisp::WispPolicy;

/// Shared state for the web server
#[derive(Clone)]
pub struct AppState {
    /// Asset directories resolved at startup
    pub roots: AssetRoots,
    /// Tunnel policy derived from settings
    pub wisp: Arc<WispPolicy>,
}
