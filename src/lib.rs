//! wayport: static shell and WISP tunnel endpoint for sandboxed web clients
//!
//! Serves the single-page application and its vendor bundles with the
//! cross-origin isolation headers on every response, and forwards `/wisp/`
//! WebSocket upgrades to the embedded transport multiplexer.

pub mod config;
pub mod web;
pub mod wisp;
