//! # huddle-server
//!
//! HTTP API, WebSocket endpoint, configuration, and metrics for the Huddle
//! realtime messaging server. The `huddle` binary is a thin wrapper around
//! [`handlers::run_server`].

pub mod chat;
pub mod config;
pub mod dto;
pub mod handlers;
pub mod metrics;

pub use chat::ChatService;
pub use config::Config;
pub use handlers::{router, run_server, AppState};
