/// REST API and WebSocket server for chats and goals
///
/// This module provides:
/// - REST endpoints for chat messages and goal views
/// - A per-chat WebSocket for live replies
#[cfg(feature = "api")]
pub mod handlers;
#[cfg(feature = "api")]
pub mod models;
#[cfg(feature = "api")]
pub mod server;
#[cfg(feature = "api")]
pub mod ws;

#[cfg(feature = "api")]
pub use models::{ErrorResponse, HealthResponse, SendMessageRequest};
#[cfg(feature = "api")]
pub use server::{ApiConfig, ApiServer};
