/// HTTP server implementation
use crate::api::handlers::{
    delete_chat, get_goal, goal_stats, health_check, list_goals, list_mental_states,
    list_messages, send_assistant_message, send_message, AppState,
};
use crate::api::ws::chat_socket;
use crate::config::{AppConfig, ServerConfig};
use crate::persistence::Persistence;
use crate::services::ChatService;
use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ApiConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            enable_cors: server.enable_cors,
        }
    }
}

impl ApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// API server
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(
        config: ApiConfig,
        persistence: Persistence,
        chat_service: Arc<ChatService>,
        app_config: AppConfig,
    ) -> Self {
        let state = AppState::new(persistence, chat_service, app_config);

        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_check))
            // Chats
            .route(
                "/chats/:chat_id/messages",
                post(send_message).get(list_messages),
            )
            .route("/chats/:chat_id/assistant", post(send_assistant_message))
            .route("/chats/:chat_id", delete(delete_chat))
            // Goals
            .route("/goals", get(list_goals))
            .route("/goals/stats", get(goal_stats))
            .route("/goals/mental-states", get(list_mental_states))
            .route("/goals/:goal_id", get(get_goal))
            // Live chat
            .route("/ws/chat/:chat_id", get(chat_socket))
            .with_state(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router = router.layer(TraceLayer::new_for_http());

        router
    }

    /// Run the server
    pub async fn run(self) -> Result<()> {
        let app = self.build_router();
        let bind_addr = self.config.bind_address();

        tracing::info!("Starting API server on {}", bind_addr);

        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        axum::serve(listener, app)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }

    /// Run the server with graceful shutdown
    pub async fn run_with_shutdown(
        self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let app = self.build_router();
        let bind_addr = self.config.bind_address();

        tracing::info!("Starting API server on {}", bind_addr);

        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}
