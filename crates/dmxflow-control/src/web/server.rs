//! Axum HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use dmxflow_core::WebSettings;

use crate::context::AppContext;
use crate::web::routes::build_router;
use crate::{error::ControlError, Result};

/// Web server for the REST console API
pub struct WebServer {
    config: WebSettings,
}

impl WebServer {
    /// Create a new web server
    pub fn new(config: WebSettings) -> Self {
        Self { config }
    }

    /// Run the web server (blocking)
    pub async fn run(self, ctx: Arc<AppContext>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| ControlError::Http(format!("Invalid address: {e}")))?;

        let mut app = build_router().with_state(ctx);

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any);
            app = app.layer(cors);
        }

        info!(%addr, "Web server listening");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ControlError::Http(format!("Failed to bind {addr}: {e}")))?;

        axum::serve(listener, app.into_make_service())
            .await
            .map_err(|e| ControlError::Http(format!("Server error: {e}")))?;

        Ok(())
    }

    /// Spawn the server in a background task
    pub fn spawn(self, ctx: Arc<AppContext>) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(ctx).await })
    }
}
