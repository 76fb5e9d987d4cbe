//! # HTTP Server
//!
//! Main HTTP server combining the operation routes, the RPC endpoint and the
//! health check behind CORS and request tracing.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::config::HttpServerConfig;
use super::routes::{health_routes, not_found_handler, operation_routes, rpc_routes};
use crate::api::Api;
use crate::dispatch::CallOptions;

/// HTTP server for a frozen [`Api`]
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with default configuration
    pub fn new(api: &Api) -> Self {
        Self::with_config(api, HttpServerConfig::default())
    }

    /// Create a new HTTP server with custom configuration
    pub fn with_config(api: &Api, config: HttpServerConfig) -> Self {
        let router = Self::build_router(api, &config);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(api: &Api, config: &HttpServerConfig) -> Router {
        let options = CallOptions {
            timeout: config.request_timeout(),
        };

        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes())
            .merge(rpc_routes(
                api.executor().clone(),
                &config.rpc_path,
                options,
            ))
            .merge(operation_routes(api.executor().clone(), options))
            .fallback(not_found_handler)
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Start the HTTP server (async)
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid socket address {}: {e}", self.config.socket_addr()),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, rpc_path = %self.config.rpc_path, "opkernel HTTP server listening");

        axum::serve(listener, self.router).await?;

        Ok(())
    }
}
