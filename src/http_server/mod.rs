//! # HTTP Server Module
//!
//! Axum transport for the kernel. Every bound operation is mounted on its
//! direct REST route and, when the model has a parent, on its nested route;
//! a single `POST` endpoint serves RPC envelopes.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/<resource>[/:id][/<verb>]` - Direct REST routes
//! - `/<parent>/:<key>/<resource>...` - Nested REST routes
//! - `POST <rpc_path>` - RPC envelopes and batches (default `/rpc`)

pub mod config;
pub mod errors;
pub mod routes;
pub mod server;

pub use config::HttpServerConfig;
pub use errors::{ErrorResponse, RestError};
pub use server::HttpServer;
