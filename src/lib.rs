//! opkernel - one operation lifecycle behind REST, nested REST and RPC
//!
//! Every call, whichever surface it arrives on, runs through the same
//! phase chain: hooks at fixed points around a handler and a single
//! begin/commit/rollback boundary.

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod http_server;
pub mod logging;
pub mod schema;
pub mod storage;

pub use api::{Api, ApiBuilder};
