//! # Core Kernel
//!
//! The operation lifecycle shared by every surface: typed call context,
//! hook and operation registries, the phase-chain executor, and the
//! transaction boundary it drives.
//!
//! ## Design Principles
//!
//! - One executor for every surface, so hook order cannot depend on transport
//! - Registries are built at startup and frozen behind `Arc`
//! - A single fault taxonomy maps to both HTTP statuses and RPC codes

pub mod context;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod hooks;
pub mod operation;
pub mod phase;
pub mod registry;
pub mod tx;

pub use context::{Context, RequestMeta, Response, RpcEnv, Surface};
pub use error::{CoreError, CoreResult, FaultClass, FieldIssue};
pub use executor::Executor;
pub use hooks::{hook_fn, named_hook, sync_hook, Hook, HookRegistry, HookScope};
pub use operation::{
    handler_fn, Arity, BindOptions, CustomOp, IoShape, OperationHandler, OperationSpec, Target,
};
pub use phase::Phase;
pub use registry::{OperationRegistry, RegistryError, RegistryResult, RestRoute};
pub use tx::TxBoundary;
