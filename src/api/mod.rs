//! # Api Builder
//!
//! Startup wiring: models are bound and hooks registered on an
//! [`ApiBuilder`], then [`ApiBuilder::build`] freezes both registries into a
//! shared [`Executor`]. The resulting [`Api`] is cheap to clone and exposes
//! the three adapters without any HTTP framework.
//!
//! ```ignore
//! let mut builder = ApiBuilder::new(InMemoryDatabase::new());
//! builder.bind(ModelSchema::new("Item").field(FieldDef::new("name", FieldType::String)))?;
//! builder.hook(Phase::PostCommit, HookScope::op("Item", "create"), audit);
//! let api = builder.build();
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::core::{
    BindOptions, CoreResult, CustomOp, Executor, Hook, HookRegistry, HookScope,
    OperationRegistry, OperationSpec, Phase, RegistryResult, Response,
};
use crate::dispatch::{nested, rest, rpc, CallOptions, RestRequest};
use crate::schema::ModelSchema;
use crate::storage::Database;

/// Mutable startup registries
pub struct ApiBuilder {
    database: Arc<dyn Database>,
    hooks: HookRegistry,
    ops: OperationRegistry,
}

impl ApiBuilder {
    pub fn new(database: impl Database + 'static) -> Self {
        Self::with_database(Arc::new(database))
    }

    pub fn with_database(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            hooks: HookRegistry::new(),
            ops: OperationRegistry::new(),
        }
    }

    /// Builder with every model of a configuration bound
    pub fn from_models(
        database: Arc<dyn Database>,
        models: impl IntoIterator<Item = ModelSchema>,
    ) -> RegistryResult<Self> {
        let mut builder = Self::with_database(database);
        for schema in models {
            builder.bind(schema)?;
        }
        Ok(builder)
    }

    /// Bind the CRUD operations of a model
    pub fn bind(&mut self, schema: ModelSchema) -> RegistryResult<Arc<ModelSchema>> {
        self.bind_model(schema, BindOptions::default())
    }

    /// Bind with dependencies shared by every CRUD operation
    pub fn bind_model(
        &mut self,
        schema: ModelSchema,
        options: BindOptions,
    ) -> RegistryResult<Arc<ModelSchema>> {
        let schema = self.ops.bind_model(schema, options)?;
        let unique = schema.unique_fields();
        if !unique.is_empty() {
            self.database.declare_unique(&schema.name, &unique);
        }
        Ok(schema)
    }

    /// Bind a custom verb, or override a CRUD verb
    pub fn bind_with(&mut self, model: &str, op: CustomOp) -> RegistryResult<Arc<OperationSpec>> {
        self.ops.bind_with(model, op)
    }

    /// Register a hook
    pub fn hook(&mut self, phase: Phase, scope: HookScope, hook: Arc<dyn Hook>) -> &mut Self {
        self.hooks.register(phase, scope, hook);
        self
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.ops
    }

    /// Freeze the registries
    pub fn build(self) -> Api {
        tracing::debug!(
            operations = self.ops.operations().len(),
            hooks = self.hooks.len(),
            "registries frozen"
        );
        Api {
            executor: Arc::new(Executor::new(
                Arc::new(self.hooks),
                Arc::new(self.ops),
                self.database,
            )),
        }
    }
}

/// Frozen kernel, shared by every transport
#[derive(Clone)]
pub struct Api {
    executor: Arc<Executor>,
}

impl Api {
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn operations(&self) -> &OperationRegistry {
        self.executor.operations()
    }

    /// Direct REST call
    pub async fn rest(&self, request: RestRequest) -> CoreResult<Response> {
        rest::dispatch(&self.executor, request, CallOptions::default()).await
    }

    /// REST call under a parent resource
    pub async fn nested(&self, request: RestRequest) -> CoreResult<Response> {
        nested::dispatch(&self.executor, request, CallOptions::default()).await
    }

    /// RPC envelope or batch; always yields a reply envelope
    pub async fn rpc(&self, request: Value) -> Value {
        rpc::handle_value(&self.executor, request, CallOptions::default()).await
    }
}
