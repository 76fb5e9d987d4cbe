//! # Operation Registry
//!
//! Binds models to operations and exposes each bound operation on two
//! surfaces: an RPC method table keyed by `Model.verb`, and a REST route
//! table (direct, plus nested when the model declares a parent). Both
//! surfaces hand out the same `Arc<OperationSpec>`.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use thiserror::Error;

use super::context::Surface;
use super::handlers::CrudHandler;
use super::operation::{Arity, BindOptions, CustomOp, IoShape, OperationSpec, Target};
use crate::schema::ModelSchema;

/// Path segment reserved for bulk routes
pub const BULK_SEGMENT: &str = "bulk";

/// Registry errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("operation {model}.{verb} is already bound")]
    DuplicateOperation { model: String, verb: String },

    #[error("invalid identifier: {0:?}")]
    InvalidName(String),

    #[error("model {0} is not bound")]
    UnknownModel(String),

    #[error("unknown verb {verb} for model {model}")]
    UnknownVerb { model: String, verb: String },

    #[error("route conflict: {0}")]
    RouteConflict(String),
}

/// Registry result type
pub type RegistryResult<T> = Result<T, RegistryError>;

fn identifier() -> Option<&'static Regex> {
    static IDENT: OnceLock<Option<Regex>> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

fn check_name(name: &str) -> RegistryResult<()> {
    match identifier() {
        Some(re) if re.is_match(name) => Ok(()),
        _ => Err(RegistryError::InvalidName(name.to_string())),
    }
}

/// One REST route; path params use `:name` syntax
#[derive(Debug, Clone)]
pub struct RestRoute {
    pub method: &'static str,
    pub path: String,
    /// `Rest` for direct routes, `Nested` for routes under a parent
    pub surface: Surface,
    pub spec: Arc<OperationSpec>,
}

/// Registry of bound operations
#[derive(Debug, Default)]
pub struct OperationRegistry {
    models: Vec<Arc<ModelSchema>>,
    /// Bound order
    ops: Vec<Arc<OperationSpec>>,
    /// `(model, verb)`, lowercased, to position in `ops`
    index: HashMap<(String, String), usize>,
}

impl OperationRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the CRUD operations of a model
    pub fn bind(&mut self, schema: ModelSchema) -> RegistryResult<Arc<ModelSchema>> {
        self.bind_model(schema, BindOptions::default())
    }

    /// Bind the CRUD operations of a model with shared dependencies
    pub fn bind_model(
        &mut self,
        mut schema: ModelSchema,
        options: BindOptions,
    ) -> RegistryResult<Arc<ModelSchema>> {
        check_name(&schema.name)?;
        check_name(&schema.resource_name())?;
        if let Some(parent) = &schema.parent {
            check_name(&parent.resource)?;
            check_name(&parent.key)?;
        }
        schema.ensure_parent_field();

        let resource = schema.resource_name();
        if self
            .models
            .iter()
            .any(|m| m.resource_name().eq_ignore_ascii_case(&resource))
        {
            return Err(RegistryError::RouteConflict(format!(
                "resource /{resource} is already bound"
            )));
        }

        let targets = match &schema.verbs {
            None => Target::CRUD.to_vec(),
            Some(verbs) => verbs
                .iter()
                .map(|v| {
                    v.parse::<Target>().map_err(|_| RegistryError::UnknownVerb {
                        model: schema.name.clone(),
                        verb: v.clone(),
                    })
                })
                .collect::<RegistryResult<Vec<_>>>()?,
        };

        for target in &targets {
            if self.get(&schema.name, target.alias()).is_some() {
                return Err(RegistryError::DuplicateOperation {
                    model: schema.name.clone(),
                    verb: target.alias().to_string(),
                });
            }
        }

        let schema = Arc::new(schema);
        for target in targets {
            let spec = OperationSpec {
                model: schema.name.clone(),
                verb: target.alias().to_string(),
                target,
                arity: target.arity(),
                handler: Arc::new(CrudHandler::new(target, Arc::clone(&schema))),
                input: target
                    .shape_mode()
                    .map_or(IoShape::Any, |mode| IoShape::Input(Arc::clone(&schema), mode)),
                output: IoShape::Output(Arc::clone(&schema)),
                deps: options.deps.clone(),
                secdeps: options.secdeps.clone(),
                status: target.success_status(),
                schema: Arc::clone(&schema),
            };
            self.insert(Arc::new(spec));
        }

        self.models.push(Arc::clone(&schema));
        tracing::debug!(model = %schema.name, resource = %resource, "model bound");
        Ok(schema)
    }

    /// Bind a custom operation on an already bound model
    pub fn bind_with(&mut self, model: &str, op: CustomOp) -> RegistryResult<Arc<OperationSpec>> {
        check_name(&op.verb)?;
        let schema = self
            .model(model)
            .ok_or_else(|| RegistryError::UnknownModel(model.to_string()))?;

        let existing = self.get(&schema.name, &op.verb);
        if existing.is_some() && !op.replace_existing {
            return Err(RegistryError::DuplicateOperation {
                model: schema.name.clone(),
                verb: op.verb.clone(),
            });
        }

        // A replaced CRUD verb keeps its routes and default input checks.
        let (target, arity, default_input) = match &existing {
            Some(spec) if spec.target != Target::Custom => {
                (spec.target, spec.arity, spec.input.clone())
            }
            _ => (Target::Custom, op.arity, IoShape::Any),
        };

        if target == Target::Custom
            && arity == Arity::Collection
            && op.verb.eq_ignore_ascii_case(BULK_SEGMENT)
        {
            return Err(RegistryError::RouteConflict(format!(
                "POST /{}/{} is reserved for bulk_create",
                schema.resource_name(),
                BULK_SEGMENT
            )));
        }

        let verb = existing
            .as_ref()
            .map_or_else(|| op.verb.clone(), |spec| spec.verb.clone());
        let spec = Arc::new(OperationSpec {
            model: schema.name.clone(),
            verb,
            target,
            arity,
            handler: op.handler,
            input: op
                .input
                .map_or(default_input, |mode| IoShape::Input(Arc::clone(&schema), mode)),
            output: IoShape::Output(Arc::clone(&schema)),
            deps: op.deps,
            secdeps: op.secdeps,
            status: if target == Target::Custom {
                op.status
            } else {
                target.success_status()
            },
            schema,
        });

        self.insert(Arc::clone(&spec));
        tracing::debug!(op = %spec.rpc_method(), "custom operation bound");
        Ok(spec)
    }

    fn insert(&mut self, spec: Arc<OperationSpec>) {
        let key = (spec.model.to_lowercase(), spec.verb.to_lowercase());
        match self.index.get(&key) {
            Some(&pos) => self.ops[pos] = spec,
            None => {
                self.index.insert(key, self.ops.len());
                self.ops.push(spec);
            }
        }
    }

    /// Look up an operation by model and verb
    pub fn get(&self, model: &str, verb: &str) -> Option<Arc<OperationSpec>> {
        self.index
            .get(&(model.to_lowercase(), verb.to_lowercase()))
            .map(|&pos| Arc::clone(&self.ops[pos]))
    }

    /// Look up an operation by RPC method name, `Model.verb`
    pub fn rpc(&self, method: &str) -> Option<Arc<OperationSpec>> {
        let (model, verb) = method.split_once('.')?;
        self.get(model, verb)
    }

    /// The operation bound to a CRUD target of a model
    pub fn by_target(&self, model: &str, target: Target) -> Option<Arc<OperationSpec>> {
        self.ops
            .iter()
            .find(|spec| spec.target == target && spec.model.eq_ignore_ascii_case(model))
            .cloned()
    }

    /// Look up a model by name
    pub fn model(&self, name: &str) -> Option<Arc<ModelSchema>> {
        self.models
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Look up a model by REST resource segment
    pub fn model_by_resource(&self, resource: &str) -> Option<Arc<ModelSchema>> {
        self.models
            .iter()
            .find(|m| m.resource_name().eq_ignore_ascii_case(resource))
            .cloned()
    }

    /// Bound models, in bind order
    pub fn models(&self) -> &[Arc<ModelSchema>] {
        &self.models
    }

    /// Bound operations, in bind order
    pub fn operations(&self) -> &[Arc<OperationSpec>] {
        &self.ops
    }

    /// RPC method names, in bind order
    pub fn rpc_methods(&self) -> Vec<String> {
        self.ops.iter().map(|spec| spec.rpc_method()).collect()
    }

    /// Every REST route, direct routes first
    pub fn rest_routes(&self) -> Vec<RestRoute> {
        let mut routes = Vec::new();
        for spec in &self.ops {
            let resource = spec.schema.resource_name();
            let tail = route_tail(spec);
            routes.push(RestRoute {
                method: spec.target.http_method(),
                path: format!("/{resource}{tail}"),
                surface: Surface::Rest,
                spec: Arc::clone(spec),
            });
        }
        for spec in &self.ops {
            if let Some(parent) = &spec.schema.parent {
                let resource = spec.schema.resource_name();
                let tail = route_tail(spec);
                routes.push(RestRoute {
                    method: spec.target.http_method(),
                    path: format!("/{}/:{}/{resource}{tail}", parent.resource, parent.key),
                    surface: Surface::Nested,
                    spec: Arc::clone(spec),
                });
            }
        }
        routes
    }
}

fn route_tail(spec: &OperationSpec) -> String {
    match (spec.target, spec.arity) {
        (Target::BulkCreate | Target::BulkDelete, _) => format!("/{BULK_SEGMENT}"),
        (Target::Custom, Arity::Collection) => format!("/{}", spec.verb),
        (Target::Custom, Arity::Member) => format!("/:id/{}", spec.verb),
        (_, Arity::Member) => "/:id".to_string(),
        (_, Arity::Collection) => String::new(),
    }
}
