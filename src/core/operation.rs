//! Operation Model
//!
//! An [`OperationSpec`] is one bound `(model, verb)` pair: what it targets,
//! how its params are checked, which handler produces its result, and which
//! dependencies must pass before the transaction opens. Specs are built at
//! bind time and shared immutably by every surface.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use super::context::Context;
use super::error::CoreResult;
use super::hooks::Hook;
use crate::schema::{ModelSchema, ShapeMode};
use crate::storage::Record;

/// What an operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Create,
    Read,
    Update,
    Replace,
    Delete,
    List,
    Clear,
    BulkCreate,
    BulkDelete,
    Custom,
}

impl Target {
    /// Every generic CRUD target, in binding order
    pub const CRUD: [Target; 9] = [
        Target::Create,
        Target::Read,
        Target::Update,
        Target::Replace,
        Target::Delete,
        Target::List,
        Target::Clear,
        Target::BulkCreate,
        Target::BulkDelete,
    ];

    /// Default verb alias
    pub fn alias(&self) -> &'static str {
        match self {
            Target::Create => "create",
            Target::Read => "read",
            Target::Update => "update",
            Target::Replace => "replace",
            Target::Delete => "delete",
            Target::List => "list",
            Target::Clear => "clear",
            Target::BulkCreate => "bulk_create",
            Target::BulkDelete => "bulk_delete",
            Target::Custom => "custom",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Target::Read | Target::Update | Target::Replace | Target::Delete => Arity::Member,
            _ => Arity::Collection,
        }
    }

    /// Input validation mode for generic CRUD targets
    pub fn shape_mode(&self) -> Option<ShapeMode> {
        match self {
            Target::Create => Some(ShapeMode::Create),
            Target::Read | Target::Delete => Some(ShapeMode::Key),
            Target::Update => Some(ShapeMode::Update),
            Target::Replace => Some(ShapeMode::Replace),
            Target::List | Target::Clear => Some(ShapeMode::Filter),
            Target::BulkCreate => Some(ShapeMode::BulkCreate),
            Target::BulkDelete => Some(ShapeMode::BulkDelete),
            Target::Custom => None,
        }
    }

    /// HTTP status of a successful call
    pub fn success_status(&self) -> u16 {
        match self {
            Target::Create | Target::BulkCreate => 201,
            _ => 200,
        }
    }

    /// HTTP method on the REST surface
    pub fn http_method(&self) -> &'static str {
        match self {
            Target::Create | Target::BulkCreate | Target::Custom => "POST",
            Target::Read | Target::List => "GET",
            Target::Update => "PATCH",
            Target::Replace => "PUT",
            Target::Delete | Target::Clear | Target::BulkDelete => "DELETE",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alias())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::CRUD
            .into_iter()
            .find(|t| t.alias().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown CRUD verb: {s}"))
    }
}

/// Whether an operation addresses the collection or one member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Collection,
    Member,
}

/// Produces the result of an operation
pub trait OperationHandler: Send + Sync {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, CoreResult<Value>>;
}

struct FnHandler<F>(F);

impl<F> OperationHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, CoreResult<Value>> + Send + Sync,
{
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, CoreResult<Value>> {
        (self.0)(ctx)
    }
}

/// Wrap an async closure as a handler
pub fn handler_fn<F>(f: F) -> Arc<dyn OperationHandler>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, CoreResult<Value>> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Shape of params going in or a result coming out
#[derive(Clone)]
pub enum IoShape {
    /// No checking or shaping
    Any,
    /// Params checked against a model schema
    Input(Arc<ModelSchema>, ShapeMode),
    /// Results shaped by a model schema
    Output(Arc<ModelSchema>),
}

impl IoShape {
    /// Check and normalize params
    pub fn validate(&self, params: &Record) -> CoreResult<Record> {
        match self {
            IoShape::Input(schema, mode) => schema.validate(*mode, params),
            IoShape::Any | IoShape::Output(_) => Ok(params.clone()),
        }
    }

    /// Shape a result for the wire
    pub fn shape(&self, value: Value) -> Value {
        match self {
            IoShape::Output(schema) => schema.shape_output(value),
            IoShape::Any | IoShape::Input(..) => value,
        }
    }
}

impl fmt::Debug for IoShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoShape::Any => f.write_str("Any"),
            IoShape::Input(schema, mode) => write!(f, "Input({}, {:?})", schema.name, mode),
            IoShape::Output(schema) => write!(f, "Output({})", schema.name),
        }
    }
}

/// A bound operation
pub struct OperationSpec {
    /// Canonical model name
    pub model: String,
    /// Canonical verb alias
    pub verb: String,
    pub target: Target,
    pub arity: Arity,
    pub handler: Arc<dyn OperationHandler>,
    pub input: IoShape,
    pub output: IoShape,
    /// Run before PRE_TX_BEGIN, after `secdeps`
    pub deps: Vec<Arc<dyn Hook>>,
    /// Run first; typically authorization checks
    pub secdeps: Vec<Arc<dyn Hook>>,
    /// HTTP status of a successful call
    pub status: u16,
    /// Schema of the owning model
    pub schema: Arc<ModelSchema>,
}

impl OperationSpec {
    /// RPC method name, `Model.verb`
    pub fn rpc_method(&self) -> String {
        format!("{}.{}", self.model, self.verb)
    }
}

impl fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSpec")
            .field("model", &self.model)
            .field("verb", &self.verb)
            .field("target", &self.target)
            .field("arity", &self.arity)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("deps", &self.deps.len())
            .field("secdeps", &self.secdeps.len())
            .finish()
    }
}

/// A user-declared operation bound next to the CRUD verbs
///
/// Naming a CRUD alias together with [`CustomOp::replace_existing`] swaps the
/// handler of that CRUD operation while keeping its routes.
#[derive(Clone)]
pub struct CustomOp {
    pub verb: String,
    pub arity: Arity,
    pub handler: Arc<dyn OperationHandler>,
    pub input: Option<ShapeMode>,
    pub deps: Vec<Arc<dyn Hook>>,
    pub secdeps: Vec<Arc<dyn Hook>>,
    pub status: u16,
    pub replace_existing: bool,
}

impl CustomOp {
    pub fn new(verb: impl Into<String>, arity: Arity, handler: Arc<dyn OperationHandler>) -> Self {
        Self {
            verb: verb.into(),
            arity,
            handler,
            input: None,
            deps: Vec::new(),
            secdeps: Vec::new(),
            status: 200,
            replace_existing: false,
        }
    }

    /// Validate params with the model schema in this mode
    pub fn with_input(mut self, mode: ShapeMode) -> Self {
        self.input = Some(mode);
        self
    }

    pub fn dep(mut self, hook: Arc<dyn Hook>) -> Self {
        self.deps.push(hook);
        self
    }

    pub fn secdep(mut self, hook: Arc<dyn Hook>) -> Self {
        self.secdeps.push(hook);
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Allow rebinding an already bound verb
    pub fn replace_existing(mut self) -> Self {
        self.replace_existing = true;
        self
    }
}

/// Dependencies attached to every CRUD operation of a model
#[derive(Clone, Default)]
pub struct BindOptions {
    pub deps: Vec<Arc<dyn Hook>>,
    pub secdeps: Vec<Arc<dyn Hook>>,
}

impl BindOptions {
    pub fn dep(mut self, hook: Arc<dyn Hook>) -> Self {
        self.deps.push(hook);
        self
    }

    pub fn secdep(mut self, hook: Arc<dyn Hook>) -> Self {
        self.secdeps.push(hook);
        self
    }
}
