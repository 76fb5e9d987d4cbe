//! Call Context
//!
//! Per-call state carried through the phase chain. Created once by an
//! adapter, exclusively owned by that call, and never shared.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use super::error::CoreError;
use crate::storage::{DbSession, Record};

/// Which adapter produced the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Rest,
    Nested,
    Rpc,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Rest => "rest",
            Surface::Nested => "nested",
            Surface::Rpc => "rpc",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport metadata of the inbound call
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Request ID for tracing
    pub request_id: Uuid,
    pub surface: Surface,
    /// HTTP method, when the call came over HTTP
    pub method: Option<String>,
    pub path: String,
}

impl RequestMeta {
    pub fn new(surface: Surface, method: Option<&str>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            surface,
            method: method.map(str::to_string),
            path: path.into(),
        }
    }
}

/// The parsed RPC envelope, present only for RPC calls
#[derive(Debug, Clone, PartialEq)]
pub struct RpcEnv {
    /// `Model.verb`
    pub method: String,
    pub params: Value,
    /// Correlation id echoed in the reply
    pub id: Value,
}

/// The assembled response
///
/// The body is fixed once assembled; `POST_RESPONSE` hooks may only change
/// status and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

/// Context carried through the phase chain
pub struct Context {
    pub request: RequestMeta,

    pub env: Option<RpcEnv>,

    /// Session the call's transaction runs on
    pub db: Box<dyn DbSession>,

    /// Canonical model name
    pub model: String,

    /// Canonical verb alias
    pub verb: String,

    /// Call params; validated before any hook runs
    pub params: Record,

    /// Handler output, visible to POST_HANDLER hooks onward
    pub result: Option<Value>,

    pub response: Option<Response>,

    /// Set only on failure, before ON_ERROR hooks run
    pub error: Option<CoreError>,

    /// Free-form hook-to-hook data
    pub scratch: HashMap<String, Value>,

    started_at: Instant,
}

impl Context {
    /// Create a new call context
    pub fn new(
        request: RequestMeta,
        db: Box<dyn DbSession>,
        model: impl Into<String>,
        verb: impl Into<String>,
        params: Record,
    ) -> Self {
        Self {
            request,
            env: None,
            db,
            model: model.into(),
            verb: verb.into(),
            params,
            result: None,
            response: None,
            error: None,
            scratch: HashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Attach the RPC envelope
    pub fn with_env(mut self, env: RpcEnv) -> Self {
        self.env = Some(env);
        self
    }

    pub fn surface(&self) -> Surface {
        self.request.surface
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }

    /// Read a param by name
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Read a param as a string
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("env", &self.env)
            .field("model", &self.model)
            .field("verb", &self.verb)
            .field("params", &self.params)
            .field("result", &self.result)
            .field("response", &self.response)
            .field("error", &self.error)
            .field("in_transaction", &self.db.in_transaction())
            .finish_non_exhaustive()
    }
}
