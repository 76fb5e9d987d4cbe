//! Direct REST adapter
//!
//! | Method | Path                   | Verb          |
//! |--------|------------------------|---------------|
//! | POST   | `/<res>`               | create        |
//! | GET    | `/<res>`               | list          |
//! | DELETE | `/<res>`               | clear         |
//! | GET    | `/<res>/<id>`          | read          |
//! | PATCH  | `/<res>/<id>`          | update        |
//! | PUT    | `/<res>/<id>`          | replace       |
//! | DELETE | `/<res>/<id>`          | delete        |
//! | POST   | `/<res>/bulk`          | bulk_create   |
//! | DELETE | `/<res>/bulk`          | bulk_delete   |
//! | POST   | `/<res>/<verb>`        | custom        |
//! | POST   | `/<res>/<id>/<verb>`   | custom member |

use std::sync::Arc;

use serde_json::Value;

use super::{context_for, execute, CallOptions, RestRequest};
use crate::core::registry::BULK_SEGMENT;
use crate::core::{
    Arity, CoreError, CoreResult, Executor, OperationRegistry, OperationSpec, RequestMeta,
    Response, Surface, Target,
};
use crate::schema::{ModelSchema, IDS_PARAM, ID_FIELD, ROWS_PARAM};
use crate::storage::Record;

/// CRUD target for an HTTP method on a collection or member path
pub fn verb_for(method: &str, has_id: bool) -> Option<Target> {
    match (method.to_ascii_uppercase().as_str(), has_id) {
        ("POST", false) => Some(Target::Create),
        ("GET", false) => Some(Target::List),
        ("DELETE", false) => Some(Target::Clear),
        ("GET", true) => Some(Target::Read),
        ("PATCH", true) => Some(Target::Update),
        ("PUT", true) => Some(Target::Replace),
        ("DELETE", true) => Some(Target::Delete),
        _ => None,
    }
}

/// A path resolved to a bound operation
#[derive(Debug, Clone)]
pub struct Resolved {
    pub spec: Arc<OperationSpec>,
    /// Member id taken from the path
    pub id: Option<String>,
}

/// Resolve the segments after `/<res>` for a bound model
pub fn resolve_tail(
    ops: &OperationRegistry,
    model: &ModelSchema,
    method: &str,
    tail: &[&str],
) -> CoreResult<Resolved> {
    let method = method.to_ascii_uppercase();
    let unrouted = || {
        CoreError::MethodNotFound(format!(
            "{method} /{}/{}",
            model.resource_name(),
            tail.join("/")
        ))
    };
    let crud = |target: Option<Target>, id: Option<&str>| {
        target
            .and_then(|t| ops.by_target(&model.name, t))
            .map(|spec| Resolved {
                spec,
                id: id.map(str::to_string),
            })
            .ok_or_else(unrouted)
    };
    let custom = |verb: &str, arity: Arity, id: Option<&str>| {
        ops.get(&model.name, verb)
            .filter(|spec| spec.target == Target::Custom && spec.arity == arity)
            .map(|spec| Resolved {
                spec,
                id: id.map(str::to_string),
            })
            .ok_or_else(unrouted)
    };

    match tail {
        [] => crud(verb_for(&method, false), None),
        [segment] if segment.eq_ignore_ascii_case(BULK_SEGMENT) => match method.as_str() {
            "POST" => crud(Some(Target::BulkCreate), None),
            "DELETE" => crud(Some(Target::BulkDelete), None),
            _ => Err(unrouted()),
        },
        [verb] if method == "POST" => custom(*verb, Arity::Collection, None),
        [id] => crud(verb_for(&method, true), Some(*id)),
        [id, verb] if method == "POST" => custom(*verb, Arity::Member, Some(*id)),
        _ => Err(unrouted()),
    }
}

/// Merge body, query pairs and the path id into call params
///
/// The path id wins over an id in the body. Query pairs only fill keys the
/// body left unset. A bare array body is accepted on bulk routes.
pub fn params_for(
    spec: &OperationSpec,
    body: Option<Value>,
    query: &Record,
    id: Option<&str>,
) -> CoreResult<Record> {
    let mut params = match body {
        None | Some(Value::Null) => Record::new(),
        Some(Value::Object(obj)) => obj,
        Some(Value::Array(items)) if spec.target == Target::BulkCreate => {
            let mut params = Record::new();
            params.insert(ROWS_PARAM.to_string(), Value::Array(items));
            params
        }
        Some(Value::Array(items)) if spec.target == Target::BulkDelete => {
            let mut params = Record::new();
            params.insert(IDS_PARAM.to_string(), Value::Array(items));
            params
        }
        Some(_) => return Err(CoreError::bad_request("request body must be a JSON object")),
    };

    for (key, value) in query {
        params.entry(key.clone()).or_insert_with(|| value.clone());
    }
    if let Some(id) = id {
        params.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    }
    Ok(params)
}

/// Run a call to an already resolved operation
pub async fn invoke(
    executor: &Executor,
    spec: &OperationSpec,
    request: RequestMeta,
    params: Record,
    options: CallOptions,
) -> CoreResult<Response> {
    let mut ctx = context_for(executor, spec, request, params);
    execute(executor, &mut ctx, options).await
}

/// Route and run a direct REST request
pub async fn dispatch(
    executor: &Executor,
    request: RestRequest,
    options: CallOptions,
) -> CoreResult<Response> {
    let RestRequest {
        method,
        path,
        query,
        body,
    } = request;
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let (resource, tail) = segments
        .split_first()
        .ok_or_else(|| CoreError::MethodNotFound(format!("{method} {path}")))?;
    let model = executor
        .operations()
        .model_by_resource(resource)
        .ok_or_else(|| CoreError::MethodNotFound(format!("{method} {path}")))?;

    let resolved = resolve_tail(executor.operations(), &model, &method, tail)?;
    let params = params_for(&resolved.spec, body, &query, resolved.id.as_deref())?;
    let meta = RequestMeta::new(Surface::Rest, Some(&method), path.clone());

    invoke(executor, &resolved.spec, meta, params, options).await
}
