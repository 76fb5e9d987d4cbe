//! Nested REST adapter
//!
//! Same routes as [`super::rest`], mounted under a parent resource:
//! `/<parent>/<parent_id>/<res>[/<id>][/<verb>]`. The parent id from the path
//! is injected into params under the model's parent key, overriding any
//! value in the body. Phase behavior is identical to the direct adapter.

use serde_json::Value;

use super::rest::{invoke, params_for, resolve_tail};
use super::{CallOptions, RestRequest};
use crate::core::{CoreError, CoreResult, Executor, RequestMeta, Response, Surface};
use crate::schema::ROWS_PARAM;
use crate::storage::Record;

/// Put the parent id into params; the path value wins
pub fn inject_parent(params: &mut Record, key: &str, parent_id: &str) {
    let value = Value::String(parent_id.to_string());

    // Rows of a bulk create carry the key too
    if let Some(Value::Array(rows)) = params.get_mut(ROWS_PARAM) {
        for row in rows.iter_mut() {
            if let Some(obj) = row.as_object_mut() {
                obj.insert(key.to_string(), value.clone());
            }
        }
    }
    params.insert(key.to_string(), value);
}

/// Route and run a nested REST request
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
    let unrouted = || CoreError::MethodNotFound(format!("{method} {path}"));

    let [parent_resource, parent_id, resource, tail @ ..] = segments.as_slice() else {
        return Err(unrouted());
    };

    let model = executor
        .operations()
        .model_by_resource(resource)
        .ok_or_else(unrouted)?;
    let parent = model
        .parent
        .as_ref()
        .filter(|p| p.resource.eq_ignore_ascii_case(parent_resource))
        .ok_or_else(unrouted)?;

    let resolved = resolve_tail(executor.operations(), &model, &method, tail)?;
    let mut params = params_for(&resolved.spec, body, &query, resolved.id.as_deref())?;
    inject_parent(&mut params, &parent.key, parent_id);

    let meta = RequestMeta::new(Surface::Nested, Some(&method), path.clone());
    invoke(executor, &resolved.spec, meta, params, options).await
}
