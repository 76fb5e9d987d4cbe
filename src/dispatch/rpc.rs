//! RPC envelope adapter
//!
//! Request: `{"jsonrpc": "2.0", "method": "Model.verb", "params": {..}, "id": ..}`
//! (`jsonrpc` optional). Reply:
//!
//! ```json
//! {"jsonrpc": "2.0", "result": {..}, "error": null, "id": ..}
//! {"jsonrpc": "2.0", "result": null, "error": {"code": -32601, "message": ".."}, "id": ..}
//! ```
//!
//! A JSON array is a batch: each element is handled in order with its own
//! context and transaction, and the replies come back as an array.

use serde_json::{json, Map, Value};

use super::{context_for, execute, CallOptions};
use crate::core::{CoreError, CoreResult, Executor, RequestMeta, RpcEnv, Surface};
use crate::storage::Record;

/// Protocol version echoed in every reply
pub const JSONRPC_VERSION: &str = "2.0";

/// Successful reply envelope
pub fn success_envelope(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "result": result,
        "error": null,
        "id": id,
    })
}

/// Failure reply envelope; internal details are masked
pub fn error_envelope(id: Value, err: &CoreError) -> Value {
    let mut error = Map::new();
    error.insert("code".into(), json!(err.rpc_code()));
    error.insert("message".into(), json!(err.public_message()));
    if let Some(data) = err.data() {
        error.insert("data".into(), data);
    }
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "result": null,
        "error": Value::Object(error),
        "id": id,
    })
}

/// Check envelope structure
pub fn parse_envelope(request: Value) -> CoreResult<RpcEnv> {
    let Value::Object(mut obj) = request else {
        return Err(CoreError::InvalidRequest(
            "request must be a JSON object".into(),
        ));
    };

    if let Some(version) = obj.get("jsonrpc") {
        if version.as_str() != Some(JSONRPC_VERSION) {
            return Err(CoreError::InvalidRequest(format!(
                "unsupported jsonrpc version {version}"
            )));
        }
    }

    let id = obj.remove("id").unwrap_or(Value::Null);
    let method = match obj.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        Some(Value::String(_)) | None => {
            return Err(CoreError::MethodNotFound("missing method".into()))
        }
        Some(_) => return Err(CoreError::InvalidRequest("method must be a string".into())),
    };
    let params = match obj.remove("params") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::Object(params)) => Value::Object(params),
        Some(_) => return Err(CoreError::InvalidRequest("params must be an object".into())),
    };

    Ok(RpcEnv { method, params, id })
}

/// Run one envelope and return the handler result
pub async fn call(executor: &Executor, env: RpcEnv, options: CallOptions) -> CoreResult<Value> {
    let spec = executor
        .operations()
        .rpc(&env.method)
        .ok_or_else(|| CoreError::MethodNotFound(env.method.clone()))?;

    let params: Record = env.params.as_object().cloned().unwrap_or_default();
    let meta = RequestMeta::new(Surface::Rpc, None, env.method.clone());
    let mut ctx = context_for(executor, &spec, meta, params).with_env(env);

    execute(executor, &mut ctx, options)
        .await
        .map(|response| response.into_body())
}

/// Handle one decoded request or batch
pub async fn handle_value(executor: &Executor, request: Value, options: CallOptions) -> Value {
    match request {
        Value::Array(batch) if batch.is_empty() => error_envelope(
            Value::Null,
            &CoreError::InvalidRequest("empty batch".into()),
        ),
        Value::Array(batch) => {
            let mut replies = Vec::with_capacity(batch.len());
            for request in batch {
                replies.push(handle_single(executor, request, options).await);
            }
            Value::Array(replies)
        }
        request => handle_single(executor, request, options).await,
    }
}

/// Handle a raw request body
pub async fn handle_bytes(executor: &Executor, body: &[u8], options: CallOptions) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(request) => handle_value(executor, request, options).await,
        Err(e) => error_envelope(Value::Null, &CoreError::Parse(e.to_string())),
    }
}

async fn handle_single(executor: &Executor, request: Value, options: CallOptions) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let outcome = match parse_envelope(request) {
        Ok(env) => call(executor, env, options).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(result) => success_envelope(id, result),
        Err(err) => {
            tracing::debug!(code = err.rpc_code(), error = %err, "rpc call failed");
            error_envelope(id, &err)
        }
    }
}
