//! # Dispatch Adapters
//!
//! Three ways into the same executor:
//!
//! - [`rest`]: direct resource routes, `/<resource>[/<id>][/<verb>]`
//! - [`nested`]: routes under a parent, `/<parent>/<parent_id>/<resource>...`
//! - [`rpc`]: a single endpoint taking `{method, params, id}` envelopes
//!
//! Adapters only translate transport input into a [`Context`] and the
//! executor's outcome back into a reply. They never run hooks themselves, so
//! the phases a call observes are the same whichever adapter produced it.
//! Nothing here depends on the HTTP framework.

pub mod nested;
pub mod rest;
pub mod rpc;

use std::time::Duration;

use serde_json::Value;

use crate::core::{Context, CoreResult, Executor, OperationSpec, RequestMeta, Response};
use crate::storage::Record;

/// Per-call execution options
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Abandon the call after this long
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// A REST call, independent of the HTTP framework
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: String,
    pub path: String,
    /// Decoded query-string pairs
    pub query: Record,
    pub body: Option<Value>,
}

impl RestRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query: Record::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// Non-empty path segments
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// Run a prepared context, honoring the call timeout
pub(crate) async fn execute(
    executor: &Executor,
    ctx: &mut Context,
    options: CallOptions,
) -> CoreResult<Response> {
    match options.timeout {
        Some(timeout) => {
            executor
                .run_cancellable(ctx, tokio::time::sleep(timeout))
                .await
        }
        None => executor.run(ctx).await,
    }
}

/// Fresh context for a call to `spec`
pub(crate) fn context_for(
    executor: &Executor,
    spec: &OperationSpec,
    request: RequestMeta,
    params: Record,
) -> Context {
    Context::new(
        request,
        executor.session(),
        spec.model.clone(),
        spec.verb.clone(),
        params,
    )
}
