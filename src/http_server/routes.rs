//! Operation HTTP Routes
//!
//! Mounts every route of the operation registry on an axum router, plus the
//! RPC endpoint and `/health`. Handlers only translate the HTTP request and
//! hand it to the dispatch adapters.
//!
//! Path parameters are renamed by position (`:p2`, `:p4`, ..) when mounted,
//! since the router requires one name per position while `/tenants/:id` and
//! `/tenants/:tenant_id/items` share a prefix.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post, MethodFilter, MethodRouter};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use super::errors::RestError;
use crate::core::{
    CoreError, CoreResult, Executor, OperationRegistry, OperationSpec, RegistryError,
    RegistryResult, RequestMeta, Response, Surface,
};
use crate::dispatch::{nested, rest, rpc, CallOptions};
use crate::schema::ID_FIELD;
use crate::storage::Record;

/// Path of the health check route
pub const HEALTH_PATH: &str = "/health";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check route
pub fn health_routes() -> Router {
    Router::new().route(HEALTH_PATH, get(health_handler))
}

async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Single RPC endpoint at `path`
pub fn rpc_routes(executor: Arc<Executor>, path: &str, options: CallOptions) -> Router {
    Router::new().route(
        path,
        post(move |body: Bytes| {
            let executor = Arc::clone(&executor);
            async move { Json(rpc::handle_bytes(&executor, &body, options).await) }
        }),
    )
}

/// REST and nested routes for every bound operation
pub fn operation_routes(executor: Arc<Executor>, options: CallOptions) -> Router {
    let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();

    for route in executor.operations().rest_routes() {
        let (path, params) = mount_path(&route.path);
        let Some(filter) = method_filter(route.method) else {
            continue;
        };
        let endpoint = OperationEndpoint {
            executor: Arc::clone(&executor),
            spec: Arc::clone(&route.spec),
            surface: route.surface,
            params: Arc::new(params),
            options,
        };
        let handler = move |method: Method,
                            raw_path: axum::http::Uri,
                            path: Option<Path<HashMap<String, String>>>,
                            Query(query): Query<HashMap<String, String>>,
                            body: Bytes| {
            let endpoint = endpoint.clone();
            async move {
                let path_params = path.map(|Path(p)| p).unwrap_or_default();
                match endpoint
                    .call(method.as_str(), raw_path.path(), path_params, query, body)
                    .await
                {
                    Ok(response) => render(response),
                    Err(err) => RestError(err).into_response(),
                }
            }
        };

        let method_router = by_path.remove(&path).unwrap_or_else(MethodRouter::new);
        by_path.insert(path, method_router.on(filter, handler));
    }

    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(&path, method_router)
        })
}

/// Unrouted requests get the JSON 404 body
pub async fn not_found_handler(method: Method, uri: axum::http::Uri) -> RestError {
    RestError(CoreError::MethodNotFound(format!("{method} {}", uri.path())))
}

#[derive(Clone)]
struct OperationEndpoint {
    executor: Arc<Executor>,
    spec: Arc<OperationSpec>,
    surface: Surface,
    /// Mounted param name to registry param name
    params: Arc<Vec<(String, String)>>,
    options: CallOptions,
}

impl OperationEndpoint {
    async fn call(
        &self,
        method: &str,
        path: &str,
        path_params: HashMap<String, String>,
        query: HashMap<String, String>,
        body: Bytes,
    ) -> CoreResult<Response> {
        let body = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_slice::<Value>(&body)?)
        };
        let query: Record = query
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();

        let named: HashMap<&str, &str> = self
            .params
            .iter()
            .filter_map(|(mounted, name)| {
                path_params
                    .get(mounted)
                    .map(|value| (name.as_str(), value.as_str()))
            })
            .collect();

        let mut params = rest::params_for(&self.spec, body, &query, named.get(ID_FIELD).copied())?;
        if self.surface == Surface::Nested {
            if let Some(parent) = &self.spec.schema.parent {
                let parent_id = named.get(parent.key.as_str()).copied().unwrap_or_default();
                nested::inject_parent(&mut params, &parent.key, parent_id);
            }
        }

        let meta = RequestMeta::new(self.surface, Some(method), path);
        rest::invoke(&self.executor, &self.spec, meta, params, self.options).await
    }
}

fn render(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    let headers = response.headers.clone();
    let mut http = (status, Json(response.into_body())).into_response();
    for (name, value) in headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                http.headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header"),
        }
    }
    http
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    match method {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "PATCH" => Some(MethodFilter::PATCH),
        "DELETE" => Some(MethodFilter::DELETE),
        _ => None,
    }
}

/// Reject a route table the router cannot mount
///
/// Generated routes may not take `/health` or the RPC path, and no two may
/// share a method and mounted path.
pub fn check_routes(ops: &OperationRegistry, rpc_path: &str) -> RegistryResult<()> {
    let reserved = [HEALTH_PATH, rpc_path];
    let mut mounted: HashMap<(&'static str, String), String> = HashMap::new();

    for route in ops.rest_routes() {
        let (path, _) = mount_path(&route.path);
        if reserved.contains(&path.as_str()) {
            return Err(RegistryError::RouteConflict(format!(
                "{} {} of {} takes a reserved path",
                route.method,
                route.path,
                route.spec.rpc_method()
            )));
        }
        if let Some(previous) = mounted.insert((route.method, path), route.spec.rpc_method()) {
            return Err(RegistryError::RouteConflict(format!(
                "{} {} is bound to both {previous} and {}",
                route.method,
                route.path,
                route.spec.rpc_method()
            )));
        }
    }
    Ok(())
}

/// Rename `:name` segments to `:p<position>`
fn mount_path(path: &str) -> (String, Vec<(String, String)>) {
    let mut params = Vec::new();
    let mounted = path
        .split('/')
        .enumerate()
        .map(|(position, segment)| match segment.strip_prefix(':') {
            Some(name) => {
                let alias = format!("p{position}");
                params.push((alias.clone(), name.to_string()));
                format!(":{alias}")
            }
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/");
    (mounted, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{handler_fn, Arity, CustomOp};
    use crate::schema::ModelSchema;

    #[test]
    fn test_mount_path() {
        let (path, params) = mount_path("/tenants/:tenant_id/items/:id/archive");
        assert_eq!(path, "/tenants/:p2/items/:p4/archive");
        assert_eq!(
            params,
            vec![
                ("p2".to_string(), "tenant_id".to_string()),
                ("p4".to_string(), "id".to_string()),
            ]
        );

        let (path, params) = mount_path("/items");
        assert_eq!(path, "/items");
        assert!(params.is_empty());
    }

    fn registry(schemas: Vec<ModelSchema>) -> OperationRegistry {
        let mut ops = OperationRegistry::new();
        for schema in schemas {
            ops.bind(schema).unwrap();
        }
        ops
    }

    #[test]
    fn test_check_routes_accepts_nested_table() {
        let ops = registry(vec![
            ModelSchema::new("Tenant"),
            ModelSchema::new("Item").parent("tenants", "tenant_id"),
        ]);
        assert!(check_routes(&ops, "/rpc").is_ok());
    }

    #[test]
    fn test_check_routes_rejects_reserved_paths() {
        let ops = registry(vec![ModelSchema::new("Health").resource("health")]);
        assert!(matches!(
            check_routes(&ops, "/rpc"),
            Err(RegistryError::RouteConflict(_))
        ));

        let ops = registry(vec![ModelSchema::new("Call").resource("rpc")]);
        assert!(matches!(
            check_routes(&ops, "/rpc"),
            Err(RegistryError::RouteConflict(_))
        ));
        assert!(check_routes(&ops, "/gateway").is_ok());
    }

    #[test]
    fn test_check_routes_rejects_shadowed_nested_route() {
        let mut ops = registry(vec![
            ModelSchema::new("Tenant"),
            ModelSchema::new("Item").parent("tenants", "tenant_id"),
        ]);
        ops.bind_with(
            "Tenant",
            CustomOp::new(
                "items",
                Arity::Member,
                handler_fn(|_ctx| Box::pin(async move { Ok(Value::Null) })),
            ),
        )
        .unwrap();

        let err = check_routes(&ops, "/rpc").unwrap_err();
        assert!(err.to_string().contains("/tenants/"));
    }

    #[test]
    fn test_method_filter() {
        assert!(method_filter("PATCH").is_some());
        assert!(method_filter("TRACE").is_none());
    }

    #[test]
    fn test_render_copies_headers() {
        let mut response = Response::new(201, serde_json::json!({"ok": true}));
        response
            .headers
            .insert("x-request-id".to_string(), "abc".to_string());
        response
            .headers
            .insert("bad header".to_string(), "x".to_string());

        let http = render(response);
        assert_eq!(http.status(), StatusCode::CREATED);
        assert_eq!(http.headers()["x-request-id"], "abc");
        assert_eq!(http.headers().len(), 2); // content-type + x-request-id
    }
}
