//! RPC Envelope Tests
//!
//! Tests for the RPC gateway wire format:
//! - Reply envelope shape and id echo
//! - Error code table (protocol codes and typed fault statuses)
//! - Batches

mod common;

use serde_json::{json, Value};

use common::*;
use opkernel::core::error::{
    RPC_INTERNAL_ERROR, RPC_INVALID_REQUEST, RPC_METHOD_NOT_FOUND, RPC_PARSE_ERROR,
};
use opkernel::core::{named_hook, CoreError, HookScope, Phase};
use opkernel::dispatch::{rpc, CallOptions};
use opkernel::storage::InMemoryDatabase;

// =============================================================================
// Envelope Shape Tests
// =============================================================================

/// Replies always carry jsonrpc, result, error and the request id.
#[tokio::test]
async fn test_reply_shape() {
    let (api, _database, _log) = recorded_api();

    for id in [json!(1), json!("abc"), Value::Null] {
        let reply = api
            .rpc(json!({"jsonrpc": "2.0", "method": "Item.list", "id": id}))
            .await;
        let obj = reply.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        assert_eq!(reply["jsonrpc"], "2.0");
        assert_eq!(reply["id"], id);
        assert_eq!(reply["result"], json!([]));
        assert_eq!(reply["error"], Value::Null);
    }
}

/// A request without an id is answered with a null id.
#[tokio::test]
async fn test_missing_id_replies_null() {
    let (api, _database, _log) = recorded_api();
    let reply = api.rpc(json!({"method": "Item.list"})).await;
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"], Value::Null);
}

// =============================================================================
// Error Code Tests
// =============================================================================

/// Protocol faults never reach the executor.
#[tokio::test]
async fn test_protocol_errors_run_no_hooks() {
    let (api, _database, log) = recorded_api();

    let cases = vec![
        (json!({"method": "Item.fly", "id": 1}), RPC_METHOD_NOT_FOUND),
        (json!({"method": "Nope.list", "id": 2}), RPC_METHOD_NOT_FOUND),
        (json!({"method": "list", "id": 3}), RPC_METHOD_NOT_FOUND),
        (json!({"id": 4}), RPC_METHOD_NOT_FOUND),
        (json!({"method": 7, "id": 5}), RPC_INVALID_REQUEST),
        (json!({"jsonrpc": "3.0", "method": "Item.list", "id": 6}), RPC_INVALID_REQUEST),
        (json!({"method": "Item.list", "params": "x", "id": 7}), RPC_INVALID_REQUEST),
        (json!("Item.list"), RPC_INVALID_REQUEST),
    ];

    for (request, code) in cases {
        let reply = api.rpc(request.clone()).await;
        assert_eq!(reply["error"]["code"], json!(code), "{request}");
        assert_eq!(reply["result"], Value::Null);
    }
    assert!(logged(&log).is_empty());
}

/// Typed faults keep their HTTP status as the RPC code.
#[tokio::test]
async fn test_typed_faults_keep_status() {
    let database = InMemoryDatabase::new();
    let mut builder = builder(&database);
    builder.hook(
        Phase::PreHandler,
        HookScope::op("Item", "delete"),
        named_hook("deny", |_ctx| Err(CoreError::forbidden("no deletes"))),
    );
    builder.hook(
        Phase::PreHandler,
        HookScope::op("Item", "clear"),
        named_hook("auth", |_ctx| Err(CoreError::AuthRequired)),
    );
    let api = builder.build();

    api.rpc(json!({"method": "Item.create", "params": {"name": "taken"}}))
        .await;

    let cases = vec![
        (json!({"method": "Item.delete", "params": {"id": "1"}}), 403),
        (json!({"method": "Item.clear"}), 401),
        (json!({"method": "Item.read", "params": {"id": "ghost"}}), 404),
        (json!({"method": "Item.create", "params": {"name": "taken"}}), 409),
        (json!({"method": "Item.create", "params": {"name": 5}}), 422),
    ];
    for (request, code) in cases {
        let reply = api.rpc(request.clone()).await;
        assert_eq!(reply["error"]["code"], code, "{request}");
    }
}

/// Internal faults are masked on the wire.
#[tokio::test]
async fn test_internal_fault_is_masked() {
    let database = InMemoryDatabase::new();
    let mut builder = builder(&database);
    fail_at(
        &mut builder,
        Phase::PostHandler,
        CoreError::internal("connection string leaked here"),
    );
    let api = builder.build();

    let reply = api.rpc(json!({"method": "Item.list", "id": 1})).await;

    assert_eq!(reply["error"]["code"], RPC_INTERNAL_ERROR);
    assert_eq!(reply["error"]["message"], "Internal error");
    assert!(reply["error"].get("data").is_none());
}

/// Malformed JSON is a parse error with a null id.
#[tokio::test]
async fn test_parse_error() {
    let (api, _database, log) = recorded_api();

    let reply = rpc::handle_bytes(api.executor(), b"{\"method\": ", CallOptions::default()).await;

    assert_eq!(reply["error"]["code"], RPC_PARSE_ERROR);
    assert_eq!(reply["id"], Value::Null);
    assert!(logged(&log).is_empty());
}

// =============================================================================
// Batch Tests
// =============================================================================

/// Batch elements run in order, each in its own transaction.
#[tokio::test]
async fn test_batch_is_sequential_and_independent() {
    let (api, database, _log) = recorded_api();

    let reply = api
        .rpc(json!([
            {"method": "Item.create", "params": {"name": "a"}, "id": 1},
            {"method": "Item.create", "params": {"name": "a"}, "id": 2},
            {"method": "Item.nope", "id": 3},
            {"method": "Item.create", "params": {"name": "b"}, "id": 4}
        ]))
        .await;

    let replies = reply.as_array().unwrap();
    let codes: Vec<Value> = replies.iter().map(|r| r["error"]["code"].clone()).collect();
    assert_eq!(
        codes,
        vec![Value::Null, json!(409), json!(RPC_METHOD_NOT_FOUND), Value::Null]
    );
    let ids: Vec<Value> = replies.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4)]);
    assert_eq!(database.count("Item"), 2);
}

/// An empty batch is an invalid request.
#[tokio::test]
async fn test_empty_batch() {
    let (api, _database, _log) = recorded_api();
    let reply = api.rpc(json!([])).await;
    assert_eq!(reply["error"]["code"], RPC_INVALID_REQUEST);
}
