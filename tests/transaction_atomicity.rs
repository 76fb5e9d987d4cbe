//! Transaction Atomicity Tests
//!
//! Tests for the begin/commit/rollback boundary the executor drives:
//! - Nothing a failed call wrote becomes visible
//! - Commit happens once, after PRE_COMMIT
//! - Savepoints inside a handler
//! - Cancelled calls roll back

mod common;

use std::time::Duration;

use serde_json::{json, Value};

use common::*;
use opkernel::core::error::RPC_INTERNAL_ERROR;
use opkernel::core::{handler_fn, hook_fn, Arity, CoreError, CustomOp, HookScope, Phase};
use opkernel::dispatch::{rest, CallOptions, RestRequest};
use opkernel::storage::{Database, InMemoryDatabase, Record};

fn row(name: &str) -> Record {
    json!({"name": name}).as_object().cloned().unwrap()
}

// =============================================================================
// Rollback Tests
// =============================================================================

/// A PRE_COMMIT failure discards the handler's write.
#[tokio::test]
async fn test_pre_commit_failure_leaves_no_row() {
    let database = InMemoryDatabase::new();
    let mut builder = builder(&database);
    fail_at(&mut builder, Phase::PreCommit, CoreError::forbidden("frozen"));
    let api = builder.build();

    let err = api
        .rest(RestRequest::new("POST", "/items").with_body(json!({"name": "x"})))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 403);
    assert_eq!(database.count("Item"), 0);
}

/// A bulk create is all or nothing.
#[tokio::test]
async fn test_bulk_create_conflict_discards_whole_batch() {
    let database = InMemoryDatabase::new();
    let api = builder(&database).build();

    let err = api
        .rest(
            RestRequest::new("POST", "/items/bulk")
                .with_body(json!([{"name": "a"}, {"name": "b"}, {"name": "a"}])),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 409);
    assert_eq!(database.count("Item"), 0);
}

/// A handler fault after its own writes rolls them back.
#[tokio::test]
async fn test_handler_fault_rolls_back_partial_writes() {
    let database = InMemoryDatabase::new();
    let mut builder = builder(&database);
    builder
        .bind_with(
            "Item",
            CustomOp::new(
                "import",
                Arity::Collection,
                handler_fn(|ctx| {
                    Box::pin(async move {
                        ctx.db.add("Item", "i1", row("one")).await?;
                        ctx.db.add("Item", "i2", row("two")).await?;
                        Err(CoreError::bad_request("third row malformed"))
                    })
                }),
            ),
        )
        .unwrap();
    let api = builder.build();

    let reply = api.rpc(json!({"method": "Item.import", "id": 1})).await;

    assert_eq!(reply["error"]["code"], 400);
    assert_eq!(database.count("Item"), 0);
}

/// POST_COMMIT runs after the commit, so its failure cannot undo the write.
#[tokio::test]
async fn test_post_commit_failure_keeps_committed_row() {
    let database = InMemoryDatabase::new();
    let log = new_log();
    let mut builder = builder(&database);
    record_phases(&mut builder, &log);
    fail_at(&mut builder, Phase::PostCommit, CoreError::internal("mailer down"));
    let api = builder.build();

    let reply = api
        .rpc(json!({"method": "Item.create", "params": {"name": "x"}, "id": 1}))
        .await;

    assert_eq!(reply["error"]["message"], "Internal error");
    assert_eq!(database.count("Item"), 1);
    let phases = logged(&log);
    assert!(!phases.contains(&"ON_ROLLBACK".to_string()));
    assert_eq!(phases.last().map(String::as_str), Some("ON_ERROR"));
}

/// A commit-time unique violation surfaces as a conflict.
#[tokio::test]
async fn test_unique_violation_is_conflict() {
    let database = InMemoryDatabase::new();
    let api = builder(&database).build();

    api.rpc(json!({"method": "Item.create", "params": {"name": "dup"}}))
        .await;
    let reply = api
        .rpc(json!({"method": "Item.create", "params": {"name": "dup"}, "id": 2}))
        .await;

    assert_eq!(reply["error"]["code"], 409);
    assert_eq!(database.count("Item"), 1);
}

/// A row published by another session between PRE_COMMIT and commit makes
/// the commit itself fail. The failed commit already ended the transaction,
/// so only ON_ERROR runs.
#[tokio::test]
async fn test_commit_time_conflict_takes_error_path() {
    let database = InMemoryDatabase::new();
    let log = new_log();
    let mut builder = builder(&database);
    record(&mut builder, Phase::OnRollback, HookScope::global(), "ON_ROLLBACK", &log);
    record(&mut builder, Phase::OnError, HookScope::global(), "ON_ERROR", &log);
    let rival = database.clone();
    builder.hook(
        Phase::PreCommit,
        HookScope::op("Item", "create"),
        hook_fn(move |_ctx| {
            let rival = rival.clone();
            Box::pin(async move {
                let mut session = rival.session();
                session.begin().await?;
                session.add("Item", "rival", row("x")).await?;
                session.commit().await?;
                Ok(())
            })
        }),
    );
    let api = builder.build();

    let reply = api
        .rpc(json!({"method": "Item.create", "params": {"name": "x"}, "id": 1}))
        .await;

    assert_eq!(reply["error"]["code"], 409);
    assert_eq!(logged(&log), vec!["ON_ERROR"]);
    assert_eq!(database.count("Item"), 1);
    assert_eq!(database.rows("Item")[0]["name"], "x");
}

// =============================================================================
// Savepoint Tests
// =============================================================================

/// A handler may open a savepoint and roll back only its own level.
#[tokio::test]
async fn test_handler_savepoint_rollback_keeps_outer_writes() {
    let database = InMemoryDatabase::new();
    let mut builder = builder(&database);
    builder
        .bind_with(
            "Item",
            CustomOp::new(
                "seed",
                Arity::Collection,
                handler_fn(|ctx| {
                    Box::pin(async move {
                        ctx.db.add("Item", "kept", row("kept")).await?;

                        ctx.db.begin().await?;
                        ctx.db.add("Item", "dropped", row("dropped")).await?;
                        ctx.db.rollback().await?;

                        ctx.db.begin().await?;
                        ctx.db.add("Item", "released", row("released")).await?;
                        ctx.db.commit().await?;

                        Ok(json!({"depth": ctx.db.depth()}))
                    })
                }),
            ),
        )
        .unwrap();
    let api = builder.build();

    let reply = api.rpc(json!({"method": "Item.seed", "id": 1})).await;

    assert_eq!(reply["result"]["depth"], 1);
    let names: Vec<Value> = database
        .rows("Item")
        .into_iter()
        .map(|r| r["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("kept"), json!("released")]);
}

/// A savepoint a hook opens and never closes must not stand in for the
/// transaction: the call fails and every level is rolled back.
#[tokio::test]
async fn test_unclosed_savepoint_fails_the_call() {
    let database = InMemoryDatabase::new();
    let log = new_log();
    let mut builder = builder(&database);
    record(&mut builder, Phase::OnRollback, HookScope::global(), "ON_ROLLBACK", &log);
    record(&mut builder, Phase::OnError, HookScope::global(), "ON_ERROR", &log);
    builder.hook(
        Phase::PreHandler,
        HookScope::op("Item", "create"),
        hook_fn(|ctx| {
            Box::pin(async move {
                ctx.db.begin().await?;
                Ok(())
            })
        }),
    );
    let api = builder.build();

    let reply = api
        .rpc(json!({"method": "Item.create", "params": {"name": "x"}, "id": 1}))
        .await;

    assert_eq!(reply["error"]["code"], RPC_INTERNAL_ERROR);
    assert_eq!(reply["result"], Value::Null);
    assert_eq!(logged(&log), vec!["ON_ROLLBACK", "ON_ERROR"]);
    assert_eq!(database.count("Item"), 0);
}

// =============================================================================
// Cancellation Tests
// =============================================================================

/// A call that outlives its timeout is cancelled and rolled back.
#[tokio::test]
async fn test_timeout_cancels_and_rolls_back() {
    let database = InMemoryDatabase::new();
    let log = new_log();
    let mut builder = builder(&database);
    record(&mut builder, Phase::OnError, HookScope::global(), "ON_ERROR", &log);
    builder
        .bind_with(
            "Item",
            CustomOp::new(
                "slow",
                Arity::Collection,
                handler_fn(|ctx| {
                    Box::pin(async move {
                        ctx.db.add("Item", "late", row("late")).await?;
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(Value::Null)
                    })
                }),
            ),
        )
        .unwrap();
    let api = builder.build();

    let err = rest::dispatch(
        api.executor(),
        RestRequest::new("POST", "/items/slow"),
        CallOptions::with_timeout(Duration::from_millis(20)),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), 504);
    assert_eq!(logged(&log), vec!["ON_ERROR"]);
    assert_eq!(database.count("Item"), 0);
}
