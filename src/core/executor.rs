//! # Phase-Chain Executor
//!
//! Runs one call through the fixed lifecycle:
//!
//! ```text
//! validate → secdeps → deps → PRE_TX_BEGIN → begin → PRE_HANDLER → handler
//!   → POST_HANDLER → PRE_COMMIT → commit → POST_COMMIT → response → POST_RESPONSE
//! ```
//!
//! The first failure after validation abandons the rest of the sequence and
//! takes the error path: roll back what this run opened, run ON_ROLLBACK, then
//! the failed phase's `ON_<PHASE>_ERROR` hooks, falling back to ON_ERROR when
//! that phase has none. Error-path hooks are best-effort and the original
//! fault is returned. Validation failures return immediately without running
//! any hook.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use super::context::{Context, Response};
use super::error::{CoreError, CoreResult};
use super::hooks::{Hook, HookRegistry};
use super::operation::OperationSpec;
use super::phase::Phase;
use super::registry::OperationRegistry;
use super::tx::TxBoundary;
use crate::storage::{Database, DbSession};

/// A fault on the success path and the error phase that handles it
struct Failure {
    err: CoreError,
    on_error: Phase,
}

impl Failure {
    /// Failure raised while running `phase`
    fn at(phase: Phase) -> impl FnOnce(CoreError) -> Self {
        move |err| Self {
            err,
            on_error: phase.error_phase(),
        }
    }
}

impl From<CoreError> for Failure {
    fn from(err: CoreError) -> Self {
        Self {
            err,
            on_error: Phase::OnError,
        }
    }
}

/// The phase-chain kernel shared by every adapter
pub struct Executor {
    hooks: Arc<HookRegistry>,
    ops: Arc<OperationRegistry>,
    database: Arc<dyn Database>,
}

impl Executor {
    pub fn new(
        hooks: Arc<HookRegistry>,
        ops: Arc<OperationRegistry>,
        database: Arc<dyn Database>,
    ) -> Self {
        Self {
            hooks,
            ops,
            database,
        }
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.ops
    }

    /// Open a session for a new call
    pub fn session(&self) -> Box<dyn DbSession> {
        self.database.session()
    }

    /// Run the call described by `ctx.model` and `ctx.verb`
    pub async fn run(&self, ctx: &mut Context) -> CoreResult<Response> {
        self.run_cancellable(ctx, std::future::pending()).await
    }

    /// Run a call, abandoning it when `cancel` completes first
    ///
    /// A cancelled call still takes the error path, so its transaction is
    /// rolled back and ON_ERROR hooks observe [`CoreError::Cancelled`].
    pub async fn run_cancellable<C>(&self, ctx: &mut Context, cancel: C) -> CoreResult<Response>
    where
        C: Future<Output = ()> + Send,
    {
        let spec = self.ops.get(&ctx.model, &ctx.verb).ok_or_else(|| {
            CoreError::MethodNotFound(format!("{}.{}", ctx.model, ctx.verb))
        })?;
        ctx.model = spec.model.clone();
        ctx.verb = spec.verb.clone();

        let span = tracing::info_span!(
            "operation",
            model = %spec.model,
            verb = %spec.verb,
            surface = %ctx.surface(),
            request_id = %ctx.request.request_id,
        );

        async move {
            match spec.input.validate(&ctx.params) {
                Ok(params) => ctx.params = params,
                Err(err) => {
                    tracing::debug!(error = %err, "input rejected");
                    ctx.error = Some(err.clone());
                    return Err(err);
                }
            }

            let mut tx = TxBoundary::new();
            let outcome = {
                let chain = self.chain(&spec, ctx, &mut tx);
                tokio::pin!(chain);
                tokio::pin!(cancel);
                tokio::select! {
                    biased;
                    outcome = &mut chain => outcome,
                    _ = &mut cancel => Err(Failure::from(CoreError::Cancelled(format!(
                        "{} cancelled before completion",
                        spec.rpc_method()
                    )))),
                }
            };

            match outcome {
                Ok(response) => {
                    tracing::debug!(
                        status = response.status,
                        elapsed_ms = ctx.elapsed_ms() as u64,
                        "operation completed"
                    );
                    Ok(response)
                }
                Err(failure) => Err(self.fail(ctx, &mut tx, failure).await),
            }
        }
        .instrument(span)
        .await
    }

    /// The success path
    async fn chain(
        &self,
        spec: &OperationSpec,
        ctx: &mut Context,
        tx: &mut TxBoundary,
    ) -> Result<Response, Failure> {
        for dep in spec.secdeps.iter().chain(spec.deps.iter()) {
            dep.call(ctx).await?;
        }

        self.step(Phase::PreTxBegin, ctx).await?;
        tx.begin(ctx.db.as_mut()).await?;

        self.step(Phase::PreHandler, ctx).await?;
        let result = spec.handler.handle(ctx).await.map_err(|err| Failure {
            err,
            on_error: Phase::OnHandlerError,
        })?;
        ctx.result = Some(result);
        self.step(Phase::PostHandler, ctx).await?;

        self.step(Phase::PreCommit, ctx).await?;
        tx.commit(ctx.db.as_mut()).await?;
        self.step(Phase::PostCommit, ctx).await?;

        let body = spec.output.shape(ctx.result.clone().unwrap_or(Value::Null));
        ctx.response = Some(Response::new(spec.status, body.clone()));
        self.step(Phase::PostResponse, ctx).await?;

        // Hooks may retouch status and headers; the body stays as assembled.
        let mut response = Response::new(spec.status, body);
        if let Some(touched) = ctx.response.take() {
            response.status = touched.status;
            response.headers = touched.headers;
        }
        ctx.response = Some(response.clone());
        Ok(response)
    }

    async fn step(&self, phase: Phase, ctx: &mut Context) -> Result<(), Failure> {
        let hooks = self.hooks.resolve(phase, &ctx.model, &ctx.verb);
        self.fire(phase, hooks, ctx).await.map_err(Failure::at(phase))
    }

    /// Run resolved hooks in order. The first failure aborts, unless the
    /// phase is best-effort, where failures are logged and skipped.
    async fn fire(
        &self,
        phase: Phase,
        hooks: Vec<Arc<dyn Hook>>,
        ctx: &mut Context,
    ) -> CoreResult<()> {
        tracing::debug!(phase = %phase, hooks = hooks.len(), "phase");

        for hook in hooks {
            if let Err(err) = hook.call(ctx).await {
                if phase.is_best_effort() {
                    tracing::warn!(phase = %phase, hook = hook.name(), error = %err, "hook failed");
                    continue;
                }
                tracing::debug!(phase = %phase, hook = hook.name(), error = %err, "hook failed");
                return Err(err);
            }
        }
        Ok(())
    }

    /// The error path
    async fn fail(&self, ctx: &mut Context, tx: &mut TxBoundary, failure: Failure) -> CoreError {
        let Failure { err, on_error } = failure;

        match tx.rollback(ctx.db.as_mut()).await {
            Ok(true) => {
                let hooks = self.hooks.resolve(Phase::OnRollback, &ctx.model, &ctx.verb);
                self.fire(Phase::OnRollback, hooks, ctx).await.ok();
            }
            Ok(false) => {}
            Err(rollback_err) => tracing::warn!(error = %rollback_err, "rollback failed"),
        }

        if err.is_internal() {
            tracing::error!(error = %err, "operation failed");
        } else {
            tracing::debug!(error = %err, status = err.status_code(), "operation failed");
        }

        ctx.error = Some(err.clone());
        let mut phase = on_error;
        let mut hooks = self.hooks.resolve(phase, &ctx.model, &ctx.verb);
        if hooks.is_empty() && phase != Phase::OnError {
            phase = Phase::OnError;
            hooks = self.hooks.resolve(phase, &ctx.model, &ctx.verb);
        }
        self.fire(phase, hooks, ctx).await.ok();
        err
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("hooks", &self.hooks)
            .field("operations", &self.ops.operations().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{RequestMeta, Surface};
    use crate::core::hooks::{named_hook, HookScope};
    use crate::schema::{FieldDef, FieldType, ModelSchema};
    use crate::storage::{InMemoryDatabase, Record};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Fixture {
        db: InMemoryDatabase,
        hooks: HookRegistry,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                db: InMemoryDatabase::new(),
                hooks: HookRegistry::new(),
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn trace_all(&mut self) {
            for phase in Phase::LIFECYCLE {
                let log = Arc::clone(&self.log);
                self.hooks.register(
                    phase,
                    HookScope::global(),
                    named_hook(phase.as_str(), move |_ctx| {
                        log.lock().unwrap().push(phase.as_str().to_string());
                        Ok(())
                    }),
                );
            }
        }

        fn fail_at(&mut self, phase: Phase) {
            self.hooks.register(
                phase,
                HookScope::op("Item", "create"),
                named_hook("boom", |_ctx| Err(CoreError::forbidden("blocked"))),
            );
        }

        fn executor(self) -> (Executor, InMemoryDatabase, Arc<Mutex<Vec<String>>>) {
            let mut ops = OperationRegistry::new();
            ops.bind(
                ModelSchema::new("Item").field(FieldDef::new("name", FieldType::String).required()),
            )
            .unwrap();
            let executor = Executor::new(
                Arc::new(self.hooks),
                Arc::new(ops),
                Arc::new(self.db.clone()),
            );
            (executor, self.db, self.log)
        }
    }

    fn create_ctx(executor: &Executor, params: serde_json::Value) -> Context {
        Context::new(
            RequestMeta::new(Surface::Rpc, None, "/rpc"),
            executor.session(),
            "item",
            "CREATE",
            params.as_object().cloned().unwrap_or_else(Record::new),
        )
    }

    fn logged(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_success_runs_main_sequence() {
        let mut fx = Fixture::new();
        fx.trace_all();
        let (executor, db, log) = fx.executor();

        let mut ctx = create_ctx(&executor, json!({"name": "x"}));
        let response = executor.run(&mut ctx).await.unwrap();

        let expected: Vec<String> = Phase::MAIN_SEQUENCE
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        assert_eq!(logged(&log), expected);
        assert_eq!(response.status, 201);
        assert_eq!(response.body()["name"], "x");
        assert_eq!(ctx.model, "Item");
        assert_eq!(ctx.verb, "create");
        assert_eq!(db.count("Item"), 1);
    }

    #[tokio::test]
    async fn test_pre_commit_failure_rolls_back() {
        let mut fx = Fixture::new();
        fx.trace_all();
        fx.fail_at(Phase::PreCommit);
        let (executor, db, log) = fx.executor();

        let mut ctx = create_ctx(&executor, json!({"name": "x"}));
        let err = executor.run(&mut ctx).await.unwrap_err();

        assert_eq!(err.status_code(), 403);
        assert_eq!(db.count("Item"), 0);
        assert!(!ctx.db.in_transaction());
        assert_eq!(
            logged(&log),
            vec!["PRE_TX_BEGIN", "PRE_HANDLER", "POST_HANDLER", "ON_ROLLBACK", "ON_ERROR"]
        );
        assert!(matches!(ctx.error, Some(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_validation_failure_runs_no_hooks() {
        let mut fx = Fixture::new();
        fx.trace_all();
        let (executor, _db, log) = fx.executor();

        let mut ctx = create_ctx(&executor, json!({"nme": "typo"}));
        let err = executor.run(&mut ctx).await.unwrap_err();

        assert_eq!(err.status_code(), 422);
        assert!(logged(&log).is_empty());
        assert!(!ctx.db.in_transaction());
    }

    #[tokio::test]
    async fn test_on_error_failure_is_swallowed() {
        let mut fx = Fixture::new();
        fx.fail_at(Phase::PreHandler);
        fx.hooks.register(
            Phase::OnError,
            HookScope::global(),
            named_hook("broken", |_ctx| Err(CoreError::internal("on_error broke"))),
        );
        let log = Arc::clone(&fx.log);
        fx.hooks.register(
            Phase::OnError,
            HookScope::global(),
            named_hook("after", move |ctx| {
                let seen = ctx.error.as_ref().map(|e| e.status_code()).unwrap_or(0);
                log.lock().unwrap().push(format!("after:{seen}"));
                Ok(())
            }),
        );
        let (executor, _db, log) = fx.executor();

        let mut ctx = create_ctx(&executor, json!({"name": "x"}));
        let err = executor.run(&mut ctx).await.unwrap_err();

        assert!(matches!(err, CoreError::Forbidden(_)));
        assert_eq!(logged(&log), vec!["after:403"]);
    }

    #[tokio::test]
    async fn test_post_commit_failure_keeps_commit() {
        let mut fx = Fixture::new();
        fx.trace_all();
        fx.fail_at(Phase::PostCommit);
        let (executor, db, log) = fx.executor();

        let mut ctx = create_ctx(&executor, json!({"name": "x"}));
        assert!(executor.run(&mut ctx).await.is_err());

        assert_eq!(db.count("Item"), 1);
        let log = logged(&log);
        assert!(!log.contains(&"ON_ROLLBACK".to_string()));
        assert_eq!(log.last().map(String::as_str), Some("ON_ERROR"));
    }

    #[tokio::test]
    async fn test_post_response_cannot_replace_body() {
        let mut fx = Fixture::new();
        fx.hooks.register(
            Phase::PostResponse,
            HookScope::global(),
            named_hook("meta", |ctx| {
                if let Some(response) = ctx.response.as_mut() {
                    response.headers.insert("x-seen".into(), "1".into());
                }
                ctx.response = ctx.response.take().map(|r| {
                    let mut replaced = Response::new(r.status, json!("hijacked"));
                    replaced.headers = r.headers;
                    replaced
                });
                Ok(())
            }),
        );
        let (executor, _db, _log) = fx.executor();

        let mut ctx = create_ctx(&executor, json!({"name": "x"}));
        let response = executor.run(&mut ctx).await.unwrap();
        assert_eq!(response.body()["name"], "x");
        assert_eq!(response.headers["x-seen"], "1");
    }

    #[tokio::test]
    async fn test_cancellation_takes_error_path() {
        let mut fx = Fixture::new();
        fx.hooks.register(
            Phase::PreHandler,
            HookScope::global(),
            crate::core::hooks::hook_fn(|_ctx| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
            }),
        );
        fx.trace_all();
        let (executor, db, log) = fx.executor();

        let mut ctx = create_ctx(&executor, json!({"name": "x"}));
        let err = executor
            .run_cancellable(&mut ctx, tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 504);
        assert_eq!(db.count("Item"), 0);
        assert!(!ctx.db.in_transaction());
        assert_eq!(
            logged(&log),
            vec!["PRE_TX_BEGIN", "ON_ROLLBACK", "ON_ERROR"]
        );
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let (executor, _db, _log) = Fixture::new().executor();
        let mut ctx = Context::new(
            RequestMeta::new(Surface::Rpc, None, "/rpc"),
            executor.session(),
            "Item",
            "explode",
            Record::new(),
        );
        assert!(matches!(
            executor.run(&mut ctx).await,
            Err(CoreError::MethodNotFound(_))
        ));
    }
}
