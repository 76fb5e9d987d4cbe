//! # Hook Registry
//!
//! Hooks are user callables attached to a lifecycle [`Phase`] under a scope.
//! A scope is a `(model, verb)` pair where either side may be a wildcard.
//!
//! For one phase, [`HookRegistry::resolve`] returns:
//!
//! 1. exact hooks `(model, verb)`
//! 2. model-wide hooks `(model, *)`
//! 3. verb-wide hooks `(*, verb)`
//! 4. global hooks `(*, *)`
//!
//! and within each group, registration order. Names compare
//! case-insensitively.
//!
//! Registration needs `&mut self` and happens at startup. The executor then
//! holds the registry behind an `Arc` and only reads it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::context::Context;
use super::error::CoreResult;
use super::phase::Phase;

/// A callable run at a lifecycle phase
pub trait Hook: Send + Sync {
    /// Run against the call context. An error aborts the chain.
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, CoreResult<()>>;

    /// Name used in logs
    fn name(&self) -> &str {
        "hook"
    }
}

struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> Hook for FnHook<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, CoreResult<()>> + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, CoreResult<()>> {
        (self.f)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct SyncHook<F> {
    name: String,
    f: F,
}

impl<F> Hook for SyncHook<F>
where
    F: Fn(&mut Context) -> CoreResult<()> + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, CoreResult<()>> {
        let outcome = (self.f)(ctx);
        Box::pin(std::future::ready(outcome))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap an async closure as a hook
///
/// ```ignore
/// let hook = hook_fn(|ctx| Box::pin(async move {
///     ctx.scratch.insert("seen".into(), true.into());
///     Ok(())
/// }));
/// ```
pub fn hook_fn<F>(f: F) -> Arc<dyn Hook>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, CoreResult<()>> + Send + Sync + 'static,
{
    Arc::new(FnHook {
        name: "hook_fn".to_string(),
        f,
    })
}

/// Wrap a blocking closure as a hook
pub fn sync_hook<F>(f: F) -> Arc<dyn Hook>
where
    F: Fn(&mut Context) -> CoreResult<()> + Send + Sync + 'static,
{
    Arc::new(SyncHook {
        name: "sync_hook".to_string(),
        f,
    })
}

/// Same as [`sync_hook`] with a name for logs
pub fn named_hook<F>(name: impl Into<String>, f: F) -> Arc<dyn Hook>
where
    F: Fn(&mut Context) -> CoreResult<()> + Send + Sync + 'static,
{
    Arc::new(SyncHook {
        name: name.into(),
        f,
    })
}

/// Where a hook applies. `None` is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookScope {
    model: Option<String>,
    verb: Option<String>,
}

impl HookScope {
    /// Build a scope; `"*"` is accepted as a wildcard on either side
    pub fn new(model: Option<&str>, verb: Option<&str>) -> Self {
        fn normalize(part: Option<&str>) -> Option<String> {
            part.filter(|p| *p != "*").map(str::to_lowercase)
        }
        Self {
            model: normalize(model),
            verb: normalize(verb),
        }
    }

    /// Every model, every verb
    pub fn global() -> Self {
        Self::new(None, None)
    }

    /// Every verb of one model
    pub fn model(model: &str) -> Self {
        Self::new(Some(model), None)
    }

    /// One verb across every model
    pub fn verb(verb: &str) -> Self {
        Self::new(None, Some(verb))
    }

    /// One operation
    pub fn op(model: &str, verb: &str) -> Self {
        Self::new(Some(model), Some(verb))
    }
}

impl fmt::Display for HookScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.model.as_deref().unwrap_or("*"),
            self.verb.as_deref().unwrap_or("*")
        )
    }
}

/// Phase-and-scope indexed hook table
#[derive(Default)]
pub struct HookRegistry {
    buckets: HashMap<(Phase, HookScope), Vec<Arc<dyn Hook>>>,
    len: usize,
}

impl HookRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook. Registering the same callable twice runs it twice.
    pub fn register(&mut self, phase: Phase, scope: HookScope, hook: Arc<dyn Hook>) {
        tracing::debug!(phase = %phase, scope = %scope, hook = hook.name(), "hook registered");
        self.buckets.entry((phase, scope)).or_default().push(hook);
        self.len += 1;
    }

    /// Hooks for one phase of one call, most specific first
    pub fn resolve(&self, phase: Phase, model: &str, verb: &str) -> Vec<Arc<dyn Hook>> {
        let scopes = [
            HookScope::op(model, verb),
            HookScope::model(model),
            HookScope::verb(verb),
            HookScope::global(),
        ];

        let mut hooks = Vec::new();
        for scope in scopes {
            if let Some(bucket) = self.buckets.get(&(phase, scope)) {
                hooks.extend(bucket.iter().cloned());
            }
        }
        hooks
    }

    /// Total registered hooks
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Registered hook count per phase
    pub fn counts(&self) -> Vec<(Phase, usize)> {
        Phase::ALL
            .into_iter()
            .map(|phase| {
                let n = self
                    .buckets
                    .iter()
                    .filter(|((p, _), _)| *p == phase)
                    .map(|(_, hooks)| hooks.len())
                    .sum();
                (phase, n)
            })
            .filter(|(_, n)| *n > 0)
            .collect()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("len", &self.len)
            .field("counts", &self.counts())
            .finish()
    }
}
