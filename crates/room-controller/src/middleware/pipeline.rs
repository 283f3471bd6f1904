//! Ordered middleware chain over a mutable context.
//!
//! A [`Pipeline`] holds `Arc<dyn Middleware<C>>` handlers. `execute` walks
//! them in order; each handler either marks the context handled and returns,
//! or hands control to the rest of the chain through [`Next::run`].
//!
//! # Semantics
//!
//! - Execution works on a snapshot of the handler list, so `remove` (or
//!   `use_middleware`) during an `execute` affects only later executions.
//! - Once a context reports `is_handled()`, `Next::run` stops the chain.
//! - A handler error aborts the chain and is returned to the caller.
//!
//! Handlers are compared by `Arc` identity: `remove` takes the same `Arc` that
//! was registered.

use crate::errors::RcError;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Context types flowing through a [`Pipeline`].
pub trait PipelineContext: Send {
    /// Whether a handler has claimed this context.
    fn is_handled(&self) -> bool;
}

/// A single stage of a [`Pipeline`].
#[async_trait]
pub trait Middleware<C: PipelineContext>: Send + Sync {
    /// Handle `context`, or call `next.run(context)` to pass it on.
    async fn handle(&self, context: &mut C, next: Next<'_, C>) -> Result<(), RcError>;
}

/// Continuation over the handlers remaining after the current one.
pub struct Next<'a, C: PipelineContext> {
    remaining: &'a [Arc<dyn Middleware<C>>],
}

impl<C: PipelineContext> Next<'_, C> {
    /// Run the rest of the chain.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a later handler.
    pub async fn run(self, context: &mut C) -> Result<(), RcError> {
        if context.is_handled() {
            return Ok(());
        }

        match self.remaining.split_first() {
            Some((current, rest)) => current.handle(context, Next { remaining: rest }).await,
            None => Ok(()),
        }
    }
}

/// Ordered, mutable list of middlewares.
pub struct Pipeline<C: PipelineContext> {
    middlewares: RwLock<Vec<Arc<dyn Middleware<C>>>>,
}

impl<C: PipelineContext> Default for Pipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PipelineContext> std::fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("len", &self.len())
            .finish()
    }
}

impl<C: PipelineContext> Pipeline<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            middlewares: RwLock::new(Vec::new()),
        }
    }

    /// Append a middleware to the end of the chain.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware<C>>) {
        self.middlewares.write().push(middleware);
    }

    /// Insert a middleware at `position`, clamped to the current length.
    pub fn insert(&self, position: usize, middleware: Arc<dyn Middleware<C>>) {
        let mut middlewares = self.middlewares.write();
        let position = position.min(middlewares.len());
        middlewares.insert(position, middleware);
    }

    /// Remove a previously registered middleware.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove(&self, middleware: &Arc<dyn Middleware<C>>) -> bool {
        let mut middlewares = self.middlewares.write();
        let before = middlewares.len();
        middlewares.retain(|m| !Arc::ptr_eq(m, middleware));
        middlewares.len() != before
    }

    /// Whether `middleware` is currently registered.
    pub fn contains(&self, middleware: &Arc<dyn Middleware<C>>) -> bool {
        self.middlewares
            .read()
            .iter()
            .any(|m| Arc::ptr_eq(m, middleware))
    }

    pub fn len(&self) -> usize {
        self.middlewares.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.read().is_empty()
    }

    /// Run `context` through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first handler error; the remaining handlers do not run.
    pub async fn execute(&self, context: &mut C) -> Result<(), RcError> {
        let snapshot: Vec<Arc<dyn Middleware<C>>> = self.middlewares.read().clone();
        Next {
            remaining: &snapshot,
        }
        .run(context)
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct TestContext {
        trace: Vec<&'static str>,
        handled: bool,
    }

    impl PipelineContext for TestContext {
        fn is_handled(&self) -> bool {
            self.handled
        }
    }

    /// Records its name, optionally claims the context, optionally fails.
    struct Recorder {
        name: &'static str,
        claim: bool,
        fail: bool,
    }

    impl Recorder {
        fn pass(name: &'static str) -> Arc<dyn Middleware<TestContext>> {
            Arc::new(Self {
                name,
                claim: false,
                fail: false,
            })
        }

        fn claim(name: &'static str) -> Arc<dyn Middleware<TestContext>> {
            Arc::new(Self {
                name,
                claim: true,
                fail: false,
            })
        }

        fn fail(name: &'static str) -> Arc<dyn Middleware<TestContext>> {
            Arc::new(Self {
                name,
                claim: false,
                fail: true,
            })
        }
    }

    #[async_trait]
    impl Middleware<TestContext> for Recorder {
        async fn handle(
            &self,
            context: &mut TestContext,
            next: Next<'_, TestContext>,
        ) -> Result<(), RcError> {
            context.trace.push(self.name);
            if self.fail {
                return Err(RcError::Internal(self.name.to_string()));
            }
            if self.claim {
                context.handled = true;
                return Ok(());
            }
            next.run(context).await
        }
    }

    /// Claims the context but still calls `next`.
    struct ClaimThenNext;

    #[async_trait]
    impl Middleware<TestContext> for ClaimThenNext {
        async fn handle(
            &self,
            context: &mut TestContext,
            next: Next<'_, TestContext>,
        ) -> Result<(), RcError> {
            context.trace.push("claim-then-next");
            context.handled = true;
            next.run(context).await
        }
    }

    #[tokio::test]
    async fn test_runs_in_registration_order() {
        let pipeline = Pipeline::new();
        pipeline.use_middleware(Recorder::pass("a"));
        pipeline.use_middleware(Recorder::pass("b"));
        pipeline.use_middleware(Recorder::pass("c"));

        let mut ctx = TestContext::default();
        pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.trace, vec!["a", "b", "c"]);
        assert!(!ctx.handled);
    }

    #[tokio::test]
    async fn test_insert_at_position_is_clamped() {
        let pipeline = Pipeline::new();
        pipeline.use_middleware(Recorder::pass("a"));
        pipeline.use_middleware(Recorder::pass("c"));
        pipeline.insert(1, Recorder::pass("b"));
        pipeline.insert(0, Recorder::pass("first"));
        pipeline.insert(99, Recorder::pass("last"));

        let mut ctx = TestContext::default();
        pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.trace, vec!["first", "a", "b", "c", "last"]);
    }

    #[tokio::test]
    async fn test_handled_context_short_circuits() {
        let pipeline = Pipeline::new();
        pipeline.use_middleware(Recorder::pass("a"));
        pipeline.use_middleware(Recorder::claim("b"));
        pipeline.use_middleware(Recorder::pass("c"));

        let mut ctx = TestContext::default();
        pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.trace, vec!["a", "b"]);
        assert!(ctx.handled);
    }

    #[tokio::test]
    async fn test_claim_then_next_stops_chain() {
        let pipeline = Pipeline::new();
        pipeline.use_middleware(Arc::new(ClaimThenNext));
        pipeline.use_middleware(Recorder::pass("never"));

        let mut ctx = TestContext::default();
        pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.trace, vec!["claim-then-next"]);
    }

    #[tokio::test]
    async fn test_error_aborts_chain() {
        let pipeline = Pipeline::new();
        pipeline.use_middleware(Recorder::fail("boom"));
        pipeline.use_middleware(Recorder::pass("never"));

        let mut ctx = TestContext::default();
        let result = pipeline.execute(&mut ctx).await;

        assert!(matches!(result, Err(RcError::Internal(name)) if name == "boom"));
        assert_eq!(ctx.trace, vec!["boom"]);
        assert!(!ctx.handled);
    }

    #[tokio::test]
    async fn test_remove_by_identity() {
        let pipeline = Pipeline::new();
        let a = Recorder::pass("a");
        let b = Recorder::pass("b");
        pipeline.use_middleware(Arc::clone(&a));
        pipeline.use_middleware(Arc::clone(&b));

        assert!(pipeline.contains(&a));
        assert!(pipeline.remove(&a));
        assert!(!pipeline.remove(&a));
        assert!(!pipeline.contains(&a));
        assert_eq!(pipeline.len(), 1);

        let mut ctx = TestContext::default();
        pipeline.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.trace, vec!["b"]);
    }

    /// Removes a target middleware from the pipeline while running.
    struct Remover {
        pipeline: Arc<Pipeline<TestContext>>,
        target: Mutex<Option<Arc<dyn Middleware<TestContext>>>>,
    }

    #[async_trait]
    impl Middleware<TestContext> for Remover {
        async fn handle(
            &self,
            context: &mut TestContext,
            next: Next<'_, TestContext>,
        ) -> Result<(), RcError> {
            context.trace.push("remover");
            let target = self.target.lock().take();
            if let Some(target) = target {
                self.pipeline.remove(&target);
            }
            next.run(context).await
        }
    }

    #[tokio::test]
    async fn test_removal_during_execute_affects_next_run_only() {
        let pipeline = Arc::new(Pipeline::new());
        let target = Recorder::pass("target");
        pipeline.use_middleware(Arc::new(Remover {
            pipeline: Arc::clone(&pipeline),
            target: Mutex::new(Some(Arc::clone(&target))),
        }));
        pipeline.use_middleware(Arc::clone(&target));

        let mut first = TestContext::default();
        pipeline.execute(&mut first).await.unwrap();
        assert_eq!(first.trace, vec!["remover", "target"]);

        let mut second = TestContext::default();
        pipeline.execute(&mut second).await.unwrap();
        assert_eq!(second.trace, vec!["remover"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_leaves_context_unhandled() {
        let pipeline: Pipeline<TestContext> = Pipeline::default();
        assert!(pipeline.is_empty());

        let mut ctx = TestContext::default();
        pipeline.execute(&mut ctx).await.unwrap();
        assert!(!ctx.handled);
        assert!(ctx.trace.is_empty());
    }
}
