//! Middleware trait, type erasure, and the [`Next`] continuation.
//!
//! # How the pipeline is stored
//!
//! An application is an ordered list of middleware of *different* types:
//! closures, the router, the scope layer, invokers. They are stored
//! uniformly as trait objects (`Arc<dyn Middleware>`) and driven by a
//! [`Next`] cursor:
//!
//! ```text
//! async fn timing(ctx, next) { … }          ← user writes this
//!        ↓ App::with(timing)
//! Arc::new(timing)                          ← BoxedMiddleware
//!        ↓ at request time
//! Next { chain, index: 0 }.run(ctx)         ← one vtable call per layer
//!        ↓
//! timing(ctx, Next { chain, index: 1 })     ← calls next.run(ctx) to continue
//! ```
//!
//! `Next` is consumed by [`Next::run`], so a middleware can continue the
//! chain at most once. Not calling it short-circuits the rest of the
//! pipeline; the context is handed back up as-is.

pub mod scope;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move it across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What every layer of the pipeline produces: the context, handed back up,
/// or the error that stopped the request.
pub type Outcome = Result<Context, Error>;

/// A layer of the request pipeline.
///
/// Implemented for every `Fn(Context, Next) -> impl Future<Output = Outcome>`,
/// so plain async closures work:
///
/// ```rust
/// use kura::{App, Context, middleware::Next};
///
/// let app = App::new().with(|mut ctx: Context, next: Next| async move {
///     ctx.response_mut().set_header("x-powered-by", "kura");
///     next.run(ctx).await
/// });
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, ctx: Context, next: Next) -> BoxFuture<Outcome>;
}

/// A type-erased middleware shared across concurrent requests.
pub type BoxedMiddleware = Arc<dyn Middleware>;

impl<F, Fut> Middleware for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn call(&self, ctx: Context, next: Next) -> BoxFuture<Outcome> {
        Box::pin(self(ctx, next))
    }
}

/// Erases `middleware` for storage in a chain.
pub fn boxed(middleware: impl Middleware) -> BoxedMiddleware {
    Arc::new(middleware)
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The remainder of the pipeline after the current middleware.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[BoxedMiddleware]>,
    index: usize,
    /// Where to continue once `chain` is exhausted.
    then: Option<Box<Next>>,
}

impl Next {
    pub fn new(chain: impl Into<Arc<[BoxedMiddleware]>>) -> Self {
        Self { chain: chain.into(), index: 0, then: None }
    }

    /// An empty continuation: running it hands the context straight back.
    pub fn end() -> Self {
        Self::new(Vec::new())
    }

    /// Continues into `outer` after this chain is exhausted.
    pub fn then(mut self, outer: Next) -> Self {
        self.then = Some(Box::new(match self.then.take() {
            Some(inner) => inner.then(outer),
            None => outer,
        }));
        self
    }

    /// Runs the next middleware. Resolves to the context as the rest of the
    /// pipeline left it.
    pub fn run(self, ctx: Context) -> BoxFuture<Outcome> {
        let Next { chain, index, then } = self;
        match chain.get(index).cloned() {
            Some(middleware) => middleware.call(ctx, Next { chain, index: index + 1, then }),
            None => match then {
                Some(outer) => outer.run(ctx),
                None => Box::pin(std::future::ready(Ok(ctx))),
            },
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.chain.len().saturating_sub(self.index))
            .field("then", &self.then)
            .finish()
    }
}

// ── Compose ───────────────────────────────────────────────────────────────────

/// Runs a fixed chain as a single middleware, then continues with the
/// caller's `next`.
pub struct Compose {
    chain: Arc<[BoxedMiddleware]>,
}

pub fn compose(chain: impl IntoIterator<Item = BoxedMiddleware>) -> Compose {
    Compose { chain: chain.into_iter().collect() }
}

impl Middleware for Compose {
    fn call(&self, ctx: Context, next: Next) -> BoxFuture<Outcome> {
        Next::new(Arc::clone(&self.chain)).then(next).run(ctx)
    }
}
