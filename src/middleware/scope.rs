//! Attaches a resolution scope to every request.
//!
//! Install exactly one of these ahead of the router:
//!
//! - [`scope_per_request`]: a fresh child scope per request. Scoped
//!   registrations are built at most once per request.
//! - [`attach_container`]: the container's root scope, shared by every
//!   request. Scoped registrations behave like singletons.

use tracing::trace;

use crate::container::Container;
use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next, Outcome};

/// Creates a child scope per request. See [`scope_per_request`].
#[derive(Clone, Debug)]
pub struct ScopePerRequest {
    container: Container,
}

/// Middleware giving each request its own child scope of `container`.
///
/// ```rust
/// use kura::{App, Container, middleware::scope::scope_per_request};
///
/// let container = Container::builder().build();
/// let app = App::new().with(scope_per_request(&container));
/// ```
pub fn scope_per_request(container: &Container) -> ScopePerRequest {
    ScopePerRequest { container: container.clone() }
}

impl ScopePerRequest {
    /// Attaches a fresh scope to `ctx` and hands it to `next`, returning
    /// whatever `next` returns.
    pub fn wrap<F, R>(&self, mut ctx: Context, next: F) -> R
    where
        F: FnOnce(Context) -> R,
    {
        let scope = self.container.create_scope();
        trace!(scope = scope.id(), path = ctx.request().path(), "scope created");
        ctx.state_mut().set_scope(scope);
        next(ctx)
    }
}

impl Middleware for ScopePerRequest {
    fn call(&self, ctx: Context, next: Next) -> BoxFuture<Outcome> {
        self.wrap(ctx, |ctx| next.run(ctx))
    }
}

/// Attaches the root scope. See [`attach_container`].
#[derive(Clone, Debug)]
pub struct AttachContainer {
    container: Container,
}

/// Middleware exposing the container itself to every request, without
/// per-request isolation.
pub fn attach_container(container: &Container) -> AttachContainer {
    AttachContainer { container: container.clone() }
}

impl Middleware for AttachContainer {
    fn call(&self, mut ctx: Context, next: Next) -> BoxFuture<Outcome> {
        ctx.state_mut().set_scope(self.container.root_scope());
        next.run(ctx)
    }
}
