//! Per-request method invocation on resolved instances.
//!
//! An [`Invoker`] wraps one [`ResolverDescriptor`]. Naming a method on it
//! yields a [`MemberInvoker`], which on every call:
//!
//! ```text
//! ctx.state().scope()          → Error::MissingScope if absent
//!   .build(&descriptor)        → Arc<T>, honoring the lifetime
//!   .lookup(method)            → Error::InvalidMethod if absent
//!   (ctx, args)                → the method's future, returned verbatim
//! ```
//!
//! The first three steps are synchronous. A failure in any of them comes
//! back as an already-completed `Err` future, so callers handle every
//! failure by awaiting.

use std::any::type_name;
use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::context::Context;
use crate::error::Error;
use crate::middleware::{BoxFuture, Middleware, Next, Outcome};
use crate::resolver::{Construct, IntoHandlerReference, ResolverDescriptor, ResolverOptions, build, class};
use crate::scope::Cradle;

/// Name of an invocable method.
pub type MethodName = Cow<'static, str>;

/// A method already bound to its receiver, waiting for `(ctx, args)`.
pub type BoundMethod<A> = Box<dyn FnOnce(Context, A) -> BoxFuture<Outcome> + Send>;

/// A type whose methods can be invoked by name.
///
/// `A` is the trailing argument passed after the context: the pipeline's
/// [`Next`] when the invoker is used as middleware.
///
/// ```rust
/// use std::sync::Arc;
/// use kura::{Context, Controller, invoker::{BoundMethod, bind}, middleware::{Next, Outcome}};
///
/// struct Users;
///
/// impl Users {
///     async fn list(self: Arc<Self>, mut ctx: Context, _next: Next) -> Outcome {
///         ctx.respond("alice, bob");
///         Ok(ctx)
///     }
/// }
///
/// impl Controller for Users {
///     fn lookup(self: Arc<Self>, name: &str) -> Option<BoundMethod<Next>> {
///         match name {
///             "list" => Some(bind(self, Self::list)),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Controller<A = Next>: Send + Sync + 'static {
    fn lookup(self: Arc<Self>, name: &str) -> Option<BoundMethod<A>>;
}

/// Binds `method` to `this`.
pub fn bind<T, A, F, Fut>(this: Arc<T>, method: F) -> BoundMethod<A>
where
    T: Send + Sync + 'static,
    A: Send + 'static,
    F: FnOnce(Arc<T>, Context, A) -> Fut + Send + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    Box::new(move |ctx, args| Box::pin(method(this, ctx, args)))
}

// ── Invoker ───────────────────────────────────────────────────────────────────

/// Produces a [`MemberInvoker`] per method name. All of them share one
/// descriptor, hence one Scoped or Singleton cache entry.
pub struct Invoker<T, A = Next> {
    resolver: Arc<ResolverDescriptor<T>>,
    _args: PhantomData<fn(A)>,
}

impl<T, A> Invoker<T, A>
where
    T: Controller<A>,
    A: Send + 'static,
{
    pub fn resolver(&self) -> &ResolverDescriptor<T> {
        &self.resolver
    }

    pub fn method(&self, name: impl Into<MethodName>) -> MemberInvoker<T, A> {
        MemberInvoker {
            resolver: Arc::clone(&self.resolver),
            method: name.into(),
            _args: PhantomData,
        }
    }
}

impl<T, A> Clone for Invoker<T, A> {
    fn clone(&self) -> Self {
        Self { resolver: Arc::clone(&self.resolver), _args: PhantomData }
    }
}

/// Classifies `target` and returns an invoker over it.
pub fn make_invoker<T, A, K>(target: impl IntoHandlerReference<T, K>, options: ResolverOptions) -> Invoker<T, A>
where
    T: Controller<A>,
    A: Send + 'static,
{
    make_resolver_invoker(build(target, options))
}

pub fn make_class_invoker<C, A>(options: ResolverOptions) -> Invoker<C, A>
where
    C: Construct + Controller<A>,
    A: Send + 'static,
{
    make_resolver_invoker(build(class::<C>(), options))
}

pub fn make_function_invoker<T, A, F>(factory: F, options: ResolverOptions) -> Invoker<T, A>
where
    F: Fn(&Cradle<'_>) -> Result<T, Error> + Send + Sync + 'static,
    T: Controller<A>,
    A: Send + 'static,
{
    make_resolver_invoker(build(factory, options))
}

pub fn make_resolver_invoker<T, A>(resolver: ResolverDescriptor<T>) -> Invoker<T, A>
where
    T: Controller<A>,
    A: Send + 'static,
{
    Invoker { resolver: Arc::new(resolver), _args: PhantomData }
}

// ── MemberInvoker ─────────────────────────────────────────────────────────────

/// Resolves a `T` from the request's scope and calls one of its methods.
pub struct MemberInvoker<T, A = Next> {
    resolver: Arc<ResolverDescriptor<T>>,
    method: MethodName,
    _args: PhantomData<fn(A)>,
}

impl<T, A> MemberInvoker<T, A>
where
    T: Controller<A>,
    A: Send + 'static,
{
    pub fn method_name(&self) -> &str {
        &self.method
    }

    pub fn invoke(&self, ctx: Context, args: A) -> BoxFuture<Outcome> {
        match self.prepare(&ctx) {
            Ok(method) => method(ctx, args),
            Err(e) => Box::pin(std::future::ready(Err(e))),
        }
    }

    fn prepare(&self, ctx: &Context) -> Result<BoundMethod<A>, Error> {
        let scope = ctx
            .state()
            .scope()
            .ok_or_else(|| Error::MissingScope { method: self.method.clone() })?;
        let instance = scope.build(&self.resolver)?;
        trace!(
            target_type = self.resolver.target_name(),
            method = %self.method,
            scope = scope.id(),
            "invoking"
        );
        instance.lookup(&self.method).ok_or_else(|| Error::InvalidMethod {
            method: self.method.clone(),
            target: type_name::<T>(),
        })
    }
}

impl<T, A> Clone for MemberInvoker<T, A> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            method: self.method.clone(),
            _args: PhantomData,
        }
    }
}

impl<T: Controller<Next>> Middleware for MemberInvoker<T, Next> {
    fn call(&self, ctx: Context, next: Next) -> BoxFuture<Outcome> {
        self.invoke(ctx, next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::Method;

    use super::*;
    use crate::container::Container;
    use crate::lifetime::Lifetime;
    use crate::request::Request;

    #[derive(Clone, Debug, PartialEq)]
    struct Called {
        param: u32,
        extra: &'static str,
    }

    struct Probe {
        param: Arc<u32>,
    }

    impl Probe {
        async fn method(self: Arc<Self>, mut ctx: Context, extra: &'static str) -> Outcome {
            ctx.state_mut().insert(Called { param: *self.param, extra });
            Ok(ctx)
        }
    }

    impl Controller<&'static str> for Probe {
        fn lookup(self: Arc<Self>, name: &str) -> Option<BoundMethod<&'static str>> {
            match name {
                "method" => Some(bind(self, Self::method)),
                _ => None,
            }
        }
    }

    fn scoped_ctx(container: &Container) -> Context {
        let mut ctx = Context::new(Request::new(Method::GET, "/"));
        ctx.state_mut().set_scope(container.create_scope());
        ctx
    }

    fn counting_factory(counter: &'static AtomicUsize) -> impl Fn(&Cradle<'_>) -> Result<Probe, Error> + Send + Sync {
        move |cradle: &Cradle<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Probe { param: cradle.get("param")? })
        }
    }

    fn container() -> Container {
        Container::builder().register_value("param", 42u32).build()
    }

    #[tokio::test]
    async fn transient_factories_construct_on_every_call() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let container = container();
        let invoker: Invoker<Probe, &'static str> =
            make_function_invoker(counting_factory(&BUILT), ResolverOptions::default());
        let method = invoker.method("method");

        method.invoke(scoped_ctx(&container), "a").await.unwrap();
        method.invoke(scoped_ctx(&container), "b").await.unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn singleton_factories_construct_once_across_scopes() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let container = container();
        let invoker: Invoker<Probe, &'static str> =
            make_invoker(counting_factory(&BUILT), Lifetime::Singleton.into());

        for _ in 0..3 {
            let ctx = invoker.method("method").invoke(scoped_ctx(&container), "x").await.unwrap();
            assert_eq!(ctx.state().get::<Called>(), Some(&Called { param: 42, extra: "x" }));
        }
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_scope_names_the_method() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let invoker: Invoker<Probe, &'static str> =
            make_function_invoker(counting_factory(&BUILT), ResolverOptions::default());
        let ctx = Context::new(Request::new(Method::GET, "/"));

        let err = invoker.method("method").invoke(ctx, "x").await.err().unwrap();
        assert!(matches!(&err, Error::MissingScope { method } if method == "method"), "{err}");
        assert_eq!(BUILT.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_methods_are_rejected() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let container = container();
        let invoker: Invoker<Probe, &'static str> =
            make_function_invoker(counting_factory(&BUILT), ResolverOptions::default());

        let err = invoker.method("nope").invoke(scoped_ctx(&container), "x").await.err().unwrap();
        match err {
            Error::InvalidMethod { method, target } => {
                assert_eq!(method, "nope");
                assert!(target.ends_with("Probe"), "{target}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn resolution_failures_surface_through_the_future() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let container = Container::builder().build();
        let invoker: Invoker<Probe, &'static str> =
            make_function_invoker(counting_factory(&BUILT), ResolverOptions::default());

        let err = invoker.method("method").invoke(scoped_ctx(&container), "x").await.err().unwrap();
        assert!(matches!(err, Error::Unregistered { .. }), "{err}");
    }
}
