//! Route metadata and controller registration.
//!
//! A controller is a [`Controller`] type plus a [`Routes`] table saying
//! which of its methods answer which verbs and paths. Registration rolls
//! the table up into one [`RouteSpec`] per method and mounts
//!
//! ```text
//! controller before… → method before… → invoker(method) → method after… → controller after…
//! ```
//!
//! under every verb × path the method declares. Methods declared without a
//! verb are not routed.
//!
//! ```rust
//! use std::sync::Arc;
//! use kura::{Construct, Cradle, Error, Routable, Routes, Router};
//! use kura::invoker::{BoundMethod, Controller, bind};
//! use kura::middleware::{Next, Outcome};
//!
//! struct Todos;
//!
//! impl Construct for Todos {
//!     fn construct(_: &Cradle<'_>) -> Result<Self, Error> { Ok(Todos) }
//! }
//!
//! impl Todos {
//!     async fn list(self: Arc<Self>, mut ctx: kura::Context, _: Next) -> Outcome {
//!         ctx.respond("[]");
//!         Ok(ctx)
//!     }
//! }
//!
//! impl Controller for Todos {
//!     fn lookup(self: Arc<Self>, name: &str) -> Option<BoundMethod<Next>> {
//!         (name == "list").then(|| bind(self, Self::list))
//!     }
//! }
//!
//! impl Routable for Todos {
//!     fn routes() -> Routes {
//!         Routes::new().prefix("/todos").get("", "list")
//!     }
//! }
//!
//! let router = Router::new().controller(kura::class::<Todos>(), Default::default());
//! ```

use std::fmt;

use tracing::debug;

use crate::error::Error;
use crate::invoker::{Controller, MethodName, make_resolver_invoker};
use crate::lifetime::Lifetime;
use crate::middleware::{BoxedMiddleware, Middleware, Next, boxed};
use crate::resolver::{Class, Construct, HandlerReference, IntoHandlerReference, ResolverOptions, build};
use crate::router::Router;
use crate::scope::Cradle;
use crate::verb::Verb;

// ── RouteSpec ─────────────────────────────────────────────────────────────────

/// Everything needed to mount one controller method.
#[derive(Clone)]
pub struct RouteSpec {
    pub paths: Vec<String>,
    pub verbs: Vec<Verb>,
    pub method: MethodName,
    pub before: Vec<BoxedMiddleware>,
    pub after: Vec<BoxedMiddleware>,
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("paths", &self.paths)
            .field("verbs", &self.verbs)
            .field("method", &self.method)
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

// ── Routes ────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Declared {
    paths: Vec<String>,
    verbs: Vec<Verb>,
    before: Vec<BoxedMiddleware>,
    after: Vec<BoxedMiddleware>,
}

/// Route table of a controller, built by chaining.
///
/// Declaring the same method twice merges the declarations: paths, verbs
/// and middleware accumulate.
#[derive(Clone, Default)]
pub struct Routes {
    root: Declared,
    methods: Vec<(MethodName, Declared)>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a path prefix. Several prefixes mount every method under each.
    pub fn prefix(mut self, path: impl Into<String>) -> Self {
        self.root.paths.push(path.into());
        self
    }

    /// Middleware that runs before every method of the controller.
    pub fn before(mut self, middleware: impl Middleware) -> Self {
        self.root.before.push(boxed(middleware));
        self
    }

    /// Middleware that runs after every method of the controller that
    /// continues the pipeline.
    pub fn after(mut self, middleware: impl Middleware) -> Self {
        self.root.after.push(boxed(middleware));
        self
    }

    pub fn get(self, path: &str, method: impl Into<MethodName>) -> Self {
        self.route(&[Verb::Get], &[path], method)
    }

    pub fn post(self, path: &str, method: impl Into<MethodName>) -> Self {
        self.route(&[Verb::Post], &[path], method)
    }

    pub fn put(self, path: &str, method: impl Into<MethodName>) -> Self {
        self.route(&[Verb::Put], &[path], method)
    }

    pub fn patch(self, path: &str, method: impl Into<MethodName>) -> Self {
        self.route(&[Verb::Patch], &[path], method)
    }

    pub fn delete(self, path: &str, method: impl Into<MethodName>) -> Self {
        self.route(&[Verb::Delete], &[path], method)
    }

    pub fn head(self, path: &str, method: impl Into<MethodName>) -> Self {
        self.route(&[Verb::Head], &[path], method)
    }

    pub fn options(self, path: &str, method: impl Into<MethodName>) -> Self {
        self.route(&[Verb::Options], &[path], method)
    }

    pub fn all(self, path: &str, method: impl Into<MethodName>) -> Self {
        self.route(&[Verb::All], &[path], method)
    }

    /// Declares `method` for every verb in `verbs` under every path in
    /// `paths`. An empty `paths` mounts the method at the prefixes
    /// themselves.
    pub fn route(mut self, verbs: &[Verb], paths: &[&str], method: impl Into<MethodName>) -> Self {
        let declared = self.method_mut(method.into());
        declared.paths.extend(paths.iter().map(|p| (*p).to_owned()));
        for verb in verbs {
            if !declared.verbs.contains(verb) {
                declared.verbs.push(*verb);
            }
        }
        self
    }

    /// Middleware that runs before `method` only, after the controller's own.
    pub fn method_before(mut self, method: impl Into<MethodName>, middleware: impl Middleware) -> Self {
        self.method_mut(method.into()).before.push(boxed(middleware));
        self
    }

    /// Middleware that runs after `method` only, before the controller's own.
    pub fn method_after(mut self, method: impl Into<MethodName>, middleware: impl Middleware) -> Self {
        self.method_mut(method.into()).after.push(boxed(middleware));
        self
    }

    /// One [`RouteSpec`] per declared method, in declaration order.
    pub fn roll_up(&self) -> Vec<RouteSpec> {
        self.methods
            .iter()
            .map(|(method, declared)| RouteSpec {
                paths: join_paths(&self.root.paths, &declared.paths),
                verbs: declared.verbs.clone(),
                method: method.clone(),
                before: self.root.before.iter().chain(&declared.before).cloned().collect(),
                after: declared.after.iter().chain(&self.root.after).cloned().collect(),
            })
            .collect()
    }

    fn method_mut(&mut self, method: MethodName) -> &mut Declared {
        let index = match self.methods.iter().position(|(name, _)| *name == method) {
            Some(index) => index,
            None => {
                self.methods.push((method, Declared::default()));
                self.methods.len() - 1
            }
        };
        &mut self.methods[index].1
    }
}

impl fmt::Debug for Routes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.roll_up()).finish()
    }
}

fn join_paths(prefixes: &[String], paths: &[String]) -> Vec<String> {
    match (prefixes.is_empty(), paths.is_empty()) {
        (true, _) => paths.to_vec(),
        (false, true) => prefixes.to_vec(),
        (false, false) => prefixes
            .iter()
            .flat_map(|prefix| paths.iter().map(move |path| join(prefix, path)))
            .collect(),
    }
}

fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_owned(),
        (_, true) => prefix.to_owned(),
        _ => format!("{prefix}/{path}"),
    }
}

// ── Definitions ───────────────────────────────────────────────────────────────

/// Types that carry their own route table.
pub trait Routable: Controller {
    fn routes() -> Routes;
}

/// A handler reference plus its route table.
pub struct ControllerDefinition<T> {
    target: HandlerReference<T>,
    routes: Routes,
}

impl<T: Controller> ControllerDefinition<T> {
    pub fn new<K>(target: impl IntoHandlerReference<T, K>, routes: Routes) -> Self {
        Self { target: target.into_handler_reference(), routes }
    }

    /// Replaces the route table.
    pub fn with_routes(mut self, routes: Routes) -> Self {
        self.routes = routes;
        self
    }

    pub fn target(&self) -> &HandlerReference<T> {
        &self.target
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }
}

impl<C: Construct + Routable> From<Class<C>> for ControllerDefinition<C> {
    fn from(class: Class<C>) -> Self {
        Self::new(class, C::routes())
    }
}

impl<T> fmt::Debug for ControllerDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerDefinition")
            .field("target", &self.target)
            .field("routes", &self.routes)
            .finish()
    }
}

/// A controller built by a factory function, with an empty route table to
/// fill in with [`with_routes`](ControllerDefinition::with_routes).
///
/// ```rust,ignore
/// create_controller(|c: &Cradle<'_>| Ok(Todos { repo: c.get("repo")? }))
///     .with_routes(Routes::new().prefix("/todos").get("", "list"))
/// ```
pub fn create_controller<T, F>(factory: F) -> ControllerDefinition<T>
where
    F: Fn(&Cradle<'_>) -> Result<T, Error> + Send + Sync + 'static,
    T: Controller,
{
    ControllerDefinition::new(factory, Routes::new())
}

// ── Registration ──────────────────────────────────────────────────────────────

/// How controller instances are cached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ControllerOptions {
    pub lifetime: Lifetime,
}

impl ControllerOptions {
    /// One instance per request.
    pub const DEFAULT_LIFETIME: Lifetime = Lifetime::Scoped;

    /// `true` shares one instance across all requests, `false` restores
    /// the default.
    pub fn singleton(mut self, singleton: bool) -> Self {
        self.lifetime = if singleton { Lifetime::Singleton } else { Self::DEFAULT_LIFETIME };
        self
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self { lifetime: Self::DEFAULT_LIFETIME }
    }
}

impl From<ControllerOptions> for ResolverOptions {
    fn from(options: ControllerOptions) -> Self {
        ResolverOptions::new(options.lifetime)
    }
}

/// A router holding every route of `definition`.
///
/// Several controllers go on one router by chaining
/// [`Router::controller`], or at once through [`controllers`]:
///
/// ```rust,ignore
/// let router = Router::new()
///     .controller(kura::class::<Todos>(), options)
///     .controller(users_definition(), options.singleton(true));
/// ```
pub fn controller<T: Controller>(
    definition: impl Into<ControllerDefinition<T>>,
    options: ControllerOptions,
) -> Router {
    Router::new().controller(definition, options)
}

/// Mounts one controller on a router. Non-capturing closures coerce to it:
/// `|router, options| router.controller(kura::class::<Todos>(), options)`.
pub type Registration = fn(Router, ControllerOptions) -> Router;

/// A router holding every controller in `registrations`, in order, all
/// registered with `options`.
pub fn controllers(
    registrations: impl IntoIterator<Item = Registration>,
    options: ControllerOptions,
) -> Router {
    registrations
        .into_iter()
        .fold(Router::new(), |router, register| register(router, options))
}

pub(crate) fn register<T: Controller>(
    router: Router,
    definition: ControllerDefinition<T>,
    options: ControllerOptions,
) -> Router {
    let ControllerDefinition { target, routes } = definition;
    let invoker = make_resolver_invoker::<T, Next>(build(target, options.into()));
    debug!(
        controller = invoker.resolver().target_name(),
        lifetime = %options.lifetime,
        "registering controller"
    );

    routes.roll_up().into_iter().fold(router, |router, spec| {
        if spec.verbs.is_empty() {
            return router;
        }
        let RouteSpec { paths, verbs, method, mut before, after } = spec;
        before.push(boxed(invoker.method(method)));
        before.extend(after);
        router.route(&verbs, &paths, before)
    })
}

#[cfg(test)]
mod tests {
    use http::Method;
    use rstest::rstest;

    use super::*;
    use crate::context::Context;
    use crate::middleware::tests::{mark, trail};
    use crate::request::Request;

    fn noop() -> impl Middleware {
        |ctx: Context, next: Next| next.run(ctx)
    }

    #[rstest]
    #[case("/ts", "", "/ts")]
    #[case("/ts", "/get", "/ts/get")]
    #[case("/ts/", "get", "/ts/get")]
    #[case("/", "", "/")]
    #[case("/", "/x", "/x")]
    fn prefixes_join_paths(#[case] prefix: &str, #[case] path: &str, #[case] joined: &str) {
        assert_eq!(join(prefix, path), joined);
    }

    #[test]
    fn roll_up_multiplies_prefixes_and_paths() {
        let specs = Routes::new()
            .prefix("/a")
            .prefix("/b")
            .route(&[Verb::Get], &["/x", "/y"], "m")
            .roll_up();
        assert_eq!(specs[0].paths, ["/a/x", "/a/y", "/b/x", "/b/y"]);
    }

    #[test]
    fn methods_without_paths_mount_at_the_prefix() {
        let specs = Routes::new().prefix("/func").route(&[Verb::Get], &[], "func").roll_up();
        assert_eq!(specs[0].paths, ["/func"]);
    }

    #[test]
    fn repeated_declarations_merge() {
        let specs = Routes::new()
            .get("/one", "m")
            .post("/two", "m")
            .get("/three", "m")
            .roll_up();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].verbs, [Verb::Get, Verb::Post]);
        assert_eq!(specs[0].paths, ["/one", "/two", "/three"]);
    }

    fn marker(step: &'static str) -> impl Middleware {
        move |mut ctx: Context, next: Next| async move {
            mark(&mut ctx, step);
            next.run(ctx).await
        }
    }

    #[tokio::test]
    async fn controller_middleware_wraps_method_middleware() {
        let specs = Routes::new()
            .before(marker("controller before"))
            .after(marker("controller after"))
            .get("/", "m")
            .method_before("m", marker("method before"))
            .method_after("m", marker("method after"))
            .roll_up();
        let RouteSpec { before, after, .. } = specs.into_iter().next().unwrap();
        let chain: Vec<_> = before.into_iter().chain(after).collect();

        let ctx = Next::new(chain).run(Context::new(Request::new(Method::GET, "/"))).await.unwrap();
        assert_eq!(
            trail(&ctx),
            ["controller before", "method before", "method after", "controller after"]
        );
    }

    #[test]
    fn verbless_methods_roll_up_but_are_not_routed() {
        let specs = Routes::new().method_before("helper", noop()).roll_up();
        assert_eq!(specs.len(), 1);
        assert!(specs[0].verbs.is_empty());
    }

    #[test]
    fn singleton_option_toggles_the_lifetime() {
        assert_eq!(ControllerOptions::default().lifetime, Lifetime::Scoped);
        assert_eq!(ControllerOptions::default().singleton(true).lifetime, Lifetime::Singleton);
        assert_eq!(ControllerOptions::default().singleton(false).lifetime, Lifetime::Scoped);
    }
}
