//! Radix-tree request router.
//!
//! One tree per HTTP method, plus one for [`Verb::All`]. O(path-length)
//! lookup. A route is a middleware chain; when it matches, the chain runs
//! and then continues into whatever follows the router in the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::context::Context;
use crate::controller::{ControllerDefinition, ControllerOptions};
use crate::error::Error;
use crate::invoker::Controller;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next, Outcome, boxed};
use crate::response::Response;
use crate::verb::Verb;

#[derive(Clone)]
struct Route {
    chain: Arc<[BoxedMiddleware]>,
}

/// The application router.
///
/// Build it once at startup and install it with
/// [`App::with`](crate::App::with). Each registration returns `self` so
/// calls chain naturally.
///
/// When no route matches but the path is routed for other methods, the
/// router answers after the rest of the pipeline has run: `OPTIONS` gets
/// `204 No Content`, anything else `405 Method Not Allowed`, both with an
/// `allow` header.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    any: MatchitRouter<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `middleware` for a verb + path pair.
    ///
    /// Path parameters use `{name}` syntax; `ctx.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use kura::{Context, Router, Verb, middleware::Next};
    /// Router::new().on(Verb::Get, "/users/{id}", |mut ctx: Context, next: Next| async move {
    ///     let id = ctx.param("id").unwrap_or_default().to_owned();
    ///     ctx.respond(id);
    ///     next.run(ctx).await
    /// });
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with a route
    /// already registered for the same verb.
    pub fn on(self, verb: Verb, path: &str, middleware: impl Middleware) -> Self {
        self.route(&[verb], &[path], vec![boxed(middleware)])
    }

    /// Registers one chain under every combination of `verbs` and `paths`.
    ///
    /// # Panics
    ///
    /// Same as [`on`](Router::on).
    pub fn route<P: AsRef<str>>(mut self, verbs: &[Verb], paths: &[P], chain: Vec<BoxedMiddleware>) -> Self {
        let route = Route { chain: chain.into() };
        for verb in verbs {
            for path in paths {
                let path = path.as_ref();
                let tree = match verb.method() {
                    Some(method) => self.routes.entry(method).or_default(),
                    None => &mut self.any,
                };
                tree.insert(path, route.clone())
                    .unwrap_or_else(|e| panic!("invalid route `{verb} {path}`: {e}"));
                debug!(%verb, path, "route registered");
            }
        }
        self
    }

    /// Registers every route of a controller. See
    /// [`controller`](crate::controller::controller).
    pub fn controller<T: Controller>(
        self,
        definition: impl Into<ControllerDefinition<T>>,
        options: ControllerOptions,
    ) -> Self {
        crate::controller::register(self, definition.into(), options)
    }

    /// Registers every exported controller whose source file matches
    /// `pattern`. See [`load_controllers`](crate::discovery::load_controllers).
    pub fn import_controllers(
        self,
        pattern: &str,
        glob_options: glob::MatchOptions,
        options: ControllerOptions,
    ) -> Result<Self, Error> {
        let entries = crate::discovery::discover(pattern, glob_options)?;
        Ok(entries.into_iter().fold(self, |router, entry| (entry.register)(router, options)))
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(Route, HashMap<String, String>)> {
        let at = |method: &Method| self.routes.get(method).and_then(|tree| tree.at(path).ok());
        let matched = at(method)
            .or_else(|| if *method == Method::HEAD { at(&Method::GET) } else { None })
            .or_else(|| self.any.at(path).ok())?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }

    /// Methods routed for `path`, sorted. Empty when the path is unknown.
    fn allowed(&self, path: &str) -> Vec<&str> {
        let mut allowed: Vec<&str> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.as_str())
            .collect();
        if allowed.contains(&"GET") && !allowed.contains(&"HEAD") {
            allowed.push("HEAD");
        }
        allowed.sort_unstable();
        allowed
    }
}

impl Middleware for Router {
    fn call(&self, mut ctx: Context, next: Next) -> BoxFuture<Outcome> {
        let method = ctx.request().method().clone();
        let path = ctx.request().path().to_owned();

        if let Some((route, params)) = self.lookup(&method, &path) {
            ctx.request_mut().params.extend(params);
            ctx.matched = true;
            return Next::new(route.chain).then(next).run(ctx);
        }

        let allowed = self.allowed(&path);
        if allowed.is_empty() {
            return next.run(ctx);
        }
        let allow = allowed.join(", ");
        Box::pin(async move {
            let mut ctx = next.run(ctx).await?;
            if !ctx.matched && ctx.response().status_code() == StatusCode::NOT_FOUND {
                let status = match method {
                    Method::OPTIONS => StatusCode::NO_CONTENT,
                    _ => StatusCode::METHOD_NOT_ALLOWED,
                };
                let mut response = Response::status(status);
                response.set_header("allow", &allow);
                ctx.respond(response);
            }
            Ok(ctx)
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<_> = self.routes.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("Router").field("methods", &methods).finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::request::Request;

    fn reply(body: &'static str) -> impl Middleware {
        move |mut ctx: Context, next: Next| async move {
            ctx.respond(body);
            next.run(ctx).await
        }
    }

    fn router() -> Router {
        Router::new()
            .on(Verb::Get, "/users/{id}", reply("get"))
            .on(Verb::Delete, "/users/{id}", reply("delete"))
            .on(Verb::All, "/any", reply("any"))
    }

    async fn send(router: &Router, method: Method, path: &str) -> Context {
        router.call(Context::new(Request::new(method, path)), Next::end()).await.unwrap()
    }

    #[tokio::test]
    async fn matched_routes_carry_path_params() {
        let ctx = send(&router(), Method::GET, "/users/42").await;
        assert_eq!(ctx.param("id"), Some("42"));
        assert_eq!(ctx.response().body(), b"get");
        assert!(ctx.matched);
    }

    #[rstest]
    #[case(Method::GET)]
    #[case(Method::POST)]
    #[case(Method::from_bytes(b"PURGE").unwrap())]
    #[tokio::test]
    async fn all_matches_every_method(#[case] method: Method) {
        let ctx = send(&router(), method, "/any").await;
        assert_eq!(ctx.response().body(), b"any");
    }

    #[tokio::test]
    async fn head_falls_back_to_get() {
        let ctx = send(&router(), Method::HEAD, "/users/1").await;
        assert_eq!(ctx.response().body(), b"get");
    }

    #[tokio::test]
    async fn wrong_method_gets_405_with_allow() {
        let ctx = send(&router(), Method::PUT, "/users/1").await;
        assert_eq!(ctx.response().status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ctx.response().header("allow"), Some("DELETE, GET, HEAD"));
    }

    #[tokio::test]
    async fn options_gets_204_with_allow() {
        let ctx = send(&router(), Method::OPTIONS, "/users/1").await;
        assert_eq!(ctx.response().status_code(), StatusCode::NO_CONTENT);
        assert_eq!(ctx.response().header("allow"), Some("DELETE, GET, HEAD"));
    }

    #[tokio::test]
    async fn unknown_paths_pass_through_untouched() {
        let ctx = send(&router(), Method::GET, "/nowhere").await;
        assert_eq!(ctx.response().status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ctx.response().header("allow"), None);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        let _ = Router::new()
            .on(Verb::Get, "/a", reply("1"))
            .on(Verb::Get, "/a", reply("2"));
    }
}
