//! The per-request context threaded through the middleware pipeline.

use http::{Extensions, StatusCode};

use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::scope::Scope;

/// Everything one request carries through the pipeline.
///
/// A context moves by value from middleware to middleware and comes back
/// out of [`Next::run`](crate::middleware::Next::run), so after-middleware
/// sees whatever the handler left in it. The response starts out as an
/// empty `404 Not Found`.
#[derive(Debug)]
pub struct Context {
    request: Request,
    response: Response,
    state: State,
    /// Set once a router matched a route for this request.
    pub(crate) matched: bool,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::status(StatusCode::NOT_FOUND),
            state: State::default(),
            matched: false,
        }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn response(&self) -> &Response { &self.response }
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }
    pub fn state(&self) -> &State { &self.state }
    pub fn state_mut(&mut self) -> &mut State { &mut self.state }

    /// Sets the pending response's status and body.
    ///
    /// Headers already on the pending response are kept unless `response`
    /// sets the same name, in which case its value wins.
    pub fn respond(&mut self, response: impl IntoResponse) {
        let mut response = response.into_response();
        let mut headers: Vec<_> = std::mem::take(&mut self.response.headers)
            .into_iter()
            .filter(|(name, _)| response.header(name).is_none())
            .collect();
        headers.append(&mut response.headers);
        response.headers = headers;
        self.response = response;
    }

    /// Shorthand for `ctx.request().param(key)`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.request.param(key)
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}

/// Request-local state: the resolution scope plus arbitrary typed values
/// middleware wants to hand down the pipeline.
#[derive(Debug, Default)]
pub struct State {
    scope: Option<Scope>,
    extensions: Extensions,
}

impl State {
    /// The scope attached by `scope_per_request` or `attach_container`.
    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// Attaches `scope`, returning the one it replaces.
    pub fn set_scope(&mut self, scope: Scope) -> Option<Scope> {
        self.scope.replace(scope)
    }

    pub fn take_scope(&mut self) -> Option<Scope> {
        self.scope.take()
    }

    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get()
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.extensions.get_mut()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions.remove()
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::Container;

    #[test]
    fn new_contexts_have_no_scope_and_a_404() {
        let ctx = Context::new(Request::new(Method::GET, "/"));
        assert!(ctx.state().scope().is_none());
        assert_eq!(ctx.response().status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn respond_keeps_headers_set_earlier() {
        let mut ctx = Context::new(Request::new(Method::GET, "/"));
        ctx.response_mut().set_header("x-root-before", "ts");
        ctx.response_mut().set_header("content-type", "text/html");
        ctx.respond(Response::json("{}"));

        let res = ctx.response();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"{}");
        assert_eq!(res.header("x-root-before"), Some("ts"));
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.headers.len(), 2);
    }

    #[test]
    fn state_holds_one_scope_at_a_time() {
        let container = Container::builder().build();
        let mut state = State::default();
        assert!(state.set_scope(container.create_scope()).is_none());
        assert!(state.set_scope(container.create_scope()).is_some());
        assert!(state.take_scope().is_some());
        assert!(state.scope().is_none());
    }

    #[test]
    fn typed_values_round_trip() {
        #[derive(Clone, Debug, PartialEq)]
        struct RequestId(u64);

        let mut state = State::default();
        state.insert(RequestId(7));
        assert_eq!(state.get::<RequestId>(), Some(&RequestId(7)));
        state.get_mut::<RequestId>().unwrap().0 = 8;
        assert_eq!(state.remove::<RequestId>(), Some(RequestId(8)));
    }
}
