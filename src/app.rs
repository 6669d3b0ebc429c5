//! The application host: an ordered middleware stack.

use std::sync::Arc;

use tracing::error;

use crate::context::Context;
use crate::middleware::{BoxedMiddleware, Middleware, Next, boxed};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// An ordered middleware stack. Requests enter at the first middleware
/// added; the context that comes back out becomes the response.
///
/// ```rust
/// use kura::{App, Container, Router};
/// use kura::middleware::scope::scope_per_request;
///
/// let container = Container::builder().build();
/// let app = App::new()
///     .with(scope_per_request(&container))
///     .with(Router::new());
/// ```
#[derive(Clone)]
pub struct App {
    stack: Arc<[BoxedMiddleware]>,
}

impl App {
    pub fn new() -> Self {
        Self { stack: Arc::new([]) }
    }

    /// Appends `middleware` to the stack.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        let mut stack = self.stack.to_vec();
        stack.push(boxed(middleware));
        self.stack = stack.into();
        self
    }

    /// Runs `request` through the stack. An error escaping the stack is
    /// logged and answered with `500 Internal Server Error`.
    pub async fn handle(&self, request: Request) -> Response {
        let method = request.method().clone();
        let path = request.path().to_owned();
        match Next::new(Arc::clone(&self.stack)).run(Context::new(request)).await {
            Ok(ctx) => ctx.into_response(),
            Err(e) => {
                error!(%method, path, error = %e, "request failed");
                e.into_response()
            }
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").field("middleware", &self.stack.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};

    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn empty_apps_answer_404() {
        let res = App::new().handle(Request::new(Method::GET, "/")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn escaped_errors_become_500() {
        let app = App::new().with(|_ctx: Context, _next: Next| async move {
            Err(Error::MissingScope { method: "index".into() })
        });
        let res = app.handle(Request::new(Method::GET, "/")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn middleware_runs_in_insertion_order() {
        let app = App::new()
            .with(|mut ctx: Context, next: Next| async move {
                ctx.respond("outer");
                let mut ctx = next.run(ctx).await?;
                let inner = String::from_utf8_lossy(ctx.response().body()).into_owned();
                ctx.respond(format!("outer({inner})"));
                Ok(ctx)
            })
            .with(|mut ctx: Context, next: Next| async move {
                ctx.respond("inner");
                next.run(ctx).await
            });
        let res = app.handle(Request::new(Method::GET, "/")).await;
        assert_eq!(res.body(), b"outer(inner)");
    }
}
