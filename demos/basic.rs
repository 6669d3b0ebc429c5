//! Minimal kura example: a request-scoped controller over a singleton store.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/todos
//!   curl -X POST http://localhost:3000/todos -d 'buy milk'
//!   curl http://localhost:3000/todos/0
//!   curl -i -X DELETE http://localhost:3000/todos   → 405, allow: GET, HEAD, POST

use std::sync::Arc;

use parking_lot::Mutex;

use kura::invoker::{BoundMethod, Controller, bind};
use kura::middleware::{Next, Outcome};
use kura::{
    App, Construct, Container, Context, ControllerOptions, Cradle, Error, Lifetime, Response,
    Routable, Routes, Router, Server, scope_per_request,
};

/// Shared by every request.
#[derive(Default)]
struct Store {
    items: Mutex<Vec<String>>,
}

/// Built once per request, from the request's scope.
struct Todos {
    store: Arc<Store>,
    request_id: Arc<u64>,
}

impl Construct for Todos {
    fn construct(cradle: &Cradle<'_>) -> Result<Self, Error> {
        Ok(Self {
            store: cradle.get("store")?,
            request_id: cradle.get("request_id")?,
        })
    }
}

impl Todos {
    async fn list(self: Arc<Self>, mut ctx: Context, next: Next) -> Outcome {
        let items = self.store.items.lock().join("\n");
        tracing::info!(request = *self.request_id, count = items.lines().count(), "listing todos");
        ctx.respond(items);
        next.run(ctx).await
    }

    async fn show(self: Arc<Self>, mut ctx: Context, next: Next) -> Outcome {
        let item = ctx
            .param("id")
            .and_then(|id| id.parse::<usize>().ok())
            .and_then(|id| self.store.items.lock().get(id).cloned());
        match item {
            Some(item) => ctx.respond(item),
            None => ctx.respond(http::StatusCode::NOT_FOUND),
        }
        next.run(ctx).await
    }

    async fn create(self: Arc<Self>, mut ctx: Context, next: Next) -> Outcome {
        let item = String::from_utf8_lossy(ctx.request().body()).into_owned();
        let id = {
            let mut items = self.store.items.lock();
            items.push(item);
            items.len() - 1
        };
        ctx.respond(
            Response::builder()
                .status(http::StatusCode::CREATED)
                .header("location", &format!("/todos/{id}"))
                .no_body(),
        );
        next.run(ctx).await
    }
}

impl Controller for Todos {
    fn lookup(self: Arc<Self>, name: &str) -> Option<BoundMethod<Next>> {
        match name {
            "list" => Some(bind(self, Self::list)),
            "show" => Some(bind(self, Self::show)),
            "create" => Some(bind(self, Self::create)),
            _ => None,
        }
    }
}

impl Routable for Todos {
    fn routes() -> Routes {
        Routes::new()
            .prefix("/todos")
            .after(|mut ctx: Context, next: Next| async move {
                let id = ctx.state().scope().map(|s| s.id()).unwrap_or_default();
                ctx.response_mut().set_header("x-scope", &id.to_string());
                next.run(ctx).await
            })
            .get("", "list")
            .post("", "create")
            .get("/{id}", "show")
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let container = Container::builder()
        .register_factory("store", |_: &Cradle<'_>| Ok(Store::default()), Lifetime::Singleton)
        .register_factory(
            "request_id",
            |cradle: &Cradle<'_>| Ok(cradle.scope().id()),
            Lifetime::Scoped,
        )
        .build();

    let app = App::new()
        .with(scope_per_request(&container))
        .with(Router::new().controller(kura::class::<Todos>(), ControllerOptions::default()));

    Server::bind("0.0.0.0:3000").serve(app).await
}
