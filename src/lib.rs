//! # kura
//!
//! Request-scoped dependency injection for an async HTTP pipeline.
//!
//! Every request gets its own resolution [`Scope`]. Controllers are built
//! from that scope right before one of their methods runs, so a handler
//! sees exactly the dependencies registered for it: shared singletons,
//! per-request services, or fresh transients.
//!
//! ## Pieces
//!
//! - [`Container`] / [`Scope`] / [`Cradle`]: registration and resolution,
//!   with [`Lifetime::Singleton`], [`Lifetime::Scoped`] and
//!   [`Lifetime::Transient`] caching, cycle detection and a depth limit.
//! - [`resolver`]: classifies a handler as a class ([`Construct`]) or a
//!   factory function and pairs it with a lifetime.
//! - [`invoker`]: resolves an instance from the request's scope and calls a
//!   named method on it.
//! - [`middleware::scope`]: attaches the scope to each request.
//! - [`controller`] / [`Router`] / [`discovery`]: route tables, radix-tree
//!   routing via [`matchit`], link-time controller discovery.
//! - [`App`] / [`Server`]: the middleware host and a hyper server with
//!   graceful shutdown.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kura::{App, Construct, Container, Context, Cradle, Error, Lifetime, Routable, Routes, Router, Server};
//! use kura::invoker::{BoundMethod, Controller, bind};
//! use kura::middleware::{Next, Outcome, scope::scope_per_request};
//!
//! struct Greeter { greeting: Arc<String> }
//!
//! impl Construct for Greeter {
//!     fn construct(cradle: &Cradle<'_>) -> Result<Self, Error> {
//!         Ok(Self { greeting: cradle.get("greeting")? })
//!     }
//! }
//!
//! impl Greeter {
//!     async fn hello(self: Arc<Self>, mut ctx: Context, next: Next) -> Outcome {
//!         let name = ctx.param("name").unwrap_or("world").to_owned();
//!         ctx.respond(format!("{}, {name}!", self.greeting));
//!         next.run(ctx).await
//!     }
//! }
//!
//! impl Controller for Greeter {
//!     fn lookup(self: Arc<Self>, name: &str) -> Option<BoundMethod<Next>> {
//!         (name == "hello").then(|| bind(self, Self::hello))
//!     }
//! }
//!
//! impl Routable for Greeter {
//!     fn routes() -> Routes {
//!         Routes::new().get("/hello/{name}", "hello")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let container = Container::builder()
//!         .register_value("greeting", String::from("Hello"))
//!         .build();
//!
//!     let app = App::new()
//!         .with(scope_per_request(&container))
//!         .with(Router::new().controller(kura::class::<Greeter>(), Default::default()));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//! ```

mod app;
mod container;
mod context;
mod error;
mod lifetime;
mod request;
mod response;
mod router;
mod scope;
mod server;
mod verb;

pub mod controller;
pub mod discovery;
pub mod invoker;
pub mod middleware;
pub mod resolver;

pub use app::App;
pub use container::{Container, ContainerBuilder, ContainerOptions};
pub use context::{Context, State};
pub use controller::{
    ControllerDefinition, ControllerOptions, Registration, Routable, RouteSpec, Routes, controller, controllers,
    create_controller,
};
pub use discovery::{ControllerEntry, discover, load_controllers};
pub use error::{BoxError, Error, ResolutionPath};
pub use invoker::{
    Controller, Invoker, MemberInvoker, MethodName, make_class_invoker, make_function_invoker,
    make_invoker, make_resolver_invoker,
};
pub use lifetime::Lifetime;
pub use middleware::scope::{attach_container, scope_per_request};
pub use request::Request;
pub use resolver::{
    Class, Construct, HandlerKind, HandlerReference, IntoHandlerReference, ResolverDescriptor,
    ResolverOptions, as_class, as_function, class,
};
pub use response::{ContentType, IntoResponse, Response};
pub use router::Router;
pub use scope::{Cradle, Scope};
pub use server::Server;
pub use verb::Verb;

#[doc(hidden)]
pub use inventory;
