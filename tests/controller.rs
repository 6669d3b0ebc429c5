use std::sync::Arc;

use glob::MatchOptions;
use http::{Method, StatusCode};
use kura::invoker::{BoundMethod, bind};
use kura::middleware::{Next, Outcome};
use kura::{
    App, Construct, Container, Context, Controller, ControllerDefinition, ControllerOptions, Cradle,
    Error, Lifetime, Registration, Request, Response, Routable, Routes, class, controller, controllers,
    create_controller, load_controllers, scope_per_request,
};

struct Service;

impl Service {
    fn get(&self, message: &str) -> Message {
        Message(message.to_owned())
    }
}

#[derive(Clone, Debug)]
struct Message(String);

impl Message {
    fn json(&self) -> Response {
        Response::json(format!(r#"{{"message":"{}"}}"#, self.0))
    }
}

// ── A class with controller-level middleware ─────────────────────────────────

struct TsClass {
    service: Arc<Service>,
}

impl Construct for TsClass {
    fn construct(cradle: &Cradle<'_>) -> Result<Self, Error> {
        Ok(Self { service: cradle.get("service")? })
    }
}

impl TsClass {
    async fn index(self: Arc<Self>, mut ctx: Context, _next: Next) -> Outcome {
        ctx.respond(Message("index".into()).json());
        Ok(ctx)
    }

    async fn func(self: Arc<Self>, mut ctx: Context, next: Next) -> Outcome {
        let message = self.service.get("ts");
        ctx.respond(message.json());
        ctx.state_mut().insert(message);
        next.run(ctx).await
    }

    async fn all(self: Arc<Self>, mut ctx: Context, _next: Next) -> Outcome {
        let body = format!(
            r#"{{"method":"{}","id":"{}"}}"#,
            ctx.request().method(),
            ctx.param("id").unwrap_or_default()
        );
        ctx.respond(Response::json(body));
        Ok(ctx)
    }
}

impl Controller for TsClass {
    fn lookup(self: Arc<Self>, name: &str) -> Option<BoundMethod<Next>> {
        match name {
            "index" => Some(bind(self, Self::index)),
            "func" => Some(bind(self, Self::func)),
            "all" => Some(bind(self, Self::all)),
            _ => None,
        }
    }
}

impl Routable for TsClass {
    fn routes() -> Routes {
        Routes::new()
            .prefix("/ts")
            .before(|mut ctx: Context, next: Next| async move {
                ctx.response_mut().set_header("x-root-before", "ts");
                next.run(ctx).await
            })
            .after(|mut ctx: Context, next: Next| async move {
                if let Some(Message(message)) = ctx.state().get::<Message>().cloned() {
                    ctx.response_mut().set_header("x-root-after", &message);
                }
                next.run(ctx).await
            })
            .get("", "index")
            .get("/get", "func")
            .all("/{id}", "all")
    }
}

kura::export_controller!(TsClass);

// ── A factory-built controller ───────────────────────────────────────────────

struct FuncController {
    service: Arc<Service>,
}

impl FuncController {
    async fn func(self: Arc<Self>, mut ctx: Context, _next: Next) -> Outcome {
        ctx.respond(self.service.get("func").json());
        Ok(ctx)
    }
}

impl Controller for FuncController {
    fn lookup(self: Arc<Self>, name: &str) -> Option<BoundMethod<Next>> {
        (name == "func").then(|| bind(self, Self::func))
    }
}

fn func_controller() -> ControllerDefinition<FuncController> {
    create_controller(|cradle: &Cradle<'_>| Ok(FuncController { service: cradle.get("service")? }))
        .with_routes(Routes::new().prefix("/func").get("", "func"))
}

kura::export_controller!(factory func_controller);

// ── A plain class registered directly ────────────────────────────────────────

struct PlainController;

impl Construct for PlainController {
    fn construct(_: &Cradle<'_>) -> Result<Self, Error> {
        Ok(PlainController)
    }
}

impl PlainController {
    async fn ping(self: Arc<Self>, mut ctx: Context, _next: Next) -> Outcome {
        ctx.respond(Message("pong".into()).json());
        Ok(ctx)
    }
}

impl Controller for PlainController {
    fn lookup(self: Arc<Self>, name: &str) -> Option<BoundMethod<Next>> {
        (name == "ping").then(|| bind(self, Self::ping))
    }
}

impl Routable for PlainController {
    fn routes() -> Routes {
        Routes::new().get("/ping", "ping").method_before("helper", |ctx: Context, next: Next| next.run(ctx))
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

fn app() -> App {
    mount(App::new())
}

fn container() -> Container {
    Container::builder()
        .register_factory("service", |_: &Cradle<'_>| Ok(Service), Lifetime::Transient)
        .build()
}

fn mount(app: App) -> App {
    let container = container();
    let discovered = load_controllers("tests/controller.rs", MatchOptions::new(), ControllerOptions::default())
        .expect("valid pattern");

    app.with(scope_per_request(&container))
        .with(discovered)
        .with(controller(class::<PlainController>(), ControllerOptions::default().singleton(true)))
}

async fn send(app: &App, method: Method, path: &str) -> Response {
    app.handle(Request::new(method, path)).await
}

#[test]
fn exported_controllers_are_discovered_in_file_order() {
    let names: Vec<_> = kura::discover("tests/controller.rs", MatchOptions::new())
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, ["TsClass", "func_controller"]);
}

#[tokio::test]
async fn class_routes_run_controller_middleware() {
    let res = send(&app(), Method::GET, "/ts/get").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("x-root-before"), Some("ts"));
    assert_eq!(res.header("x-root-after"), Some("ts"));
    assert_eq!(res.body(), br#"{"message":"ts"}"#);
}

#[tokio::test]
async fn headers_from_outer_middleware_survive_the_handler() {
    let app = mount(App::new().with(|mut ctx: Context, next: Next| async move {
        ctx.response_mut().set_header("x-powered-by", "kura");
        next.run(ctx).await
    }));

    let res = send(&app, Method::GET, "/ts/get").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("x-powered-by"), Some("kura"));
    assert_eq!(res.header("x-root-before"), Some("ts"));
    assert_eq!(res.header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn methods_that_stop_the_chain_skip_after_middleware() {
    let res = send(&app(), Method::GET, "/ts").await;
    assert_eq!(res.body(), br#"{"message":"index"}"#);
    assert_eq!(res.header("x-root-before"), Some("ts"));
    assert_eq!(res.header("x-root-after"), None);
}

#[tokio::test]
async fn all_routes_answer_every_verb() {
    let app = app();
    for method in [Method::GET, Method::POST] {
        let expected = format!(r#"{{"method":"{method}","id":"123"}}"#);
        let res = send(&app, method, "/ts/123").await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), expected.as_bytes());
    }
}

#[tokio::test]
async fn factory_and_plain_controllers_are_routed() {
    let app = app();
    assert_eq!(send(&app, Method::GET, "/func").await.body(), br#"{"message":"func"}"#);
    assert_eq!(send(&app, Method::GET, "/ping").await.body(), br#"{"message":"pong"}"#);
}

#[tokio::test]
async fn a_list_of_controllers_registers_in_one_call() {
    let registrations: [Registration; 2] = [
        |router, options| router.controller(class::<PlainController>(), options),
        |router, options| router.controller(func_controller(), options),
    ];
    let app = App::new()
        .with(scope_per_request(&container()))
        .with(controllers(registrations, ControllerOptions::default()));

    assert_eq!(send(&app, Method::GET, "/ping").await.body(), br#"{"message":"pong"}"#);
    assert_eq!(send(&app, Method::GET, "/func").await.body(), br#"{"message":"func"}"#);
}

#[tokio::test]
async fn other_verbs_on_known_paths_get_allow() {
    let app = app();

    let res = send(&app, Method::DELETE, "/ping").await;
    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.header("allow"), Some("GET, HEAD"));

    let res = send(&app, Method::OPTIONS, "/func").await;
    assert_eq!(res.status_code(), StatusCode::NO_CONTENT);

    assert_eq!(send(&app, Method::GET, "/missing").await.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn routes_without_a_scope_fail_with_500() {
    let bare = App::new().with(controller(class::<PlainController>(), ControllerOptions::default()));
    let res = send(&bare, Method::GET, "/ping").await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}
