//! Route groups and middleware composition, dispatched in-process.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use switchboard::engine::native;
use switchboard::middleware::{Recover, Trace};
use switchboard::{
    Context, ContextExt, Engine, Error, Handler, Layer, Method, Register, RouteGroup,
    RouteRegister, handler,
};

struct Reply {
    status: StatusCode,
    headers: http::HeaderMap,
    body: String,
}

async fn send(engine: &Engine, req: http::Request<Bytes>) -> Reply {
    let (parts, body) = engine.handle(req).await.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

async fn get(engine: &Engine, uri: &str) -> Reply {
    send(engine, http::Request::get(uri).body(Bytes::new()).unwrap()).await
}

type Log = Arc<Mutex<Vec<String>>>;

/// Middleware recording `name` before and after the rest of the chain.
fn record(log: &Log, name: &'static str) -> impl Fn(Handler) -> Handler + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |next: Handler| {
        let log = Arc::clone(&log);
        handler(move |ctx| {
            let next = Arc::clone(&next);
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push(format!("{name}:before"));
                let result = next(ctx).await;
                log.lock().unwrap().push(format!("{name}:after"));
                result
            })
        })
    }
}

fn text(body: &'static str) -> Handler {
    handler(move |ctx| Box::pin(async move { ctx.string(200, body) }))
}

#[tokio::test]
async fn ancestors_run_before_descendants() {
    let log: Log = Arc::default();
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.wrap(record(&log, "root"));
        let mut api = root.group("/api");
        api.wrap(record(&log, "api"));
        let mut v1 = api.group("/v1");
        v1.wrap(record(&log, "v1"));

        let handler_log = Arc::clone(&log);
        v1.get("/items", handler(move |ctx| {
            let log = Arc::clone(&handler_log);
            Box::pin(async move {
                log.lock().unwrap().push("handler".to_owned());
                ctx.string(200, "items")
            })
        }));
    }

    let reply = get(&engine, "/api/v1/items").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        *log.lock().unwrap(),
        [
            "root:before", "api:before", "v1:before", "handler", "v1:after", "api:after",
            "root:after",
        ]
    );
}

#[tokio::test]
async fn layers_in_one_call_run_in_order() {
    let log: Log = Arc::default();
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        let native_log = Arc::clone(&log);
        let handler_log = Arc::clone(&log);
        root.use_middleware(vec![
            Layer::wrap(record(&log, "wrap")),
            Layer::native(native(move |ctx| {
                let log = Arc::clone(&native_log);
                Box::pin(async move {
                    log.lock().unwrap().push("native".to_owned());
                    ctx.next().await
                })
            })),
            Layer::handler(handler(move |ctx| {
                let log = Arc::clone(&handler_log);
                Box::pin(async move {
                    log.lock().unwrap().push("plain".to_owned());
                    ctx.next().await
                })
            })),
        ]);
        root.get("/", text("done"));
    }

    assert_eq!(get(&engine, "/").await.body, "done");
    assert_eq!(*log.lock().unwrap(), ["wrap:before", "native", "plain", "wrap:after"]);
}

#[tokio::test]
async fn middleware_applies_only_to_later_routes() {
    let log: Log = Arc::default();
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.get("/early", text("early"));
        root.wrap(record(&log, "late"));
        root.get("/after", text("after"));
    }

    get(&engine, "/early").await;
    assert!(log.lock().unwrap().is_empty());
    get(&engine, "/after").await;
    assert_eq!(*log.lock().unwrap(), ["late:before", "late:after"]);
}

#[tokio::test]
async fn sibling_groups_do_not_share_middleware() {
    let log: Log = Arc::default();
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        let mut admin = root.group("/admin");
        admin.wrap(record(&log, "admin"));
        admin.get("/", text("admin"));
        root.group("/public").get("/", text("public"));
    }

    assert_eq!(get(&engine, "/public").await.body, "public");
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(get(&engine, "/admin").await.body, "admin");
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn nested_path_matches_only_the_full_prefix() {
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.group("/a").group("/b").get("/c", text("c"));
    }

    assert_eq!(get(&engine, "/a/b/c").await.body, "c");
    for path in ["/c", "/b/c", "/a/c", "/a/b"] {
        assert_eq!(get(&engine, path).await.status, StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn header_set_before_next_reaches_the_response() {
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.wrap(|next: Handler| {
            handler(move |ctx| {
                let next = Arc::clone(&next);
                Box::pin(async move {
                    ctx.set_header("X-Trace", "1");
                    next(ctx).await
                })
            })
        });
        root.get("/ping", handler(|ctx| Box::pin(async move {
            ctx.json(200, &serde_json::json!({ "ok": true }))
        })));
    }

    let reply = get(&engine, "/ping").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["x-trace"], "1");
    assert_eq!(reply.body, r#"{"ok":true}"#);
}

#[tokio::test]
async fn middleware_can_short_circuit() {
    let reached = Arc::new(Mutex::new(false));
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        let mut admin = root.group("/admin");
        admin.wrap(|next: Handler| {
            handler(move |ctx| {
                let next = Arc::clone(&next);
                Box::pin(async move {
                    if ctx.get_header("authorization").is_empty() {
                        return ctx.json(401, &serde_json::json!({ "error": "unauthorized" }));
                    }
                    next(ctx).await
                })
            })
        });
        let reached = Arc::clone(&reached);
        admin.get("/stats", handler(move |ctx| {
            let reached = Arc::clone(&reached);
            Box::pin(async move {
                *reached.lock().unwrap() = true;
                ctx.string(200, "stats")
            })
        }));
    }

    let reply = get(&engine, "/admin/stats").await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, r#"{"error":"unauthorized"}"#);
    assert!(!*reached.lock().unwrap());

    let req = http::Request::get("/admin/stats")
        .header("authorization", "Bearer x")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(send(&engine, req).await.body, "stats");
}

#[tokio::test]
async fn handler_error_travels_back_through_next() {
    let seen = Arc::new(Mutex::new(None));
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        let seen = Arc::clone(&seen);
        root.wrap(move |next: Handler| {
            let seen = Arc::clone(&seen);
            handler(move |ctx| {
                let next = Arc::clone(&next);
                let seen = Arc::clone(&seen);
                Box::pin(async move {
                    let result = next(ctx).await;
                    *seen.lock().unwrap() = result.as_ref().err().map(|e| e.status_code());
                    result
                })
            })
        });
        root.get("/teapot", handler(|_| Box::pin(async { Err::<(), _>(Error::status(418, "short and stout")) })));
    }

    let reply = get(&engine, "/teapot").await;
    assert_eq!(*seen.lock().unwrap(), Some(StatusCode::IM_A_TEAPOT));
    assert_eq!(reply.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(reply.body, "short and stout");
}

#[tokio::test]
async fn middleware_can_swallow_an_error() {
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.wrap(|next: Handler| {
            handler(move |ctx| {
                let next = Arc::clone(&next);
                Box::pin(async move {
                    match next(ctx).await {
                        Ok(()) => Ok(()),
                        Err(e) => ctx.json(200, &serde_json::json!({ "recovered": e.to_string() })),
                    }
                })
            })
        });
        root.get("/fail", handler(|_| Box::pin(async { Err::<(), _>(Error::handler("db down")) })));
    }

    let reply = get(&engine, "/fail").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, r#"{"recovered":"db down"}"#);
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
struct User {
    id: u64,
    name: String,
}

#[tokio::test]
async fn status_then_write_json() {
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.post("/users", handler(|ctx| Box::pin(async move {
            let user: User = ctx.bind_json()?;
            ctx.status(201).write_json(&user)
        })));
    }

    let req = http::Request::post("/users")
        .header("content-type", "application/json")
        .body(Bytes::from_static(br#"{"id":7,"name":"ada"}"#))
        .unwrap();
    let reply = send(&engine, req).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.headers["content-type"], "application/json");
    assert_eq!(serde_json::from_str::<User>(&reply.body).unwrap(), User { id: 7, name: "ada".into() });
}

#[tokio::test]
async fn malformed_json_is_a_400() {
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.post("/users", handler(|ctx| Box::pin(async move {
            let user: User = ctx.bind_json()?;
            ctx.json(201, &user)
        })));
    }

    let req = http::Request::post("/users").body(Bytes::from_static(b"{\"id\":")).unwrap();
    let reply = send(&engine, req).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.starts_with("decode body:"), "{}", reply.body);
}

#[derive(Debug, Deserialize)]
struct Page {
    page: u32,
    #[serde(default)]
    tag: Option<String>,
}

#[tokio::test]
async fn binds_path_and_query() {
    #[derive(Deserialize)]
    struct Ids {
        org: String,
        id: u64,
    }

    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.group("/orgs/:org").get("/users/{id}", handler(|ctx| Box::pin(async move {
            let ids: Ids = ctx.bind_uri()?;
            let page: Page = ctx.bind_query()?;
            let tag = page.tag.unwrap_or_default();
            ctx.string(200, &format!("{} {} {} {}", ids.org, ids.id, page.page, tag))
        })));
    }

    assert_eq!(get(&engine, "/orgs/acme/users/5?page=2&tag=a%20b").await.body, "acme 5 2 a b");
    assert_eq!(get(&engine, "/orgs/acme/users/x?page=2").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(get(&engine, "/orgs/acme/users/5").await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bind_body_follows_content_type() {
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.put("/users", handler(|ctx| Box::pin(async move {
            let user: User = ctx.bind_body()?;
            ctx.string(200, &user.name)
        })));
    }

    let cases = [
        ("application/json; charset=utf-8", &br#"{"id":1,"name":"json"}"#[..], StatusCode::OK),
        ("application/x-www-form-urlencoded", b"id=1&name=form", StatusCode::OK),
        ("text/csv", b"1,csv", StatusCode::BAD_REQUEST),
    ];
    for (content_type, body, status) in cases {
        let req = http::Request::put("/users")
            .header("content-type", content_type)
            .body(Bytes::copy_from_slice(body))
            .unwrap();
        assert_eq!(send(&engine, req).await.status, status, "{content_type}");
    }
}

#[tokio::test]
async fn get_routes_answer_head() {
    let mut engine = Engine::new();
    Register::new(&mut engine).get("/doc", text("doc"));

    let req = http::Request::head("/doc").body(Bytes::new()).unwrap();
    assert_eq!(send(&engine, req).await.status, StatusCode::OK);

    let req = http::Request::post("/doc").body(Bytes::new()).unwrap();
    let reply = send(&engine, req).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.headers["allow"], "GET, HEAD");
}

#[tokio::test]
async fn any_registers_every_method() {
    let mut engine = Engine::new();
    Register::new(&mut engine).any("/echo", handler(|ctx| Box::pin(async move {
        let method = ctx.method().to_owned();
        ctx.string(200, &method)
    })));

    for method in Method::ALL {
        let req = http::Request::builder()
            .method(method.as_str())
            .uri("/echo")
            .body(Bytes::new())
            .unwrap();
        assert_eq!(send(&engine, req).await.body, method.as_str());
    }
}

fn explode() -> Result<(), Error> {
    panic!("boom")
}

#[tokio::test]
async fn recover_turns_a_panic_into_500() {
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.wrap(Trace);
        root.wrap(Recover);
        root.get("/panic", handler(|_| Box::pin(async { explode() })));
        root.get("/fine", text("fine"));
    }

    let reply = get(&engine, "/panic").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, "Internal Server Error");
    assert_eq!(get(&engine, "/fine").await.body, "fine");
}

#[tokio::test]
async fn native_engine_sets_the_error_handler() {
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.native_engine().set_error_handler(|ctx, err| {
            let body = serde_json::json!({ "error": err.to_string() }).to_string();
            ctx.status(err.status_code());
            ctx.send(http::HeaderValue::from_static("application/json"), body);
        });
        root.get("/deny", handler(|_| Box::pin(async { Err::<(), _>(Error::status(403, "forbidden")) })));
    }

    let reply = get(&engine, "/deny").await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body, r#"{"error":"forbidden"}"#);
}

#[tokio::test]
async fn unmatched_requests_skip_middleware() {
    let log: Log = Arc::default();
    let mut engine = Engine::new();
    {
        let mut root = Register::new(&mut engine);
        root.wrap(record(&log, "root"));
        root.get("/items", text("items"));
    }

    assert_eq!(get(&engine, "/missing").await.status, StatusCode::NOT_FOUND);
    let req = http::Request::post("/items").body(Bytes::new()).unwrap();
    assert_eq!(send(&engine, req).await.status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn trailing_slash_is_significant() {
    let mut engine = Engine::new();
    Register::new(&mut engine).group("/api").get("/", text("api"));

    assert_eq!(get(&engine, "/api").await.body, "api");
    assert_eq!(get(&engine, "/api/").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_method_token_is_405() {
    let mut engine = Engine::new();
    Register::new(&mut engine).any("/dav", text("dav"));

    let req = http::Request::builder().method("PROPFIND").uri("/dav").body(Bytes::new()).unwrap();
    assert_eq!(send(&engine, req).await.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[test]
#[should_panic(expected = "invalid route")]
fn duplicate_route_panics_at_registration() {
    let mut engine = Engine::new();
    let mut root = Register::new(&mut engine);
    root.get("/users/:id", text("a"));
    root.group("/users").get("/{id}", text("b"));
}
