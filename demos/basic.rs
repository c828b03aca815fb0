//! Minimal switchboard example: JSON endpoints, a route group with its own
//! middleware, and health checks.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/users/42
//!   curl -H 'authorization: Bearer admin' http://localhost:3000/admin/stats
//!   curl http://localhost:3000/healthz

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchboard::middleware::{Recover, Trace};
use switchboard::{
    Context, ContextExt, Error, Handler, HttpServer, RouteGroup, Server, ServerConfig, handler,
    health,
};

#[derive(Deserialize, Serialize)]
struct User {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let mut server = Server::new(&ServerConfig::from_env()?);
    {
        let mut routes = server.route_register();
        routes.wrap(Trace);
        routes.wrap(Recover);

        routes.get("/users/:id", get_user());
        routes.post("/users", create_user());
        routes.delete("/users/:id", delete_user());
        routes.get("/healthz", health::liveness());
        routes.get("/readyz", health::readiness());

        let mut admin = routes.group("/admin");
        admin.wrap(require_bearer);
        admin.get("/stats", handler(|ctx| Box::pin(async move {
            ctx.json(200, &serde_json::json!({ "users": 1 }))
        })));
    }

    switchboard::run_until_signal(Arc::new(server)).await
}

// GET /users/:id
fn get_user() -> Handler {
    handler(|ctx| Box::pin(async move {
        let user = User { id: ctx.param("id").to_owned(), name: "alice".to_owned() };
        ctx.json(200, &user)
    }))
}

// POST /users
//
// A malformed body comes back from bind_json as a 400.
fn create_user() -> Handler {
    handler(|ctx| Box::pin(async move {
        let input: CreateUser = ctx.bind_json()?;
        ctx.set_header("location", "/users/99");
        ctx.status(201).write_json(&User { id: "99".to_owned(), name: input.name })
    }))
}

// DELETE /users/:id → 204 No Content
fn delete_user() -> Handler {
    handler(|ctx| Box::pin(async move { ctx.send(204, "text/plain", Vec::new()) }))
}

// Short-circuits with 401 unless the caller is the admin.
fn require_bearer(next: Handler) -> Handler {
    handler(move |ctx| {
        let next = Arc::clone(&next);
        Box::pin(async move {
            if ctx.get_header("authorization") != "Bearer admin" {
                return ctx.string(401, "unauthorized");
            }
            next(ctx).await
        })
    })
}
