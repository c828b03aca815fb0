//! # switchboard
//!
//! An HTTP server facade for Rust services: application code talks to a
//! small set of traits, and the engine underneath does the HTTP.
//!
//! ## The contract
//!
//! Handlers and middleware only ever see a [`Context`]. Routes are declared
//! on [`RouteGroup`]s. The server is driven through [`Lifecycle`]. None of
//! these name the engine, so application code keeps working if the engine
//! is swapped for another.
//!
//! The bundled engine ([`engine`]) is hyper for the connections and
//! [`matchit`] for the radix-tree routing. Code that needs something the
//! facade does not model can reach the engine through
//! [`RouteRegister::native_engine`] and native middleware, and is tied to it
//! from then on.
//!
//! What is deliberately left to the reverse proxy in front of it:
//!
//! - **TLS termination**: nginx SSL / k8s ingress
//! - **Body-size limits**: `client_max_body_size`
//! - **Rate limiting**: `limit_req` / ingress-nginx annotations
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use switchboard::{
//!     Context, ContextExt, Error, HttpServer, RouteGroup, Server, ServerConfig, handler,
//!     middleware::Trace,
//! };
//!
//! #[derive(serde::Deserialize, serde::Serialize)]
//! struct User {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let mut server = Server::new(&ServerConfig::from_env()?);
//!     {
//!         let mut routes = server.route_register();
//!         routes.wrap(Trace);
//!
//!         let mut users = routes.group("/users");
//!         users.get("/:id", handler(|ctx| Box::pin(async move {
//!             let id = ctx.param("id").to_owned();
//!             ctx.json(200, &serde_json::json!({ "id": id }))
//!         })));
//!         users.post("/", handler(|ctx| Box::pin(async move {
//!             let user: User = ctx.bind_json()?;
//!             ctx.status(201).write_json(&user)
//!         })));
//!     }
//!
//!     switchboard::run_until_signal(Arc::new(server)).await
//! }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod lifecycle;
mod method;
mod route;

pub mod engine;
pub mod health;
pub mod middleware;

pub use config::{HttpConfig, ServerConfig};
pub use context::{Context, ContextExt, RequestSignal};
pub use engine::{Engine, Register, Server};
pub use error::{Error, Part};
pub use handler::{BoxFuture, Handler, handler};
pub use lifecycle::{HttpServer, Lifecycle, State, launch, run_until_signal, shutdown_signal};
pub use method::Method;
pub use middleware::{Layer, Middleware};
pub use route::{RouteGroup, RouteRegister};
