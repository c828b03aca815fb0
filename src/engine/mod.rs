//! The native engine: hyper drives connections, matchit matches paths.
//!
//! One radix tree per HTTP method maps a path to the *chain* registered for
//! it: every middleware stage in installation order, then the route handler.
//! A request gets one native [`Ctx`]; the engine enters the first stage and
//! each stage advances with [`Ctx::next`]. Whatever error escapes the first
//! stage goes to the error handler, which writes the response.
//!
//! Routing rules this engine picks:
//! - Middleware lives in each route's chain, so a request that matches no
//!   route (`404`, `405`) runs no middleware at all and goes straight to the
//!   error handler. Replace the error handler to log or decorate those.
//! - Paths match exactly, trailing slash included: a route at `/api` does
//!   not answer `/api/`. Register both if both should work.
//! - A route that conflicts with one already registered for the same method
//!   panics at registration.
//!
//! The rest of this module adapts the engine to the facade:
//!
//! ```text
//! Server ── owns ──> Engine <── &mut ── Register / Group   (build time)
//!                      │
//!                      └─ per request: Ctx ── wrapped by ──> Facade: Context
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http::header::{ALLOW, HeaderValue};
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use tracing::{debug, error};

use crate::context::RequestSignal;
use crate::error::Error;
use crate::method::Method;
use crate::route;

mod facade;
mod group;
mod native;
mod server;

pub use facade::Facade;
pub use group::{Group, Register};
pub use native::{Ctx, NativeHandler, native};
pub use server::Server;

/// Turns the error that escaped a chain into the response.
pub type ErrorHandler = Arc<dyn Fn(&mut Ctx, Error) + Send + Sync>;

type Chain = Arc<[NativeHandler]>;

enum Lookup {
    Found(Chain, Vec<(String, String)>),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// The routing table plus the error handler.
pub struct Engine {
    routes: HashMap<Method, MatchitRouter<Chain>>,
    error_handler: ErrorHandler,
}

impl Engine {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), error_handler: Arc::new(default_error_handler) }
    }

    /// Registers `chain` for each of `methods` at `path`.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with a route
    /// already registered for one of the methods. Both are programming
    /// errors and surface at startup, before any request is served.
    pub fn add(&mut self, methods: &[Method], path: &str, chain: Vec<NativeHandler>) {
        let pattern = route::normalize(path);
        let chain: Chain = chain.into();

        for &method in methods {
            self.routes
                .entry(method)
                .or_default()
                .insert(pattern.as_str(), Arc::clone(&chain))
                .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
        }
        debug!(?methods, path = %pattern, stages = chain.len(), "route registered");
    }

    /// Replaces the default error handler.
    pub fn set_error_handler(&mut self, handler: impl Fn(&mut Ctx, Error) + Send + Sync + 'static) {
        self.error_handler = Arc::new(handler);
    }

    /// Dispatches one buffered request without a socket.
    pub async fn handle(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        self.dispatch(req, RequestSignal::detached()).await
    }

    pub(crate) async fn dispatch(
        &self,
        req: http::Request<Bytes>,
        signal: RequestSignal,
    ) -> http::Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let found = self.lookup(&parts.method, parts.uri.path());

        let (mut ctx, result) = match found {
            Lookup::Found(chain, params) => {
                let mut ctx = Ctx::new(parts, body, params, chain, signal);
                let result = run(&mut ctx).await;
                (ctx, result)
            }
            Lookup::MethodNotAllowed(allowed) => {
                let mut ctx = Ctx::new(parts, body, Vec::new(), empty_chain(), signal);
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    ctx.response_headers_mut().insert(ALLOW, value);
                }
                (ctx, Err(Error::status(405, "Method Not Allowed")))
            }
            Lookup::NotFound => {
                let err = Error::status(404, format!("Cannot {} {}", parts.method, parts.uri.path()));
                (Ctx::new(parts, body, Vec::new(), empty_chain(), signal), Err(err))
            }
        };

        if let Err(err) = result {
            (self.error_handler)(&mut ctx, err);
        }
        ctx.into_response()
    }

    fn lookup(&self, method: &http::Method, path: &str) -> Lookup {
        let known = Method::try_from(method).ok();

        if let Some(found) = known
            .and_then(|m| self.routes.get(&m))
            .and_then(|tree| tree.at(path).ok())
        {
            let params = found.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
            return Lookup::Found(Arc::clone(found.value), params);
        }

        let allowed: Vec<Method> = Method::ALL
            .into_iter()
            .filter(|m| self.routes.get(m).is_some_and(|tree| tree.at(path).is_ok()))
            .collect();

        if known.is_none() || !allowed.is_empty() {
            Lookup::MethodNotAllowed(allowed)
        } else {
            Lookup::NotFound
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Enters the chain, bounded by the request deadline if there is one.
async fn run(ctx: &mut Ctx) -> Result<(), Error> {
    let signal = ctx.signal().clone();
    let Some(deadline) = signal.deadline() else {
        return ctx.next().await;
    };

    match tokio::time::timeout_at(deadline, ctx.next()).await {
        Ok(result) => result,
        Err(_) => {
            signal.cancel();
            Err(Error::status(503, "request deadline exceeded"))
        }
    }
}

fn empty_chain() -> Chain {
    Arc::from(Vec::new())
}

/// Answers with the error's status and a plain-text message.
///
/// Client errors and explicit [`Error::Status`] failures show their message;
/// anything else is logged and answered with the bare reason phrase.
pub fn default_error_handler(ctx: &mut Ctx, err: Error) {
    let status = err.status_code();
    let message = match &err {
        Error::Status { .. } | Error::Decode { .. } => err.to_string(),
        _ => {
            error!(method = %ctx.method(), path = ctx.path(), "handler error: {err}");
            status.canonical_reason().unwrap_or("Internal Server Error").to_owned()
        }
    };

    ctx.status(status);
    ctx.send(HeaderValue::from_static("text/plain; charset=utf-8"), message);
}
