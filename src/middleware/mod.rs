//! Middleware layer.
//!
//! Middleware intercepts a request before and after the rest of its chain and
//! is the right place for cross-cutting concerns: tracing, authentication,
//! request-id injection, panic recovery.
//!
//! A group accepts three shapes, installed in the order given:
//!
//! | [`Layer`] variant | runs as | continues by |
//! |---|---|---|
//! | `Native(n)` | the engine's own handler type, no facade | the engine's native `next` |
//! | `Wrap(m)` | `m.wrap(next)`, built once at install time | calling `next(ctx)` |
//! | `Handler(h)` | a plain handler | calling `ctx.next()` |
//!
//! For `Wrap`, the `next` handed to [`Middleware::wrap`] *is* the engine's
//! advance primitive: it returns exactly what the rest of the chain returned,
//! and whatever the wrapped handler returns is what the engine sees.
//!
//! Built-in middleware:
//! - [`Trace`]: one log line per request with method, path, status, latency
//! - [`Recover`]: turns a downstream panic into a `500`

use std::sync::Arc;

use crate::handler::Handler;

mod recover;
mod trace;

pub use recover::Recover;
pub use trace::Trace;

/// A transform around the rest of the chain: `(next) -> Handler`.
///
/// The returned handler should call `next` at most once. Not calling it at
/// all short-circuits the request: later middleware and the route handler
/// never run.
///
/// Closures of shape `Fn(Handler) -> Handler` implement this trait too.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: Handler) -> Handler;
}

impl<F> Middleware for F
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    fn wrap(&self, next: Handler) -> Handler {
        self(next)
    }
}

/// One middleware entry for `RouteGroup::use_middleware`.
///
/// `N` is the backend's native handler type; the set of shapes is closed and
/// resolved when the layer is installed.
pub enum Layer<N> {
    Native(N),
    Wrap(Arc<dyn Middleware>),
    Handler(Handler),
}

impl<N> Layer<N> {
    pub fn native(native: N) -> Self {
        Self::Native(native)
    }

    pub fn wrap(middleware: impl Middleware) -> Self {
        Self::Wrap(Arc::new(middleware))
    }

    pub fn handler(handler: Handler) -> Self {
        Self::Handler(handler)
    }
}
