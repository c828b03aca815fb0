//! The Handler Contract and its type erasure.
//!
//! # How handlers are stored
//!
//! Routes registered on different groups hold closures of *different* types,
//! yet every middleware must be able to accept "the rest of the chain" as a
//! single value. Handlers are therefore erased to one shape:
//!
//! ```text
//! handler(|ctx| Box::pin(async move { … }))       ← user writes this
//!        ↓
//! Arc<dyn Fn(&mut dyn Context) -> BoxFuture>      ← Handler
//!        ↓  cloned into each middleware that wraps it
//! h(ctx).await  at request time                   ← one vtable dispatch
//! ```
//!
//! The future borrows the context for exactly as long as the handler runs,
//! so a handler can call `ctx.next().await` and keep using `ctx` afterwards.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;

/// A heap-allocated, type-erased future borrowing from the request for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Route logic and middleware stages: `(Context) -> Result`.
///
/// Cloning is one atomic increment; the closure itself is shared.
pub type Handler =
    Arc<dyn for<'a> Fn(&'a mut dyn Context) -> BoxFuture<'a, Result<(), Error>> + Send + Sync>;

/// Builds a [`Handler`] from a closure.
///
/// Passing the closure straight to this function lets the compiler infer the
/// higher-ranked signature, so no type annotations are needed:
///
/// ```rust
/// use switchboard::{Context, handler};
///
/// let hello = handler(|ctx| Box::pin(async move {
///     ctx.string(200, "hello")
/// }));
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut dyn Context) -> BoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
{
    Arc::new(f)
}
