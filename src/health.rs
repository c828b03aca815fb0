//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them on any route group:
//!
//! ```rust
//! use switchboard::{Engine, Register, RouteGroup, health};
//!
//! let mut engine = Engine::new();
//! let mut routes = Register::new(&mut engine);
//! routes.get("/healthz", health::liveness());
//! routes.get("/readyz", health::readiness());
//! ```
//!
//! Replace `readiness` with your own handler if the pod must wait for its
//! dependencies:
//!
//! ```rust
//! use switchboard::{Context, Error, Handler, handler};
//!
//! fn readiness() -> Handler {
//!     handler(|ctx| Box::pin(async move {
//!         if dependencies_are_healthy().await {
//!             ctx.string(200, "ready")
//!         } else {
//!             Err(Error::status(503, "not ready"))
//!         }
//!     }))
//! }
//!
//! async fn dependencies_are_healthy() -> bool { true }
//! ```

use crate::context::Context;
use crate::handler::{Handler, handler};

/// Liveness probe: always `200 OK` with body `"ok"`.
///
/// If the process can answer HTTP at all it is alive, so this handler has no
/// dependencies.
pub fn liveness() -> Handler {
    handler(|ctx| Box::pin(async move { ctx.string(200, "ok") }))
}

/// Readiness probe: `200 OK` with body `"ready"`.
pub fn readiness() -> Handler {
    handler(|ctx| Box::pin(async move { ctx.string(200, "ready") }))
}
