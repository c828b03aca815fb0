//! Server lifecycle: start, shutdown, and the supervisor-facing helpers.
//!
//! # Why `start` runs on its own task
//!
//! `start` binds and then serves until shutdown, so awaiting it inline would
//! stall whoever called it. [`launch`] spawns it instead. The price is that a
//! bind failure cannot be returned to the caller of `launch`: it is logged
//! with `tracing::error!` and the state moves straight to
//! [`State::Stopped`]. Watch logs or poll [`Lifecycle::state`] to notice it.
//!
//! # Kubernetes
//!
//! [`run_until_signal`] reacts to **SIGTERM** (sent when a pod is
//! terminated) and **SIGINT** (Ctrl-C). Set `terminationGracePeriodSeconds`
//! above the configured shutdown timeout so the drain can finish.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::route::RouteRegister;

/// Where a server is in its life.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum State {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created  => "created",
            Self::Starting => "starting",
            Self::Running  => "running",
            Self::Stopping => "stopping",
            Self::Stopped  => "stopped",
        })
    }
}

/// The two calls any process supervisor needs.
pub trait Lifecycle: Send + Sync + 'static {
    /// Binds and serves until [`shutdown`](Lifecycle::shutdown).
    ///
    /// Returns `Err(Error::Bind)` if the address cannot be bound and
    /// `Err(Error::AlreadyStarted)` on a second call. Called after shutdown
    /// it returns `Ok(())` without binding.
    fn start(self: Arc<Self>) -> BoxFuture<'static, Result<(), Error>>;

    /// Stops accepting connections and waits for in-flight requests to
    /// drain or for the shutdown deadline. Safe to call more than once.
    fn shutdown(&self) -> BoxFuture<'_, Result<(), Error>>;

    fn state(&self) -> State;
}

/// A server whose routes are registered through a [`RouteRegister`].
pub trait HttpServer: Lifecycle {
    type Register<'a>: RouteRegister
    where
        Self: 'a;

    /// The root of the route tree. Only reachable before the server is
    /// shared, so the tree is fixed once serving starts.
    fn route_register(&mut self) -> Self::Register<'_>;
}

/// Runs `start` on its own task, logging the error it may end with.
pub fn launch<L: Lifecycle + ?Sized>(server: &Arc<L>) -> JoinHandle<()> {
    let start = Arc::clone(server).start();
    tokio::spawn(async move {
        if let Err(e) = start.await {
            error!("server failed: {e}");
        }
    })
}

/// Launches `server`, waits for SIGTERM or Ctrl-C, then shuts it down.
pub async fn run_until_signal<L: Lifecycle + ?Sized>(server: Arc<L>) -> Result<(), Error> {
    let mut serving = launch(&server);

    let finished = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            None
        }
        // Start returned on its own, most likely a bind failure.
        joined = &mut serving => Some(joined),
    };

    let result = server.shutdown().await;
    let joined = match finished {
        Some(joined) => joined,
        None => serving.await,
    };
    if let Err(e) = joined {
        warn!("server task ended abnormally: {e}");
    }
    result
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT**; on Windows only
/// Ctrl-C is available. A handler that cannot be installed is logged and its
/// arm never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so the SIGTERM arm is disabled off Unix.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
