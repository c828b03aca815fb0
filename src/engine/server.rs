//! The hyper-backed [`Lifecycle`] implementation.
//!
//! # Shutdown
//!
//! [`shutdown`](Lifecycle::shutdown) moves the server to `Stopping` and
//! wakes the accept loop, which:
//! 1. Stops calling `listener.accept()` and closes the listener, so no new
//!    connections are made.
//! 2. Asks every open connection to finish its in-flight request and close.
//! 3. Waits up to the shutdown timeout for that, then cancels the request
//!    signals of whatever is left and aborts those connection tasks.
//! 4. Moves to `Stopped`, which is what `shutdown` waits for.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http::header::{CONNECTION, HeaderValue};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{HttpConfig, ServerConfig};
use crate::context::RequestSignal;
use crate::engine::{Engine, Register};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::lifecycle::{HttpServer, Lifecycle, State};

/// The HTTP server.
///
/// Register routes through [`route_register`](HttpServer::route_register)
/// while the server is still owned, then put it in an [`Arc`] and start it.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use switchboard::{Context, HttpServer, RouteGroup, Server, ServerConfig, handler};
///
/// # async fn run() -> Result<(), switchboard::Error> {
/// let mut server = Server::new(&ServerConfig::new("0.0.0.0:3000"));
/// server
///     .route_register()
///     .get("/ping", handler(|ctx| Box::pin(async move { ctx.string(200, "pong") })));
///
/// switchboard::run_until_signal(Arc::new(server)).await
/// # }
/// ```
pub struct Server {
    engine: Engine,
    config: ServerConfig,
    state: watch::Sender<State>,
    local_addr: OnceLock<SocketAddr>,
    // Stops the accept loop and starts the drain.
    shutdown: CancellationToken,
    // Parent of every request signal; cancelled when the drain gives up.
    abort: CancellationToken,
}

impl Server {
    /// Creates a server from a snapshot of `config`. Later changes to the
    /// config value have no effect.
    pub fn new(config: &(impl HttpConfig + ?Sized)) -> Self {
        Self {
            engine: Engine::new(),
            config: ServerConfig::snapshot(config),
            state: watch::Sender::new(State::Created),
            local_addr: OnceLock::new(),
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The routing table, e.g. for dispatching requests in-process.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The address actually bound, once `start` got that far. Useful when
    /// the configured port is `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Follows state changes.
    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    async fn serve(self: Arc<Self>) -> Result<(), Error> {
        if !self.transition(State::Created, State::Starting) {
            return match self.state() {
                State::Stopping | State::Stopped => Ok(()),
                _ => Err(Error::AlreadyStarted),
            };
        }

        let listener = match TcpListener::bind(self.config.addr.as_str()).await {
            Ok(listener) => listener,
            Err(source) => {
                self.state.send_replace(State::Stopped);
                return Err(Error::Bind { addr: self.config.addr.clone(), source });
            }
        };

        // Shutdown may have been requested while binding.
        if !self.transition(State::Starting, State::Running) {
            drop(listener);
            self.state.send_replace(State::Stopped);
            info!("shutdown requested during bind, not serving");
            return Ok(());
        }

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.state.send_replace(State::Stopped);
                return Err(e.into());
            }
        };
        let _ = self.local_addr.set(addr);
        info!(addr = %addr, "switchboard listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };
                    connections.spawn(Arc::clone(&self).connection(stream, peer));
                }

                // Reap finished connections so the set does not grow without bound.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
        drop(listener);

        info!(in_flight = connections.len(), "draining connections");
        let drain = async { while connections.join_next().await.is_some() {} };
        let drained = match limit(self.config.shutdown_timeout) {
            Some(timeout) => tokio::time::timeout(timeout, drain).await.is_ok(),
            None => {
                drain.await;
                true
            }
        };
        if !drained {
            warn!(remaining = connections.len(), "shutdown timeout reached, aborting requests");
            self.abort.cancel();
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }

        self.state.send_replace(State::Stopped);
        info!("switchboard stopped");
        Ok(())
    }

    async fn connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let server = Arc::clone(&self);
        let svc = service_fn(move |req| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.respond(req).await) }
        });

        let mut builder = ConnBuilder::new(TokioExecutor::new());
        if let Some(timeout) = limit(self.config.read_timeout) {
            builder.http1().timer(TokioTimer::new()).header_read_timeout(timeout);
        }

        let conn = builder.serve_connection(TokioIo::new(stream), svc);
        tokio::pin!(conn);

        let result = tokio::select! {
            res = conn.as_mut() => res,
            () = self.shutdown.cancelled() => {
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            }
        };
        if let Err(e) = result {
            debug!(peer = %peer, "connection error: {e}");
        }
    }

    /// Buffers one request and runs it through the engine.
    ///
    /// The read timeout bounds the body as well as the headers: a client
    /// that stalls mid-body gets a `408` and the connection is closed.
    async fn respond(&self, req: hyper::Request<Incoming>) -> http::Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let collect = body.collect();
        let collected = match limit(self.config.read_timeout) {
            Some(timeout) => match tokio::time::timeout(timeout, collect).await {
                Ok(collected) => collected,
                Err(_) => {
                    warn!(path = parts.uri.path(), "request body not received within read timeout");
                    return closing(StatusCode::REQUEST_TIMEOUT);
                }
            },
            None => collect.await,
        };
        let body = match collected {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(path = parts.uri.path(), "failed to read request body: {e}");
                return closing(StatusCode::BAD_REQUEST);
            }
        };

        // Cancelled when the request ends for any reason, including the
        // client going away and hyper dropping this future.
        let token = self.abort.child_token();
        let _cancel_on_drop = token.clone().drop_guard();
        let deadline = limit(self.config.write_timeout).map(|timeout| Instant::now() + timeout);

        let req = http::Request::from_parts(parts, body);
        self.engine.dispatch(req, RequestSignal::new(token, deadline)).await
    }

    /// Moves `from -> to` if the state is still `from`.
    fn transition(&self, from: State, to: State) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

impl Lifecycle for Server {
    fn start(self: Arc<Self>) -> BoxFuture<'static, Result<(), Error>> {
        Box::pin(self.serve())
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            let was = *self.state.borrow();
            self.state.send_if_modified(|state| match *state {
                State::Created => {
                    *state = State::Stopped;
                    true
                }
                State::Starting | State::Running => {
                    *state = State::Stopping;
                    true
                }
                State::Stopping | State::Stopped => false,
            });
            self.shutdown.cancel();
            debug!(from = %was, "shutdown requested");

            let mut states = self.state.subscribe();
            let stopped = async {
                // The sender lives in `self`, so this cannot see a closed channel.
                let _ = states.wait_for(|state| *state == State::Stopped).await;
            };
            match limit(self.config.shutdown_timeout) {
                Some(timeout) => tokio::time::timeout(timeout + Duration::from_secs(1), stopped)
                    .await
                    .map_err(|_| Error::ShutdownTimeout),
                None => {
                    stopped.await;
                    Ok(())
                }
            }
        })
    }

    fn state(&self) -> State {
        *self.state.borrow()
    }
}

impl HttpServer for Server {
    type Register<'a> = Register<'a>;

    fn route_register(&mut self) -> Register<'_> {
        Register::new(&mut self.engine)
    }
}

/// A plain-text answer for a request whose body was not read to the end,
/// so the connection cannot be reused.
fn closing(status: StatusCode) -> http::Response<Full<Bytes>> {
    let reason = status.canonical_reason().unwrap_or("Bad Request");
    let mut response = http::Response::new(Full::new(Bytes::from_static(reason.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Zero means no limit.
fn limit(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}
