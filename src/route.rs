//! Route groups: prefix-scoped, middleware-scoped nodes of the route tree.
//!
//! ```text
//! root ("")            use_middleware([Trace])
//! └── group("/api")    use_middleware([Auth])
//!     └── group("/v1")
//!         └── get("/users/{id}")   runs Trace → Auth → handler
//! ```
//!
//! A child starts from a snapshot of its parent's middleware, so ancestors
//! always run before descendants. Middleware only applies to routes
//! registered after it, and only runs for requests that match one of them.
//!
//! The effective path is the prefix and the route path joined with a single
//! `/`; beyond that, trailing slashes are significant when matching.

use crate::handler::Handler;
use crate::method::Method;
use crate::middleware::{Layer, Middleware};

/// A node of the route tree.
///
/// Paths are relative to the group's prefix. Path variables are written
/// `{id}` or `:id`; a trailing catch-all is `{*rest}` or `*rest`.
pub trait RouteGroup {
    /// The backend's native middleware type.
    type Native;

    /// The type returned by [`group`](RouteGroup::group).
    type Child<'a>: RouteGroup<Native = Self::Native>
    where
        Self: 'a;

    /// Registers `handler` for each of `methods` at `path`.
    ///
    /// Only the methods of [`Method`] can be registered; a request with any
    /// other method token never matches a route.
    fn add(&mut self, methods: &[Method], path: &str, handler: Handler);

    /// Creates a sub-group whose prefix is this prefix followed by `path`.
    fn group(&mut self, path: &str) -> Self::Child<'_>;

    /// Installs middleware for every route registered from now on, here and
    /// in groups created afterwards. Layers run in the order given.
    fn use_middleware(&mut self, layers: Vec<Layer<Self::Native>>);

    /// `GET`; `HEAD` requests to the same path are answered by it too.
    fn get(&mut self, path: &str, handler: Handler) {
        self.add(&[Method::Get, Method::Head], path, handler);
    }

    fn post(&mut self, path: &str, handler: Handler) {
        self.add(&[Method::Post], path, handler);
    }

    fn put(&mut self, path: &str, handler: Handler) {
        self.add(&[Method::Put], path, handler);
    }

    fn delete(&mut self, path: &str, handler: Handler) {
        self.add(&[Method::Delete], path, handler);
    }

    fn patch(&mut self, path: &str, handler: Handler) {
        self.add(&[Method::Patch], path, handler);
    }

    /// Registers `handler` for every method in [`Method::ALL`].
    fn any(&mut self, path: &str, handler: Handler) {
        self.add(&Method::ALL, path, handler);
    }

    /// Shorthand for installing one [`Middleware`].
    fn wrap(&mut self, middleware: impl Middleware) {
        self.use_middleware(vec![Layer::wrap(middleware)]);
    }

    /// Shorthand for installing one native middleware.
    fn use_native(&mut self, native: Self::Native) {
        self.use_middleware(vec![Layer::Native(native)]);
    }
}

/// The root of the route tree.
pub trait RouteRegister: RouteGroup {
    /// The concrete engine type.
    type Engine;

    /// Escape hatch to the engine for features the facade does not model.
    /// Code using it is tied to that backend.
    fn native_engine(&mut self) -> &mut Self::Engine;
}

/// Concatenates a group prefix and a relative path.
///
/// `("/a", "/b")` and `("/a/", "b")` both give `"/a/b"`; a group route at
/// `"/"` or `""` is the prefix itself.
pub(crate) fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_owned(),
        (false, true) => prefix.to_owned(),
        (_, false) => format!("{prefix}/{path}"),
    }
}

/// Rewrites `:name` and `*name` segments into `{name}` and `{*name}`.
pub(crate) fn normalize(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':').filter(|n| !n.is_empty()) {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*').filter(|n| !n.is_empty()) {
                format!("{{*{name}}}")
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
