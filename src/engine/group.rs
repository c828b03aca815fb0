//! [`RouteGroup`] and [`RouteRegister`] over the native [`Engine`].

use crate::engine::Engine;
use crate::engine::facade::{wrap_handler, wrap_middleware};
use crate::engine::native::NativeHandler;
use crate::handler::Handler;
use crate::method::Method;
use crate::middleware::Layer;
use crate::route::{self, RouteGroup, RouteRegister};

/// A prefix plus the middleware installed on it and its ancestors.
///
/// Middleware is resolved to native stages when installed, so registering a
/// route only clones a list of `Arc`s.
pub struct Group<'e> {
    engine: &'e mut Engine,
    prefix: String,
    middleware: Vec<NativeHandler>,
}

impl<'e> Group<'e> {
    fn root(engine: &'e mut Engine) -> Self {
        Self { engine, prefix: String::new(), middleware: Vec::new() }
    }

    /// The full prefix routes of this group are registered under.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl RouteGroup for Group<'_> {
    type Native = NativeHandler;
    type Child<'a>
        = Group<'a>
    where
        Self: 'a;

    fn add(&mut self, methods: &[Method], path: &str, handler: Handler) {
        let path = route::join(&self.prefix, path);
        let mut chain = Vec::with_capacity(self.middleware.len() + 1);
        chain.extend(self.middleware.iter().cloned());
        chain.push(wrap_handler(handler));
        self.engine.add(methods, &path, chain);
    }

    fn group(&mut self, path: &str) -> Group<'_> {
        Group {
            prefix: route::join(&self.prefix, path),
            middleware: self.middleware.clone(),
            engine: &mut *self.engine,
        }
    }

    fn use_middleware(&mut self, layers: Vec<Layer<NativeHandler>>) {
        self.middleware.extend(layers.into_iter().map(|layer| match layer {
            Layer::Native(native) => native,
            Layer::Wrap(middleware) => wrap_middleware(middleware.as_ref()),
            Layer::Handler(handler) => wrap_handler(handler),
        }));
    }
}

/// The root group, plus access to the [`Engine`] itself.
pub struct Register<'e> {
    root: Group<'e>,
}

impl<'e> Register<'e> {
    pub fn new(engine: &'e mut Engine) -> Self {
        Self { root: Group::root(engine) }
    }
}

impl RouteGroup for Register<'_> {
    type Native = NativeHandler;
    type Child<'a>
        = Group<'a>
    where
        Self: 'a;

    fn add(&mut self, methods: &[Method], path: &str, handler: Handler) {
        self.root.add(methods, path, handler);
    }

    fn group(&mut self, path: &str) -> Group<'_> {
        self.root.group(path)
    }

    fn use_middleware(&mut self, layers: Vec<Layer<NativeHandler>>) {
        self.root.use_middleware(layers);
    }
}

impl RouteRegister for Register<'_> {
    type Engine = Engine;

    fn native_engine(&mut self) -> &mut Engine {
        &mut *self.root.engine
    }
}
