//! The facade over the native [`Ctx`], and the adapters that turn facade
//! handlers and middleware into native chain stages.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use tracing::warn;

use crate::context::{Context, RequestSignal};
use crate::engine::native::{Ctx, NativeHandler, native};
use crate::error::Error;
use crate::handler::{BoxFuture, Handler, handler};
use crate::middleware::Middleware;

/// [`Context`] implementation borrowing the engine's [`Ctx`].
///
/// Holds nothing but the borrow, so the facade and the native object can
/// never disagree.
pub struct Facade<'c> {
    native: &'c mut Ctx,
}

impl<'c> Facade<'c> {
    pub fn new(native: &'c mut Ctx) -> Self {
        Self { native }
    }

    /// The native object, for backend-specific needs.
    pub fn native(&mut self) -> &mut Ctx {
        self.native
    }
}

impl Context for Facade<'_> {
    fn param(&self, key: &str) -> &str {
        self.native.param(key).unwrap_or("")
    }

    fn params(&self) -> &[(String, String)] {
        self.native.params()
    }

    fn query(&self, key: &str) -> String {
        self.native.query(key).unwrap_or_default()
    }

    fn raw_query(&self) -> &str {
        self.native.query_string()
    }

    fn body(&self) -> &[u8] {
        self.native.body()
    }

    fn status(&mut self, code: u16) -> &mut dyn Context {
        let status = StatusCode::from_u16(code).unwrap_or_else(|_| {
            warn!(code, "invalid status code, answering 500");
            StatusCode::INTERNAL_SERVER_ERROR
        });
        self.native.status(status);
        self
    }

    fn response_status(&self) -> u16 {
        self.native.response_status().as_u16()
    }

    fn send(&mut self, code: u16, content_type: &str, body: Vec<u8>) -> Result<(), Error> {
        let content_type = HeaderValue::from_str(content_type)
            .map_err(|e| Error::Serialize(format!("content type `{content_type}`: {e}")))?;
        self.status(code);
        self.native.send(content_type, body);
        Ok(())
    }

    fn get_header(&self, key: &str) -> &str {
        self.native
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    fn set_header(&mut self, key: &str, value: &str) {
        match (HeaderName::try_from(key), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.native.response_headers_mut().insert(name, value);
            }
            _ => warn!(key, "ignoring invalid response header"),
        }
    }

    fn req_headers(&self) -> HashMap<String, Vec<String>> {
        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in self.native.headers() {
            headers
                .entry(name.as_str().to_owned())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        headers
    }

    fn next(&mut self) -> BoxFuture<'_, Result<(), Error>> {
        self.native.next()
    }

    fn path(&self) -> &str {
        self.native.path()
    }

    fn method(&self) -> &str {
        self.native.method().as_str()
    }

    fn signal(&self) -> &RequestSignal {
        self.native.signal()
    }
}

/// Installs a facade handler as a native stage. Its result goes to the
/// engine unchanged.
pub(crate) fn wrap_handler(handler: Handler) -> NativeHandler {
    native(move |ctx| {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let mut facade = Facade::new(ctx);
            handler(&mut facade).await
        })
    })
}

/// Installs an abstract middleware as a native stage.
///
/// The `next` it wraps is the engine's own advance: calling it enters the
/// following stage and yields that stage's result. The wrapped handler is
/// built once, here, not per request.
pub(crate) fn wrap_middleware(middleware: &dyn Middleware) -> NativeHandler {
    let advance = handler(|ctx| ctx.next());
    wrap_handler(middleware.wrap(advance))
}
