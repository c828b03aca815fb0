//! The engine's native per-request object and handler signature.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::{StatusCode, Uri};
use http_body_util::Full;

use crate::context::RequestSignal;
use crate::error::Error;
use crate::handler::BoxFuture;

/// One stage of a matched route's chain, in the engine's own signature.
pub type NativeHandler =
    Arc<dyn for<'a> Fn(&'a mut Ctx) -> BoxFuture<'a, Result<(), Error>> + Send + Sync>;

/// Builds a [`NativeHandler`] from a closure, inferring its signature.
pub fn native<F>(f: F) -> NativeHandler
where
    F: for<'a> Fn(&'a mut Ctx) -> BoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-request state owned by the engine.
///
/// Holds the buffered request, the pending response, and the position in the
/// matched chain. The facade reads and writes through this, never around it.
pub struct Ctx {
    method: http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: Vec<(String, String)>,

    status: StatusCode,
    response_headers: HeaderMap,
    response_body: Bytes,

    chain: Arc<[NativeHandler]>,
    // Number of stages entered so far.
    entered: usize,
    signal: RequestSignal,
}

impl Ctx {
    pub(crate) fn new(
        parts: http::request::Parts,
        body: Bytes,
        params: Vec<(String, String)>,
        chain: Arc<[NativeHandler]>,
        signal: RequestSignal,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Bytes::new(),
            chain,
            entered: 0,
            signal,
        }
    }

    pub fn method(&self) -> &http::Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query_string(&self) -> &str {
        self.uri.query().unwrap_or("")
    }

    /// First decoded value of `key` in the query string.
    pub fn query(&self, key: &str) -> Option<String> {
        serde_urlencoded::from_str::<Vec<(String, String)>>(self.query_string())
            .ok()?
            .into_iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn response_status(&self) -> StatusCode {
        self.status
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    pub fn response_body(&self) -> &Bytes {
        &self.response_body
    }

    /// Replaces the response body and its `Content-Type`.
    pub fn send(&mut self, content_type: HeaderValue, body: impl Into<Bytes>) {
        self.response_headers.insert(CONTENT_TYPE, content_type);
        self.response_body = body.into();
    }

    pub fn signal(&self) -> &RequestSignal {
        &self.signal
    }

    /// Enters the next stage of the chain and returns what it returns.
    ///
    /// Past the last stage this resolves to `Ok(())` immediately.
    pub fn next(&mut self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            let Some(stage) = self.chain.get(self.entered).cloned() else {
                return Ok(());
            };
            self.entered += 1;
            stage(self).await
        })
    }

    pub(crate) fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.response_body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.response_headers;
        response
    }
}
