//! The per-request Context Facade.
//!
//! [`Context`] is the object-safe core every backend implements: it reads the
//! request and writes the pending response, always straight through to the
//! engine's native request object. [`ContextExt`] layers the generic serde
//! operations (binding, JSON) on top and is implemented for every `Context`,
//! `dyn Context` included.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Part};
use crate::handler::BoxFuture;

/// Request-scoped view of the request and its pending response.
///
/// A context lives for one request and is never shared between tasks.
/// Lookups that find nothing return an empty string rather than an error.
pub trait Context: Send {
    /// Path variable, e.g. `id` for the route `/users/{id}`.
    fn param(&self, key: &str) -> &str;

    /// Every path variable of the matched route, in pattern order.
    fn params(&self) -> &[(String, String)];

    /// First percent-decoded value of a query-string key.
    fn query(&self, key: &str) -> String;

    /// The raw query string, without the leading `?`.
    fn raw_query(&self) -> &str;

    /// The complete request body. Every call returns the same bytes.
    fn body(&self) -> &[u8];

    /// Sets the pending response status. Nothing is written until a body
    /// method runs.
    fn status(&mut self, code: u16) -> &mut dyn Context;

    /// The status the response will carry if nothing changes it.
    fn response_status(&self) -> u16;

    /// Sets the status and writes `body` with the given content type.
    fn send(&mut self, code: u16, content_type: &str, body: Vec<u8>) -> Result<(), Error>;

    /// Sets the status and writes a `text/plain` body.
    fn string(&mut self, code: u16, text: &str) -> Result<(), Error> {
        self.send(code, "text/plain; charset=utf-8", text.as_bytes().to_vec())
    }

    /// Request header value. Absent and non-UTF-8 values read as `""`.
    fn get_header(&self, key: &str) -> &str;

    /// Sets a response header, replacing any previous value.
    fn set_header(&mut self, key: &str, value: &str);

    /// Alias of [`get_header`](Context::get_header).
    fn get(&self, key: &str) -> &str {
        self.get_header(key)
    }

    /// Alias of [`set_header`](Context::set_header).
    fn set(&mut self, key: &str, value: &str) {
        self.set_header(key, value);
    }

    /// All request headers; repeated headers keep every value.
    fn req_headers(&self) -> HashMap<String, Vec<String>>;

    /// Runs the next stage of the chain and returns its result.
    ///
    /// With no stage left this is a no-op returning `Ok(())`.
    fn next(&mut self) -> BoxFuture<'_, Result<(), Error>>;

    fn path(&self) -> &str;

    fn method(&self) -> &str;

    /// Cancellation and deadline of this request, for outbound calls.
    fn signal(&self) -> &RequestSignal;
}

/// Serde-backed operations available on every [`Context`].
pub trait ContextExt: Context {
    /// Decodes the body as JSON.
    fn bind_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(self.body()).map_err(|e| Error::decode(Part::Body, e))
    }

    /// Decodes the query string.
    fn bind_query<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_urlencoded::from_str(self.raw_query()).map_err(|e| Error::decode(Part::Query, e))
    }

    /// Decodes the path variables. Values arrive as strings and coerce into
    /// numbers and booleans the way form fields do.
    fn bind_uri<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let encoded =
            serde_urlencoded::to_string(self.params()).map_err(|e| Error::decode(Part::Path, e))?;
        serde_urlencoded::from_str(&encoded).map_err(|e| Error::decode(Part::Path, e))
    }

    /// Decodes the body according to its `Content-Type`: JSON or
    /// `application/x-www-form-urlencoded`.
    fn bind_body<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let content_type = self.get_header("content-type");
        let mime = content_type.split(';').next().unwrap_or("").trim();

        if mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json") {
            self.bind_json()
        } else if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            serde_urlencoded::from_bytes(self.body()).map_err(|e| Error::decode(Part::Body, e))
        } else {
            Err(Error::decode(Part::Body, format!("unsupported content type `{content_type}`")))
        }
    }

    /// Sets the status, then writes `value` as a JSON body.
    fn json<T: Serialize + ?Sized>(&mut self, code: u16, value: &T) -> Result<(), Error> {
        self.status(code);
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialize(e.to_string()))?;
        self.send(code, "application/json", body)
    }

    /// Writes `value` as JSON with the pending status: `ctx.status(201).write_json(&v)`.
    fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        let code = self.response_status();
        self.json(code, value)
    }
}

impl<C: Context + ?Sized> ContextExt for C {}

/// Cancellation signal and optional deadline of one request.
///
/// Cancelled when the client goes away, when the write deadline passes, or
/// when a shutdown gives up waiting for the request. Clones share the signal.
#[derive(Clone, Debug)]
pub struct RequestSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestSignal {
    pub fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    /// A signal nobody else holds, without a deadline.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the request is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {}
            },
            None => self.token.cancelled().await,
        }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}
