use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::handler::{Handler, handler};
use crate::middleware::Middleware;

/// Logs every request once its chain has finished.
///
/// Successful requests log at `info`, failed ones at `warn` with the error.
/// The status is the one pending when the chain returned; for a failure the
/// error handler has not run yet, so the error's own status is logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn wrap(&self, next: Handler) -> Handler {
        handler(move |ctx| {
            let next = Arc::clone(&next);
            Box::pin(async move {
                let started = Instant::now();
                let method = ctx.method().to_owned();
                let path = ctx.path().to_owned();

                let result = next(ctx).await;
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

                match &result {
                    Ok(()) => info!(
                        %method, %path,
                        status = ctx.response_status(),
                        latency_ms,
                        "request"
                    ),
                    Err(err) => warn!(
                        %method, %path,
                        status = err.status_code().as_u16(),
                        latency_ms,
                        error = %err,
                        "request failed"
                    ),
                }
                result
            })
        })
    }
}
