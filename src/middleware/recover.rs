use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::error;

use crate::error::Error;
use crate::handler::{Handler, handler};
use crate::middleware::Middleware;

/// Converts a panic anywhere downstream into a `500` error.
///
/// Without it a panicking handler tears down the connection task and the
/// client sees a reset instead of a response.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recover;

impl Middleware for Recover {
    fn wrap(&self, next: Handler) -> Handler {
        handler(move |ctx| {
            let next = Arc::clone(&next);
            Box::pin(async move {
                let method = ctx.method().to_owned();
                let path = ctx.path().to_owned();

                match AssertUnwindSafe(next(ctx)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        error!(%method, %path, panic = panic_message(&*panic), "handler panicked");
                        Err(Error::status(500, "Internal Server Error"))
                    }
                }
            })
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
