//! Failure boundary.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use http::StatusCode;
use tracing::{error, warn};

use crate::chain::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::recorder::ResponseRecorder;
use crate::request::Request;

const NOT_FOUND_BODY: &[u8] = b"404!";

/// Catches panics from every unit after it, and from the terminal handler.
///
/// A caught panic is logged with its message and a backtrace, and the
/// response becomes a bare 500: status, headers and body written by the
/// failed units are discarded first. Units *before* `Recover` never see the panic
/// and run their "after" half as usual.
///
/// When the chain finishes normally with 404 and an empty body, `Recover`
/// writes a short `404!` body. Turn that off with
/// [`Recover::without_not_found_body`].
#[derive(Clone, Copy, Debug)]
pub struct Recover {
    not_found_body: Option<&'static [u8]>,
}

impl Recover {
    pub fn new() -> Self {
        Self { not_found_body: Some(NOT_FOUND_BODY) }
    }

    pub fn without_not_found_body(mut self) -> Self {
        self.not_found_body = None;
        self
    }
}

impl Default for Recover {
    fn default() -> Self { Self::new() }
}

impl Middleware for Recover {
    fn handle<'a>(
        &'a self,
        res: &'a mut ResponseRecorder<'_>,
        req: &'a Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(res, req)).catch_unwind().await;

            match outcome {
                Ok(()) => {
                    if res.status() == StatusCode::NOT_FOUND && res.content_length() == 0 {
                        if let Some(body) = self.not_found_body {
                            if let Err(e) = res.write_all(body) {
                                warn!(error = %e, "could not write 404 body");
                            }
                        }
                    }
                }
                Err(payload) => {
                    error!(
                        method = %req.method(),
                        url = %req.uri(),
                        panic = panic_message(&*payload),
                        backtrace = %Backtrace::force_capture(),
                        "recovered from panic",
                    );
                    // Drop whatever the failed units wrote so the 500 replaces it.
                    if !res.reset() {
                        warn!(url = %req.uri(), "response already sent, cannot replace it with a 500");
                    }
                    res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        })
    }
}

/// Extracts the message of a `panic!`; other payload types get a placeholder.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
