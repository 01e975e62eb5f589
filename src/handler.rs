//! Terminal handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The chain and the router need to hold handlers of *different* types behind
//! one type, so they store `Arc<dyn Handler>`. Plain functions qualify
//! through a blanket impl:
//!
//! ```text
//! fn hello<'a>(req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()>
//!        ↓ router.on(Method::GET, "/hello", hello)
//! Arc::new(hello)                           ← stored as BoxedHandler
//!        ↓
//! handler.call(&req, &mut recorder)         ← one vtable dispatch per request
//! ```
//!
//! Handlers borrow the request and the recorder for as long as their future
//! runs. `Router` and `MiddlewareChain` implement `Handler` too, which is what
//! lets a chain terminate in a router, and a route terminate in a nested chain.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::recorder::ResponseRecorder;
use crate::request::Request;

/// A heap-allocated, type-erased future borrowing from the request flow.
///
/// `Send` lets tokio move a request's processing across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The final step of a request: runs only if every middleware unit called
/// its continuation.
///
/// Write the response through the recorder:
///
/// ```rust
/// use websrv::{BoxFuture, Request, ResponseRecorder};
///
/// fn hello<'a>(req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
///     Box::pin(async move {
///         let body = format!("hello from {}", req.path());
///         let _ = res.write_all(body.as_bytes());
///     })
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()>;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

impl<F> Handler for F
where
    F: for<'a, 'r> Fn(&'a Request, &'a mut ResponseRecorder<'r>) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
        self(req, res)
    }
}
