//! # websrv
//!
//! A small HTTP server built around an ordered middleware chain.
//!
//! ## The model
//!
//! A request passes through a list of middleware units, outermost first,
//! and finally reaches a terminal [`Handler`] (usually a [`Router`]). Each
//! unit gets the request, a [`ResponseRecorder`] and a [`Next`]
//! continuation. Running `next` hands control to the rest of the chain; not
//! running it short-circuits everything after. Code after `next.run(..).await`
//! runs on the way back out, in reverse order.
//!
//! The recorder sits between the units and the real response and remembers
//! the status code and the number of body bytes written, so outer units
//! (the access log, the panic boundary) can see what inner ones did.
//!
//! Sessions live in an in-memory [`SessionStore`] with a background sweep
//! that drops expired entries.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use websrv::middleware::{IssueCookie, Recover, log_request};
//! use websrv::{BoxFuture, MiddlewareChain, Request, ResponseRecorder, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), websrv::Error> {
//!     let app = Router::new().get("/hello", hello);
//!
//!     let chain = MiddlewareChain::new()
//!         .with(log_request)
//!         .with(Recover::new())
//!         .with(IssueCookie::new())
//!         .handler(app);
//!
//!     Server::bind(([0, 0, 0, 0], 3000).into()).serve(chain).await
//! }
//!
//! fn hello<'a>(req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
//!     Box::pin(async move {
//!         let _ = res.write_all(format!("Hello {} {}", req.method(), req.uri()).as_bytes());
//!     })
//! }
//! ```

mod chain;
mod config;
mod error;
mod handler;
mod recorder;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;
pub mod session;

pub use chain::{Middleware, MiddlewareChain, Next};
pub use config::Config;
pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, Handler};
pub use recorder::ResponseRecorder;
pub use request::Request;
pub use response::{Response, ResponseSink};
pub use router::Router;
pub use server::Server;
pub use session::{SessionRecord, SessionStore};
