//! Built-in middleware units.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: access logging, failure boundaries, cookies and
//! authentication.
//!
//! - [`log_request`]: one access-log event per request
//! - [`Recover`]: turns panics in later units into a 500
//! - [`IssueCookie`]: hands out a session cookie to clients without one
//! - [`AuthGate`]: admits only requests carrying a live session
//!
//! Order matters. A typical chain is:
//!
//! ```rust
//! use std::sync::Arc;
//! use websrv::middleware::{AuthGate, IssueCookie, Recover, log_request};
//! use websrv::{MiddlewareChain, SessionStore};
//!
//! let store = Arc::new(SessionStore::new());
//! let chain = MiddlewareChain::new()
//!     .with(log_request)      // outermost: sees the final status, even a 500
//!     .with(Recover::new())   // boundary for everything below
//!     .with(IssueCookie::new())
//!     .with(AuthGate::new(store));
//! assert_eq!(chain.len(), 4);
//! ```

mod auth;
mod cookie;
mod logger;
mod recover;

pub use auth::{AuthGate, UnrecognizedPolicy};
pub use cookie::{COOKIE_NAME, COOKIE_TTL, IssueCookie, set_cookie_header};
pub use logger::log_request;
pub use recover::Recover;

pub(crate) use recover::panic_message;
