//! Middleware composition.
//!
//! A [`MiddlewareChain`] is an ordered list of [`Middleware`] units in front
//! of an optional terminal [`Handler`]. Each unit receives the recorder, the
//! request, and a [`Next`]: the continuation that runs everything after it.
//!
//! ```text
//! execute ─► A before ─► B before ─► C before ─► handler
//!                                                  │
//! execute ◄─ A after  ◄─ B after  ◄─ C after  ◄────┘
//! ```
//!
//! A unit that does not run `next` short-circuits: nothing after it runs, and
//! the units before it still get their "after" half.
//!
//! `Next` is consumed by [`Next::run`], so a unit cannot run the remainder of
//! the chain twice. The position it carries is fixed at construction; there is
//! no shared cursor to get out of step.

use std::fmt;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::recorder::ResponseRecorder;
use crate::request::Request;
use crate::response::ResponseSink;

/// A step in request processing.
///
/// Implemented for any function with the shape
///
/// ```text
/// fn unit<'a>(res: &'a mut ResponseRecorder<'_>, req: &'a Request, next: Next<'a>) -> BoxFuture<'a, ()>
/// ```
///
/// and for the built-in units in [`crate::middleware`].
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        res: &'a mut ResponseRecorder<'_>,
        req: &'a Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()>;
}

impl<F> Middleware for F
where
    F: for<'a, 'r> Fn(&'a mut ResponseRecorder<'r>, &'a Request, Next<'a>) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    fn handle<'a>(
        &'a self,
        res: &'a mut ResponseRecorder<'_>,
        req: &'a Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        self(res, req, next)
    }
}

// ── Continuation ─────────────────────────────────────────────────────────────

/// The rest of the chain after the current unit.
pub struct Next<'a> {
    chain: &'a MiddlewareChain,
    position: usize,
}

impl<'a> Next<'a> {
    /// Runs the unit at this position with a continuation for the one after
    /// it, or the terminal handler once the units are exhausted.
    ///
    /// `res` and `req` are only borrowed for the returned future, so the
    /// caller gets them back for its "after" half.
    pub fn run<'b>(self, res: &'b mut ResponseRecorder<'_>, req: &'b Request) -> BoxFuture<'b, ()>
    where
        'a: 'b,
    {
        let Self { chain, position } = self;
        match chain.units.get(position) {
            Some(unit) => unit.handle(res, req, Next { chain, position: position + 1 }),
            None => match &chain.handler {
                Some(handler) => handler.call(req, res),
                None => Box::pin(async {}),
            },
        }
    }

    /// Index of the unit this continuation will run. Equal to the number of
    /// units when only the terminal handler is left.
    pub fn position(&self) -> usize {
        self.position
    }
}

// ── MiddlewareChain ──────────────────────────────────────────────────────────

/// An ordered sequence of middleware units wrapping a terminal handler.
///
/// Built once at startup, then shared read-only (behind an `Arc`) by every
/// request. The builder methods take `self`, so a chain cannot be extended
/// once it is being served.
#[derive(Default)]
pub struct MiddlewareChain {
    units: Vec<Arc<dyn Middleware>>,
    handler: Option<BoxedHandler>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unit. Units run in the order they are added.
    pub fn with(mut self, unit: impl Middleware) -> Self {
        self.units.push(Arc::new(unit));
        self
    }

    /// Appends several already-shared units, keeping their order.
    pub fn with_all<I>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.units.extend(units);
        self
    }

    /// Sets the terminal handler, replacing any previous one.
    pub fn handler(mut self, handler: impl Handler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Runs one request through the chain, writing into `sink`.
    ///
    /// Panics raised by a unit or the handler are not caught here; put a
    /// [`Recover`](crate::middleware::Recover) unit in front to turn them
    /// into a 500.
    pub async fn execute(&self, req: &Request, sink: &mut dyn ResponseSink) {
        let mut recorder = ResponseRecorder::new(sink);
        Next { chain: self, position: 0 }.run(&mut recorder, req).await;
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("units", &self.units.len())
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// A chain can terminate another chain or a route, scoping its units to it.
/// The inner chain records into the outer recorder.
impl Handler for MiddlewareChain {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
        Box::pin(self.execute(req, res))
    }
}
