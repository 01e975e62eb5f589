//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. A [`Router`] is a
//! [`Handler`], so it is normally the terminal handler of a
//! [`MiddlewareChain`](crate::MiddlewareChain).

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::recorder::ResponseRecorder;
use crate::request::Request;

/// The application router.
///
/// Build it once at startup and hand it to
/// [`MiddlewareChain::handler`](crate::MiddlewareChain::handler). A request no
/// route matches gets status 404 and no body.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    /// A route can itself be a [`MiddlewareChain`](crate::MiddlewareChain) to
    /// scope units to it.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`. Routes are fixed at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(handler))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Shorthand for `on(Method::GET, ..)`.
    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(&BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value, params))
    }
}

impl Handler for Router {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) if params.is_empty() => handler.call(req, res),
            Some((handler, params)) => Box::pin(async move {
                let routed = req.with_params(params);
                handler.call(&routed, res).await;
            }),
            None => {
                res.set_status(StatusCode::NOT_FOUND);
                Box::pin(async {})
            }
        }
    }
}
