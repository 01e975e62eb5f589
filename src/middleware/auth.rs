//! Session-cookie authentication gate.

use std::sync::Arc;

use chrono::Utc;
use http::StatusCode;
use tracing::debug;

use crate::chain::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::recorder::ResponseRecorder;
use crate::request::Request;
use crate::session::SessionStore;

use super::cookie::COOKIE_NAME;

/// What [`AuthGate`] does when a cookie is present but its token is unknown
/// or expired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnrecognizedPolicy {
    /// Answer 401, exactly like a missing cookie.
    #[default]
    Reject,
    /// Stop the chain without writing anything. The client sees whatever the
    /// earlier units produced, by default an empty 200.
    Halt,
}

/// Admits a request only if its session cookie names a live session.
///
/// - no cookie: 401, the rest of the chain does not run
/// - known, unexpired token: the rest of the chain runs
/// - unknown or expired token: see [`UnrecognizedPolicy`]
///
/// Expiry is checked against the current time, so a session is refused as
/// soon as it expires even if the sweep has not removed it yet.
pub struct AuthGate {
    store: Arc<SessionStore>,
    cookie_name: String,
    policy: UnrecognizedPolicy,
}

impl AuthGate {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            cookie_name: COOKIE_NAME.to_owned(),
            policy: UnrecognizedPolicy::default(),
        }
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn on_unrecognized(mut self, policy: UnrecognizedPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Middleware for AuthGate {
    fn handle<'a>(
        &'a self,
        res: &'a mut ResponseRecorder<'_>,
        req: &'a Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let Some(token) = req.cookie(&self.cookie_name) else {
                debug!(url = %req.uri(), "no session cookie");
                res.set_status(StatusCode::UNAUTHORIZED);
                return;
            };

            match self.store.validate(token, Utc::now()) {
                Ok(session) => {
                    debug!(subject = session.subject(), "session admitted");
                    next.run(res, req).await;
                }
                Err(e) => {
                    debug!(url = %req.uri(), reason = %e, policy = ?self.policy, "session refused");
                    if self.policy == UnrecognizedPolicy::Reject {
                        res.set_status(StatusCode::UNAUTHORIZED);
                    }
                }
            }
        })
    }
}
