//! Session cookie issuance.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use http::HeaderValue;
use http::header::SET_COOKIE;
use tracing::{debug, warn};

use crate::chain::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::recorder::ResponseRecorder;
use crate::request::Request;
use crate::session::{SecureTokens, SessionRecord, SessionStore, TokenSource};

/// Default session cookie name.
pub const COOKIE_NAME: &str = "cid";

/// Default cookie lifetime.
pub const COOKIE_TTL: Duration = Duration::from_secs(60 * 60);

/// Subject recorded for sessions created by cookie issuance alone.
const ANONYMOUS: &str = "anonymous";

/// Formats an HttpOnly `Set-Cookie` value valid for `ttl` from now.
///
/// Both `Max-Age` and `Expires` are sent; clients that understand `Max-Age`
/// prefer it.
pub fn set_cookie_header(name: &str, value: &str, ttl: Duration) -> String {
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={}", ttl.as_secs());
    if let Some(expires) = TimeDelta::from_std(ttl).ok().and_then(|d| Utc::now().checked_add_signed(d)) {
        cookie.push_str(&expires.format("; Expires=%a, %d %b %Y %H:%M:%S GMT").to_string());
    }
    cookie.push_str("; HttpOnly");
    cookie
}

/// Gives every client without a session cookie a fresh one, then continues.
///
/// The token comes from the configured [`TokenSource`]. With
/// [`register_in`](IssueCookie::register_in) the token is also stored as an
/// anonymous session, so an [`AuthGate`](super::AuthGate) later in the chain
/// admits the client's next request.
pub struct IssueCookie {
    name: String,
    ttl: Duration,
    tokens: Arc<dyn TokenSource>,
    store: Option<Arc<SessionStore>>,
}

impl IssueCookie {
    pub fn new() -> Self {
        Self {
            name: COOKIE_NAME.to_owned(),
            ttl: COOKIE_TTL,
            tokens: Arc::new(SecureTokens),
            store: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn tokens(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn register_in(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn issue(&self, res: &mut ResponseRecorder<'_>) {
        let token = self.tokens.token();

        if let Some(store) = &self.store {
            match SessionRecord::new(token.clone(), ANONYMOUS, self.ttl) {
                Ok(record) => {
                    store.put(record);
                }
                Err(e) => {
                    warn!(error = %e, "not registering cookie session");
                    return;
                }
            }
        }

        match HeaderValue::from_str(&set_cookie_header(&self.name, &token, self.ttl)) {
            Ok(value) => {
                debug!(cookie = %self.name, "issued session cookie");
                res.append_header(SET_COOKIE, value);
            }
            Err(e) => warn!(cookie = %self.name, error = %e, "invalid cookie header"),
        }
    }
}

impl Default for IssueCookie {
    fn default() -> Self { Self::new() }
}

impl Middleware for IssueCookie {
    fn handle<'a>(
        &'a self,
        res: &'a mut ResponseRecorder<'_>,
        req: &'a Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if req.cookie(&self.name).is_none() {
                self.issue(res);
            }
            next.run(res, req).await;
        })
    }
}
