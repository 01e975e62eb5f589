//! Demo server: access log, panic recovery, session cookies and a gated route.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example websrv
//!
//! Try:
//!   curl -i http://localhost:3000/hello
//!   curl -i http://localhost:3000/panic
//!   curl -i http://localhost:3000/missing
//!   curl -i http://localhost:3000/private
//!   curl -i -c jar http://localhost:3000/login && curl -i -b jar http://localhost:3000/private

use std::sync::Arc;
use std::time::Duration;

use http::HeaderValue;
use http::header::SET_COOKIE;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use websrv::middleware::{AuthGate, IssueCookie, Recover, log_request, set_cookie_header};
use websrv::{
    BoxFuture, Config, Handler, Middleware, MiddlewareChain, Request, ResponseRecorder, Router, Server, SessionStore,
};

#[tokio::main]
async fn main() -> Result<(), websrv::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    info!(?config, "configuration loaded");

    let store = Arc::new(SessionStore::new());
    let shutdown = CancellationToken::new();
    let sweeper = store.spawn_sweeper(config.sweep_interval(), shutdown.clone());

    // Every route but /login hands out an anonymous cookie; /login sets its
    // own, so it stays outside the shared unit.
    let cookie: Arc<dyn Middleware> =
        Arc::new(IssueCookie::new().name(config.cookie_name.clone()).ttl(config.session_ttl()));

    let members = with_cookie(&cookie)
        .with(AuthGate::new(Arc::clone(&store)).cookie_name(config.cookie_name.clone()))
        .handler(private);

    let app = Router::new()
        .get("/hello", with_cookie(&cookie).handler(hello))
        .get("/panic", with_cookie(&cookie).handler(explode))
        .get("/login", Login {
            store: Arc::clone(&store),
            cookie_name: config.cookie_name.clone(),
            ttl: config.session_ttl(),
        })
        .get("/private", members);

    let chain = MiddlewareChain::new()
        .with(log_request)
        .with(Recover::new())
        .handler(app);

    let served = Server::bind(config.addr).serve(chain).await;

    shutdown.cancel();
    let _ = sweeper.await;

    served
}

fn with_cookie(cookie: &Arc<dyn Middleware>) -> MiddlewareChain {
    MiddlewareChain::new().with_all([Arc::clone(cookie)])
}

fn hello<'a>(req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let body = format!("Hello {} {}\n", req.method(), req.uri());
        if let Err(e) = res.write_all(body.as_bytes()) {
            warn!(error = %e, "could not write greeting");
        }
    })
}

fn explode<'a>(_req: &'a Request, _res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
    Box::pin(async move { fail() })
}

fn fail() {
    panic!("deliberate failure for /panic");
}

fn private<'a>(_req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let _ = res.write_all(b"welcome back\n");
    })
}

/// Starts a session for the demo user and hands its token out as a cookie.
struct Login {
    store: Arc<SessionStore>,
    cookie_name: String,
    ttl: Duration,
}

impl Handler for Login {
    fn call<'a>(&'a self, _req: &'a Request, res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let session = match self.store.issue("demo", self.ttl) {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "could not start session");
                    res.set_status(http::StatusCode::INTERNAL_SERVER_ERROR);
                    return;
                }
            };

            let cookie = set_cookie_header(&self.cookie_name, session.token(), self.ttl);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                res.append_header(SET_COOKIE, value);
            }
            let _ = res.write_all(b"logged in\n");
        })
    }
}
