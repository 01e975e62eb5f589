//! Access logging.

use std::time::Instant;

use tracing::info;

use crate::chain::Next;
use crate::handler::BoxFuture;
use crate::recorder::ResponseRecorder;
use crate::request::Request;

/// Emits one `info!` event per request once the rest of the chain returns:
/// method, final status, URL, elapsed time and body length, plus the peer
/// address when the transport knows it.
///
/// Place it first so the status it reports includes whatever [`Recover`]
/// wrote.
///
/// [`Recover`]: super::Recover
pub fn log_request<'a>(
    res: &'a mut ResponseRecorder<'_>,
    req: &'a Request,
    next: Next<'a>,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let started = Instant::now();
        next.run(res, req).await;
        info!(
            method = %req.method(),
            status = res.status().as_u16(),
            url = %req.uri(),
            elapsed = ?started.elapsed(),
            content_length = res.content_length(),
            peer = ?req.remote_addr(),
            "request completed",
        );
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fmt;
    use std::sync::Arc;

    use http::StatusCode;
    use parking_lot::Mutex;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::Registry;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use super::*;
    use crate::middleware::Recover;
    use crate::middleware::testing::{Counting, get};
    use crate::response::Response;
    use crate::{MiddlewareChain, Router};

    type Fields = BTreeMap<String, String>;

    /// Keeps the fields of every event emitted while it is installed.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<Fields>>>);

    impl Captured {
        fn completed(&self) -> Vec<Fields> {
            self.0
                .lock()
                .iter()
                .filter(|f| f.get("message").map(String::as_str) == Some("request completed"))
                .cloned()
                .collect()
        }
    }

    struct FieldVisitor<'a>(&'a mut Fields);

    impl Visit for FieldVisitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_owned(), format!("{value:?}"));
        }

        fn record_u64(&mut self, field: &Field, value: u64) {
            self.0.insert(field.name().to_owned(), value.to_string());
        }

        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_owned(), value.to_owned());
        }
    }

    impl<S: Subscriber> Layer<S> for Captured {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = Fields::new();
            event.record(&mut FieldVisitor(&mut fields));
            self.0.lock().push(fields);
        }
    }

    fn fail() {
        panic!("logged as 500");
    }

    fn explode<'a>(_req: &'a Request, _res: &'a mut ResponseRecorder<'_>) -> BoxFuture<'a, ()> {
        Box::pin(async { fail() })
    }

    async fn logged(chain: &MiddlewareChain, uri: &str) -> (Response, Vec<Fields>) {
        let captured = Captured::default();
        let _guard = tracing::subscriber::set_default(Registry::default().with(captured.clone()));

        let mut sink = Response::new();
        chain.execute(&get(uri, None), &mut sink).await;
        (sink, captured.completed())
    }

    #[tokio::test]
    async fn passes_through_unchanged() {
        let handler = Counting::writing(b"hello");
        let chain = MiddlewareChain::new().with(log_request).handler(handler.clone());

        let (sink, events) = logged(&chain, "/hello?x=1").await;

        assert_eq!(handler.calls(), 1);
        assert_eq!(sink.status(), StatusCode::OK);
        assert_eq!(sink.body(), b"hello");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["status"], "200");
        assert_eq!(events[0]["content_length"], "5");
    }

    #[tokio::test]
    async fn one_event_with_final_404_and_its_body() {
        let chain = MiddlewareChain::new()
            .with(log_request)
            .with(Recover::new())
            .handler(Router::new());

        let (sink, events) = logged(&chain, "/missing?q=1").await;

        assert_eq!(sink.status(), StatusCode::NOT_FOUND);
        let [event] = events.as_slice() else {
            panic!("expected one access-log event, got {events:?}");
        };
        assert_eq!(event["method"], "GET");
        assert_eq!(event["status"], "404");
        assert_eq!(event["url"], "/missing?q=1");
        assert_eq!(event["content_length"], "4");
        assert!(event.contains_key("elapsed"));
    }

    #[tokio::test]
    async fn recovered_panic_is_logged_as_500() {
        let chain = MiddlewareChain::new()
            .with(log_request)
            .with(Recover::new())
            .handler(explode);

        let (sink, events) = logged(&chain, "/boom").await;

        assert_eq!(sink.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["status"], "500");
        assert_eq!(events[0]["url"], "/boom");
        assert_eq!(events[0]["content_length"], "0");
    }
}
