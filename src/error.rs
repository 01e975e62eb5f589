//! Unified error type.

use std::time::Duration;

/// The error type returned by websrv's fallible operations.
///
/// Application-level outcomes (404, 401, etc.) are expressed as statuses on
/// the [`ResponseRecorder`](crate::ResponseRecorder), not as `Error`s. Panics
/// inside the chain are not `Error`s either: the
/// [`Recover`](crate::middleware::Recover) unit or the server's own fault
/// boundary turns them into a 500.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding or accepting on the listening socket failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The response sink rejected a body write. Not retried.
    #[error("response write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// The request body could not be read from the connection.
    #[error("request body: {0}")]
    Body(#[from] hyper::Error),

    /// No session is stored under the presented token.
    #[error("unrecognized session token")]
    UnrecognizedSession,

    /// The session exists but its expiry has passed; the sweep has not
    /// removed it yet.
    #[error("session expired")]
    SessionExpired,

    /// A session lifetime must be positive and representable as a timestamp
    /// offset.
    #[error("invalid session ttl: {0:?}")]
    InvalidTtl(Duration),

    /// Configuration could not be loaded or deserialised.
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),
}
