//! Expiring in-memory session store.
//!
//! Sessions are keyed by an opaque token and carry an absolute expiry. A
//! session is *logically* dead once its expiry passes; it is *physically*
//! removed by the next sweep. [`SessionStore::get`] does not hide records in
//! between, [`SessionStore::validate`] does.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use websrv::SessionStore;
//!
//! # async fn run() -> Result<(), websrv::Error> {
//! let store = Arc::new(SessionStore::new());
//! let shutdown = CancellationToken::new();
//! let sweeper = store.spawn_sweeper(Duration::from_secs(10), shutdown.clone());
//!
//! let session = store.issue("alice", Duration::from_secs(3600))?;
//! assert!(store.get(session.token()).is_some());
//!
//! shutdown.cancel();
//! let _ = sweeper.await;
//! # Ok(())
//! # }
//! ```

mod token;

pub use token::{SecureTokens, SeededTokens, TOKEN_LEN, TokenSource};

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Error;

/// Shortest period the sweeper accepts; smaller intervals are raised to it.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

// ── SessionRecord ────────────────────────────────────────────────────────────

/// One authenticated session. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    token: String,
    subject: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A session starting now and lasting `ttl`.
    pub fn new(token: impl Into<String>, subject: impl Into<String>, ttl: Duration) -> Result<Self, Error> {
        Self::starting_at(token, subject, Utc::now(), ttl)
    }

    /// A session starting at `created_at` and lasting `ttl`.
    ///
    /// `ttl` must be non-zero so that the expiry lies strictly after the
    /// creation time.
    pub fn starting_at(
        token: impl Into<String>,
        subject: impl Into<String>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, Error> {
        if ttl.is_zero() {
            return Err(Error::InvalidTtl(ttl));
        }
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| created_at.checked_add_signed(delta))
            .ok_or(Error::InvalidTtl(ttl))?;

        Ok(Self {
            token: token.into(),
            subject: subject.into(),
            created_at,
            expires_at,
        })
    }

    pub fn token(&self) -> &str { &self.token }
    pub fn subject(&self) -> &str { &self.subject }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn expires_at(&self) -> DateTime<Utc> { self.expires_at }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ── SessionStore ─────────────────────────────────────────────────────────────

/// Thread-safe token → session map with periodic expiry sweeping.
///
/// Lookups take the read lock and may run in parallel; inserts and removals
/// take the write lock. No lock is held across an `.await` or any I/O.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionRecord>>>,
    tokens: Arc<dyn TokenSource>,
}

impl SessionStore {
    /// An empty store issuing tokens from [`SecureTokens`].
    pub fn new() -> Self {
        Self::with_tokens(Arc::new(SecureTokens))
    }

    pub fn with_tokens(tokens: Arc<dyn TokenSource>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), tokens }
    }

    /// Inserts `record` under its token, replacing any previous session.
    pub fn put(&self, record: SessionRecord) -> Arc<SessionRecord> {
        let record = Arc::new(record);
        self.sessions
            .write()
            .insert(record.token.clone(), Arc::clone(&record));
        record
    }

    /// Returns the stored session, expired or not.
    pub fn get(&self, token: &str) -> Option<Arc<SessionRecord>> {
        self.sessions.read().get(token).cloned()
    }

    /// Returns the session only if it exists and has not expired at `now`.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Arc<SessionRecord>, Error> {
        let record = self.get(token).ok_or(Error::UnrecognizedSession)?;
        if record.is_expired(now) {
            return Err(Error::SessionExpired);
        }
        Ok(record)
    }

    /// Removes every listed token under a single write lock and returns how
    /// many were present. An empty batch does not touch the lock.
    pub fn remove<I, S>(&self, tokens: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokens = tokens.into_iter().peekable();
        if tokens.peek().is_none() {
            return 0;
        }
        let mut sessions = self.sessions.write();
        tokens
            .filter(|token| {
                let token: &str = token.as_ref();
                sessions.remove(token).is_some()
            })
            .count()
    }

    /// Creates a session for `subject` under a fresh token and stores it.
    pub fn issue(&self, subject: impl Into<String>, ttl: Duration) -> Result<Arc<SessionRecord>, Error> {
        let record = SessionRecord::new(self.tokens.token(), subject, ttl)?;
        debug!(subject = %record.subject, expires_at = %record.expires_at, "session issued");
        Ok(self.put(record))
    }

    /// Runs one sweep cycle: collects the tokens expired at `now` under the
    /// read lock, then removes them under the write lock. Returns the number
    /// removed.
    ///
    /// A session re-`put` between the two phases is removed anyway if its
    /// token was collected; a token is only ever reused by an explicit `put`.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.token.clone())
            .collect();
        self.remove(&expired)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Spawns the background sweep: one cycle immediately, then one every
    /// `interval`, until `cancel` fires.
    ///
    /// Each cycle runs inside its own panic boundary, so a failing cycle is
    /// logged and the next one still runs.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let period = interval.max(MIN_SWEEP_INTERVAL);

        info!(interval = ?period, "starting session sweeper");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        info!("session sweeper stopped");
                        break;
                    }

                    _ = ticker.tick() => {
                        match std::panic::catch_unwind(AssertUnwindSafe(|| store.sweep(Utc::now()))) {
                            Ok(0) => debug!("no expired sessions"),
                            Ok(removed) => info!(removed, remaining = store.len(), "swept expired sessions"),
                            Err(_) => error!("session sweep panicked; retrying next interval"),
                        }
                    }
                }
            }
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn expired(token: &str) -> SessionRecord {
        SessionRecord::starting_at(token, "old", Utc::now() - TimeDelta::hours(2), HOUR).unwrap()
    }

    #[test]
    fn record_expiry_is_after_creation() {
        let record = SessionRecord::new("t", "alice", HOUR).unwrap();
        assert!(record.expires_at() > record.created_at());
        assert!(!record.is_expired(record.created_at()));
        assert!(record.is_expired(record.expires_at()));
    }

    #[test]
    fn zero_or_huge_ttl_is_rejected() {
        assert!(matches!(
            SessionRecord::new("t", "a", Duration::ZERO),
            Err(Error::InvalidTtl(d)) if d.is_zero()
        ));
        assert!(matches!(
            SessionRecord::new("t", "a", Duration::MAX),
            Err(Error::InvalidTtl(_))
        ));
    }

    #[test]
    fn put_get_overwrite() {
        let store = SessionStore::new();
        assert!(store.get("t1").is_none());

        store.put(SessionRecord::new("t1", "alice", HOUR).unwrap());
        store.put(SessionRecord::new("t1", "bob", HOUR).unwrap());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("t1").unwrap().subject(), "bob");
    }

    #[test]
    fn get_still_returns_logically_expired_records() {
        let store = SessionStore::new();
        store.put(expired("stale"));

        assert!(store.get("stale").is_some());
        assert!(matches!(store.validate("stale", Utc::now()), Err(Error::SessionExpired)));
        assert!(matches!(store.validate("nope", Utc::now()), Err(Error::UnrecognizedSession)));
    }

    #[test]
    fn remove_is_bulk_and_ignores_missing_keys() {
        let store = SessionStore::new();
        for t in ["a", "b", "c"] {
            store.put(SessionRecord::new(t, "s", HOUR).unwrap());
        }

        assert_eq!(store.remove(["a", "missing", "c"]), 2);
        assert_eq!(store.remove(Vec::<String>::new()), 0);
        assert_eq!(store.len(), 1);
        assert!(store.get("b").is_some());
    }

    #[test]
    fn issue_uses_injected_token_source() {
        let store = SessionStore::with_tokens(Arc::new(SeededTokens::new(42)));
        let expected = SeededTokens::new(42).token();

        let record = store.issue("alice", HOUR).unwrap();

        assert_eq!(record.token(), expected);
        assert_eq!(record.token().len(), TOKEN_LEN);
        assert_eq!(store.validate(&expected, Utc::now()).unwrap().subject(), "alice");
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = SessionStore::new();
        store.put(expired("old1"));
        store.put(expired("old2"));
        let fresh = store.issue("alice", HOUR).unwrap();

        assert_eq!(store.sweep(Utc::now()), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(fresh.token()).is_some());

        // Everything is expired two hours from now.
        assert_eq!(store.sweep(Utc::now() + TimeDelta::hours(2)), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let store = SessionStore::new();
        std::thread::scope(|s| {
            for w in 0..4 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..250 {
                        store.put(SessionRecord::new(format!("{w}-{i}"), "s", HOUR).unwrap());
                    }
                });
            }
            for _ in 0..4 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..250 {
                        let _ = store.get(&format!("0-{i}"));
                    }
                });
            }
        });
        assert_eq!(store.len(), 1000);
        assert_eq!(store.remove((0..250).map(|i| format!("3-{i}"))), 250);
        assert_eq!(store.len(), 750);
    }

    #[tokio::test]
    async fn sweeper_evicts_within_an_interval_of_expiry() {
        let store = Arc::new(SessionStore::new());
        store.put(SessionRecord::new("t1", "alice", Duration::from_secs(1)).unwrap());

        let cancel = CancellationToken::new();
        let sweeper = store.spawn_sweeper(Duration::from_secs(1), cancel.clone());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(store.get("t1").is_some(), "evicted before expiry");

        let deadline = tokio::time::Instant::now() + Duration::from_millis(2500);
        while store.get("t1").is_some() {
            assert!(tokio::time::Instant::now() < deadline, "still present 3s after insert");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let store = Arc::new(SessionStore::new());
        let cancel = CancellationToken::new();
        let sweeper = store.spawn_sweeper(Duration::from_secs(3600), cancel.clone());

        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn zero_interval_is_clamped() {
        let store = Arc::new(SessionStore::new());
        store.put(expired("old"));
        let cancel = CancellationToken::new();
        let sweeper = store.spawn_sweeper(Duration::ZERO, cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn very_long_interval_still_sweeps_at_startup() {
        let store = Arc::new(SessionStore::new());
        store.put(expired("old"));
        let cancel = CancellationToken::new();
        let sweeper = store.spawn_sweeper(Duration::from_secs(100 * 365 * 24 * 3600), cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());

        cancel.cancel();
        sweeper.await.unwrap();
    }
}
