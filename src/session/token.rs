//! Session token generation.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Length of a session token, in characters.
pub const TOKEN_LEN: usize = 40;

/// Produces opaque session tokens.
///
/// Injected into [`SessionStore`](super::SessionStore) and
/// [`IssueCookie`](crate::middleware::IssueCookie) so tests can use a
/// deterministic source.
pub trait TokenSource: Send + Sync {
    /// Returns `len` characters drawn from `[0-9A-Za-z]`.
    fn generate(&self, len: usize) -> String;

    fn token(&self) -> String {
        self.generate(TOKEN_LEN)
    }
}

fn alphanumeric<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

/// Tokens from the thread-local CSPRNG. The default everywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecureTokens;

impl TokenSource for SecureTokens {
    fn generate(&self, len: usize) -> String {
        alphanumeric(&mut rand::rng(), len)
    }
}

/// Tokens from one shared, explicitly seeded PRNG.
///
/// Not suitable for anything an attacker could guess at: anyone who knows the
/// seed knows every token. [`SeededTokens::from_clock`] seeds from the start
/// time; [`SeededTokens::new`] gives a reproducible sequence for tests.
#[derive(Debug)]
pub struct SeededTokens {
    rng: Mutex<StdRng>,
}

impl SeededTokens {
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// Seeds from the current wall-clock time in nanoseconds.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::new(nanos)
    }
}

impl TokenSource for SeededTokens {
    fn generate(&self, len: usize) -> String {
        alphanumeric(&mut *self.rng.lock(), len)
    }
}
