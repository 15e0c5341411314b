//! Verification token generation.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

/// Literal prefix on every token so published evidence is easy to grep for.
pub const TOKEN_PREFIX: &str = "rapid-verify-";

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Produces verification tokens and their expiry.
#[derive(Debug, Clone, Copy)]
pub struct TokenGenerator {
    ttl: Duration,
}

impl TokenGenerator {
    /// Create a generator whose tokens live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Generate a URL-safe token from OS entropy.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
    }

    /// Expiry for a token issued at `now`.
    #[must_use]
    pub fn expiry_for(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.ttl
    }

    /// Token lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(Duration::days(7))
    }
}
