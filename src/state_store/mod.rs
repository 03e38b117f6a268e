//! OAuth state nonces for CSRF protection.
//!
//! Issuing a state stores `{token} -> {epoch seconds}` in the object store.
//! Consuming it checks the age and removes the object, so every token is
//! accepted at most once.

use crate::object_store::{ObjectStore, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;


/// Single-use OAuth state tokens.
pub trait OAuthStateStore: Send + Sync {
    /// Generates and persists a new state token.
    fn issue(&self) -> StoreResult<String>;

    /// Returns true if `state` was issued and has not expired. A readable
    /// token is spent whether or not it was still valid.
    fn consume(&self, state: &str) -> bool;
}

/// Async form of [`OAuthStateStore`]; runs the blocking calls inline.
#[async_trait]
pub trait AsyncOAuthStateStore: Send + Sync {
    async fn issue(&self) -> StoreResult<String>;

    async fn consume(&self, state: &str) -> bool;
}

#[async_trait]
impl<T: OAuthStateStore> AsyncOAuthStateStore for T {
    async fn issue(&self) -> StoreResult<String> {
        OAuthStateStore::issue(self)
    }

    async fn consume(&self, state: &str) -> bool {
        OAuthStateStore::consume(self, state)
    }
}

/// State store keeping one object per token in a blob container.
pub struct BlobStateStore {
    objects: Arc<dyn ObjectStore>,
    expiration_seconds: u64,
    span: Span,
}

impl BlobStateStore {
    /// Create a state store
    ///
    /// # Arguments
    /// * `objects` - Container the tokens are written to
    /// * `expiration_seconds` - How long a token stays valid (600 is typical)
    pub fn new(objects: Arc<dyn ObjectStore>, expiration_seconds: u64) -> Self {
        Self {
            objects,
            expiration_seconds,
            span: info_span!("oauth_state_store"),
        }
    }

    /// Span every log event of this store is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn expiration_seconds(&self) -> u64 {
        self.expiration_seconds
    }

    fn is_fresh(&self, created: f64, now: f64) -> bool {
        now < created + self.expiration_seconds as f64
    }

    /// Deletes every token that has expired or holds an unreadable timestamp.
    ///
    /// Only keys shaped like issued tokens (UUIDs) are considered; anything
    /// else in the container is left alone. Returns how many tokens were
    /// removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let keys = self.objects.list("")?.collect::<StoreResult<Vec<String>>>()?;
        let now = epoch_seconds();
        let mut purged = 0;

        for key in keys {
            if Uuid::parse_str(&key).is_err() {
                continue;
            }

            // Consumed concurrently.
            let Some(body) = self.objects.download(&key)? else {
                continue;
            };

            let stale = match parse_timestamp(&body) {
                Some(created) => !self.is_fresh(created, now),
                None => true,
            };

            if stale {
                self.objects.delete(&key)?;
                purged += 1;
            }
        }

        Ok(purged)
    }
}

impl OAuthStateStore for BlobStateStore {
    fn issue(&self) -> StoreResult<String> {
        let state = Uuid::new_v4().to_string();
        let created = epoch_seconds().to_string();

        self.objects.upload(&state, created.as_bytes())?;

        debug!(parent: &self.span, state = %state, "Issued OAuth state");
        Ok(state)
    }

    fn consume(&self, state: &str) -> bool {
        let body = match self.objects.download(state) {
            Ok(Some(body)) => body,
            Ok(None) => {
                warn!(parent: &self.span, state = %state, "Failed to find any persistent data for state");
                return false;
            }
            Err(e) => {
                warn!(parent: &self.span, state = %state, error = %e, "Failed to read OAuth state");
                return false;
            }
        };

        let Some(created) = parse_timestamp(&body) else {
            warn!(parent: &self.span, state = %state, "OAuth state holds an unreadable timestamp");
            return false;
        };

        let still_valid = self.is_fresh(created, epoch_seconds());

        // Single use: an expired token is spent too.
        if let Err(e) = self.objects.delete(state) {
            warn!(parent: &self.span, state = %state, error = %e, "Failed to delete consumed OAuth state");
            return false;
        }

        if !still_valid {
            info!(parent: &self.span, state = %state, "OAuth state expired");
        }
        still_valid
    }
}

/// Background task purging expired states every `interval`.
pub async fn run_state_cleanup(store: Arc<BlobStateStore>, interval: Duration) {
    let mut timer = tokio::time::interval(interval);

    loop {
        timer.tick().await;
        match store.purge_expired() {
            Ok(purged) => debug!(parent: &store.span, purged, "OAuth state cleanup complete"),
            Err(e) => warn!(parent: &store.span, error = %e, "OAuth state cleanup failed"),
        }
    }
}

fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn parse_timestamp(body: &[u8]) -> Option<f64> {
    std::str::from_utf8(body)
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
}
