//! Per-scope bearer token cache with single-flight refresh.
//!
//! Each authentication scope moves through Empty -> Valid -> Stale ->
//! Refreshing and back to Valid (or Empty on failure):
//! - **Empty**: nothing cached, the next caller starts an acquisition
//! - **Valid**: the cached value is returned with no I/O
//! - **Stale**: the safety margin is violated, a refresh runs before returning
//! - **Refreshing**: one acquisition is in flight; every concurrent caller
//!   waits for its broadcast result instead of issuing its own
//!
//! This module contains:
//! - The [`TokenSource`] trait acquisitions go through
//! - Concurrent scope registry (`TokenCache`) backed by DashMap
//! - Queue-and-wait result signaling via `tokio::sync::watch`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// A token this close to expiry is treated as stale and refreshed.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assigned to every acquired token. Fixed here rather than taken
/// from the identity endpoint's response, so cache behavior does not depend
/// on per-tenant policy.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(50 * 60);

/// Upper bound on a single acquisition attempt. A timeout is handled
/// exactly like an acquisition failure.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of bearer tokens for an authentication scope.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    /// Acquire a fresh token for `scope` from the identity provider.
    async fn acquire(&self, scope: &str) -> Result<String>;
}

/// Result of one acquisition attempt, broadcast to every waiting caller.
#[derive(Debug, Clone)]
enum AttemptOutcome {
    /// The attempt has not finished yet.
    Pending,
    /// The attempt produced a token.
    Ready(String),
    /// The attempt failed with this message.
    Failed(String),
}

/// A token held for one scope.
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Whether the token is still outside the safety margin.
    fn is_fresh(&self) -> bool {
        Instant::now() + SAFETY_MARGIN < self.expires_at
    }
}

/// Cache state for one scope.
enum ScopeState {
    Empty,
    Valid(CachedToken),
    /// An acquisition is in flight; the receiver yields its outcome.
    Refreshing(watch::Receiver<AttemptOutcome>),
}

struct ScopeEntry {
    state: Mutex<ScopeState>,
}

/// Concurrent token cache with one entry per authentication scope.
///
/// Backed by [`DashMap`] for per-shard locking; refreshes on different
/// scopes never contend with each other.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    scopes: DashMap<String, Arc<ScopeEntry>>,
}

impl TokenCache {
    /// Create a cache drawing tokens from `source`.
    pub fn new<S: TokenSource>(source: S) -> Self {
        Self {
            source: Arc::new(source),
            scopes: DashMap::new(),
        }
    }

    /// Return a token for `scope`, acquiring or refreshing as needed.
    ///
    /// When an acquisition is already in flight for the scope, this waits
    /// for its broadcast result via `tokio::sync::watch` rather than issuing
    /// another one (queue-and-wait semantics). A failed attempt propagates
    /// the same error to every waiter and leaves the scope empty, so the
    /// next call retries.
    pub async fn get_token(&self, scope: &str) -> Result<String> {
        let entry = Arc::clone(
            &self
                .scopes
                .entry(scope.to_string())
                .or_insert_with(|| Arc::new(ScopeEntry {
                    state: Mutex::new(ScopeState::Empty),
                })),
        );

        // Decide under the lock, wait outside it.
        // CRITICAL: the Mutex is dropped before any .await.
        let mut rx = {
            let mut state = entry.state.lock().unwrap();
            match &*state {
                ScopeState::Valid(token) if token.is_fresh() => {
                    return Ok(token.value.clone());
                }
                ScopeState::Refreshing(rx) => rx.clone(),
                // Empty, or a token inside the safety margin.
                _ => {
                    let rx = self.spawn_acquisition(scope, &entry);
                    *state = ScopeState::Refreshing(rx.clone());
                    rx
                }
            }
        };

        loop {
            if rx.changed().await.is_err() {
                // The acquisition task died without reporting. Reset the
                // scope so the next caller can retry.
                let mut state = entry.state.lock().unwrap();
                if matches!(&*state, ScopeState::Refreshing(_)) {
                    *state = ScopeState::Empty;
                }
                return Err(Error::CredentialAcquisition(format!(
                    "token acquisition for scope '{}' aborted without a result",
                    scope
                )));
            }
            match rx.borrow_and_update().clone() {
                AttemptOutcome::Pending => continue,
                AttemptOutcome::Ready(value) => return Ok(value),
                AttemptOutcome::Failed(message) => {
                    return Err(Error::CredentialAcquisition(message));
                }
            }
        }
    }

    /// Start an acquisition for `scope` in its own task.
    ///
    /// The task outlives the originating request: an aborted caller must not
    /// cancel an acquisition other callers may be waiting on, and a completed
    /// one still populates the cache for future requests.
    fn spawn_acquisition(
        &self,
        scope: &str,
        entry: &Arc<ScopeEntry>,
    ) -> watch::Receiver<AttemptOutcome> {
        let (tx, rx) = watch::channel(AttemptOutcome::Pending);
        let source = Arc::clone(&self.source);
        let entry = Arc::clone(entry);
        let scope = scope.to_string();

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(ACQUIRE_TIMEOUT, source.acquire(&scope)).await
            {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(Error::CredentialAcquisition(message))) => Err(message),
                Ok(Err(other)) => Err(other.to_string()),
                Err(_) => Err(format!(
                    "token acquisition for scope '{}' timed out after {:?}",
                    scope, ACQUIRE_TIMEOUT
                )),
            };

            // State update and broadcast happen under one lock acquisition,
            // so a caller always observes either the new state or the
            // broadcast, never a gap between them.
            let mut state = entry.state.lock().unwrap();
            match outcome {
                Ok(value) => {
                    tracing::debug!(scope = %scope, "acquired token");
                    *state = ScopeState::Valid(CachedToken {
                        value: value.clone(),
                        expires_at: Instant::now() + TOKEN_LIFETIME,
                    });
                    let _ = tx.send(AttemptOutcome::Ready(value));
                }
                Err(message) => {
                    tracing::warn!(scope = %scope, error = %message, "token acquisition failed");
                    // No negative caching: the scope goes back to Empty and
                    // the next call retries.
                    *state = ScopeState::Empty;
                    let _ = tx.send(AttemptOutcome::Failed(message));
                }
            }
        });

        rx
    }
}
