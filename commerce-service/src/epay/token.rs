//! Process-wide gateway token with a background refresher.
//!
//! Readers take a cheap `Arc` snapshot; the refresher builds the next token
//! completely before swapping it in, so nobody observes a partial update.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::GatewayError;
use super::types::Token;
use crate::services::metrics::TOKEN_REFRESH_TOTAL;

/// How long before expiry the token is renewed.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Lower bound between refresh attempts so a short-lived token cannot spin the loop.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Time until the token should be renewed, clamped at zero.
pub fn refresh_delay(token: &Token) -> Duration {
    Duration::from_secs(token.expires_in_secs()).saturating_sub(REFRESH_MARGIN)
}

fn next_wait(token: &Token) -> Duration {
    refresh_delay(token).max(MIN_REFRESH_INTERVAL)
}

pub struct TokenStore {
    current: RwLock<Arc<Token>>,
}

impl TokenStore {
    pub fn new(token: Token) -> Self {
        Self {
            current: RwLock::new(Arc::new(token)),
        }
    }

    pub fn snapshot(&self) -> Arc<Token> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn replace(&self, token: Token) {
        let next = Arc::new(token);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// Handle to the refresh task. Dropping it stops the task.
pub struct TokenRefresher {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl TokenRefresher {
    /// Spawns a task that renews the token `REFRESH_MARGIN` before it expires.
    ///
    /// A failed refresh keeps the current token and tries again after the same wait.
    pub fn spawn<F, Fut>(store: Arc<TokenStore>, refresh: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Token, GatewayError>> + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let cancelled = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut wait = next_wait(&store.snapshot());
            debug!(wait_secs = wait.as_secs(), "Token refresher started");

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                let result = tokio::select! {
                    _ = cancelled.cancelled() => break,
                    result = refresh() => result,
                };

                match result {
                    Ok(token) => {
                        wait = next_wait(&token);
                        store.replace(token);
                        TOKEN_REFRESH_TOTAL
                            .with_label_values(&["scheduled", "success"])
                            .inc();
                        info!(next_refresh_secs = wait.as_secs(), "Gateway token refreshed");
                    }
                    Err(e) => {
                        TOKEN_REFRESH_TOTAL
                            .with_label_values(&["scheduled", "failure"])
                            .inc();
                        warn!(
                            error = %e,
                            retry_in_secs = wait.as_secs(),
                            "Scheduled gateway token refresh failed, keeping current token"
                        );
                    }
                }
            }

            debug!("Token refresher stopped");
        });

        Self { shutdown, handle }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TokenRefresher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
