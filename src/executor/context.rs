// Run context: cooperative cancellation plus an optional deadline

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::output::errors::ArmadaError;

/// Cancellation signal threaded through every task invocation
///
/// Cloning shares the signal. Derived contexts (`with_cancel`,
/// `with_timeout`, `with_deadline`) are cancelled with their parent but
/// cancelling them leaves the parent alone. A deadline is never extended by
/// derivation: the child keeps the earlier of the two.
///
/// Once the deadline has passed, `err()` reports `DeadlineExceeded` even if
/// the token was also cancelled.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled on its own
    pub fn background() -> Self {
        Context {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Wrap an existing token
    pub fn from_token(token: CancellationToken) -> Self {
        Context {
            token,
            deadline: None,
        }
    }

    /// Derive a context that can be cancelled independently of `self`
    pub fn with_cancel(&self) -> Self {
        Context {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a cancellable context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a cancellable context that expires at `at`
    pub fn with_deadline(&self, at: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < at => current,
            _ => at,
        };

        Context {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<ArmadaError> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(ArmadaError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Some(ArmadaError::Cancelled);
        }
        None
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolve once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ArmadaError {
        match self.deadline {
            Some(at) => {
                tokio::select! {
                    _ = self.token.cancelled() => self.err().unwrap_or(ArmadaError::Cancelled),
                    _ = tokio::time::sleep_until(at) => ArmadaError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ArmadaError::Cancelled
            }
        }
    }

    /// Run `fut` unless the context finishes first
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, ArmadaError>
    where
        F: Future<Output = Result<T, ArmadaError>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::background()
    }
}
