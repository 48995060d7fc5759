use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Cancelled;

/// Cancellation scope for one logical request.
///
/// A context is done once its token is cancelled or its deadline has passed.
/// A deadline is reported as [`Cancelled::DeadlineExceeded`], manual
/// cancellation as [`Cancelled::Canceled`].
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never done unless [`CallContext::cancel`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the context to an existing token, e.g. one shared with a
    /// shutdown signal.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Returns a copy that expires `timeout` from now. An earlier existing
    /// deadline is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Returns a copy that expires at `deadline`. An earlier existing
    /// deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<Cancelled> {
        if self.token.is_cancelled() {
            return Some(Cancelled::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Cancelled::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is done.
    pub async fn done(&self) -> Cancelled {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Cancelled::Canceled,
                    _ = tokio::time::sleep_until(deadline) => Cancelled::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Cancelled::Canceled
            }
        }
    }

    /// Waits for `delay` unless the context finishes first.
    pub async fn sleep(&self, delay: Duration) -> Result<(), Cancelled> {
        if let Some(reason) = self.err() {
            return Err(reason);
        }
        if delay.is_zero() {
            return Ok(());
        }

        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
