use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    classify::{is_retryable_error, is_retryable_status},
    error::BoxError,
    Backoff, CallContext, ClientOptions, Error, ReqwestTransport, Request, Response, Result,
    Transport,
};

type Outcome = std::result::Result<Response, BoxError>;

/// Executes requests through a [`Transport`], retrying transient failures.
///
/// Retries cover connection-level errors, timeouts, and 408 / 429 / 5xx
/// responses. Once the retry budget is spent the last real outcome is
/// returned: a final 503 comes back as `Ok(response)`, a final connection
/// error as [`Error::Transport`].
#[derive(Clone)]
pub struct ResilientClient<T = ReqwestTransport> {
    transport: T,
    backoff: Option<Arc<dyn Backoff>>,
    retry_count: u32,
}

impl<T> fmt::Debug for ResilientClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("retry_count", &self.retry_count)
            .field("backoff", &self.backoff.is_some())
            .finish_non_exhaustive()
    }
}

impl ResilientClient<ReqwestTransport> {
    /// Builds a reqwest-backed client with the retry budget and exponential
    /// backoff described by `opts`.
    pub fn from_options(opts: ClientOptions) -> Result<Self> {
        let transport = ReqwestTransport::from_options(&opts)?;
        let client = Self::new(transport).with_retry_count(opts.request_retry_count);
        if opts.request_retry_count == 0 {
            return Ok(client);
        }
        Ok(client.with_backoff(opts.backoff()))
    }
}

impl<T: Transport> ResilientClient<T> {
    /// Wraps `transport` without retries; see [`ResilientClient::with_retry_count`].
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            backoff: None,
            retry_count: 0,
        }
    }

    /// Maximum number of retries after the initial attempt. `0` disables
    /// retries.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Strategy for the wait between attempts. Without one, retries are sent
    /// back to back.
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request`, retrying transient failures until the retry budget is
    /// spent.
    ///
    /// `ctx` is checked before every attempt and raced against both the
    /// transport call and the backoff wait; once it is done no further
    /// attempt is made and [`Error::Cancelled`] is returned.
    pub async fn execute(&self, mut request: Request, ctx: &CallContext) -> Result<Response> {
        let mut attempt = 0u32;

        loop {
            if let Some(reason) = ctx.err() {
                return Err(reason.into());
            }

            let outgoing = request.prepare(attempt)?;
            let outcome = tokio::select! {
                biased;
                reason = ctx.done() => return Err(reason.into()),
                outcome = self.transport.send(outgoing) => outcome,
            };

            if !self.should_retry(&outcome) {
                #[cfg(feature = "tracing")]
                if attempt > 0 {
                    tracing::debug!(attempt, outcome = %describe(&outcome), "retry settled");
                }
                return outcome.map_err(Error::Transport);
            }

            if attempt >= self.retry_count {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    attempts = attempt + 1,
                    "retry budget exhausted for {} {}",
                    request.method(),
                    request.url()
                );
                return outcome.map_err(Error::Transport);
            }

            self.wait_before_retry(outcome, attempt, ctx).await?;
            attempt += 1;
        }
    }

    fn should_retry(&self, outcome: &Outcome) -> bool {
        if self.retry_count == 0 {
            return false;
        }
        match outcome {
            Ok(response) => is_retryable_status(response.status()),
            Err(err) => is_retryable_error(&**err),
        }
    }

    /// Releases the failed attempt's response and waits out the backoff
    /// delay, giving up early if `ctx` finishes.
    async fn wait_before_retry(
        &self,
        outcome: Outcome,
        attempt: u32,
        ctx: &CallContext,
    ) -> Result<()> {
        let delay = self
            .backoff
            .as_ref()
            .map_or(Duration::ZERO, |backoff| backoff.next(i64::from(attempt)));

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt, ?delay, reason = %describe(&outcome), "retrying request");

        if let Ok(response) = outcome {
            tokio::select! {
                biased;
                reason = ctx.done() => return Err(reason.into()),
                _ = response.drain() => {}
            }
        }

        ctx.sleep(delay).await.map_err(|reason| {
            #[cfg(feature = "tracing")]
            tracing::debug!(attempt, %reason, "cancelled while waiting to retry");
            Error::from(reason)
        })
    }
}

#[cfg(feature = "tracing")]
fn describe(outcome: &Outcome) -> String {
    match outcome {
        Ok(response) => format!("status {}", response.status().as_u16()),
        Err(err) => err.to_string(),
    }
}
