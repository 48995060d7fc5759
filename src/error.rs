use std::error::Error as StdError;

use crate::classify::causes;

/// Boxed error produced by transports and body factories.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The call context was cancelled or its deadline elapsed.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    /// Error reported by the underlying transport on the final attempt.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    /// The request body factory failed while preparing a retry.
    #[error("failed to reproduce request body: {0}")]
    BodyReproduction(#[source] BoxError),
    /// A retry needed the request body again but it can only be read once.
    #[error("request body cannot be replayed for attempt {attempt}")]
    BodyNotReplayable {
        /// Zero-based attempt that needed the body.
        attempt: u32,
    },
    /// The request could not be built (invalid header, unserialisable body).
    #[error("invalid request: {0}")]
    Build(String),
}

impl Error {
    /// Returns `true` when the call ended because its context was cancelled
    /// or its deadline elapsed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Returns `true` when the final transport error was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Transport(err) => causes(&**err).any(|err| {
                err.downcast_ref::<reqwest::Error>()
                    .is_some_and(reqwest::Error::is_timeout)
                    || err
                        .downcast_ref::<std::io::Error>()
                        .is_some_and(|err| err.kind() == std::io::ErrorKind::TimedOut)
                    || err.is::<tokio::time::error::Elapsed>()
            }),
            _ => false,
        }
    }
}

/// Why a call context stopped a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Cancelled {
    /// The caller cancelled the context explicitly.
    #[error("request cancelled")]
    Canceled,
    /// The context deadline elapsed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Name resolution failure reported by a transport.
///
/// Only failures the resolver marks as temporary are retried.
///
/// Custom transports return this (boxed, or anywhere in their error's
/// `source()` chain) when their resolver can tell a temporary failure from a
/// permanent one. [`crate::ReqwestTransport`] never produces it: reqwest
/// reports DNS failures as opaque connect errors, which are not retried.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("failed to resolve host {host} (temporary: {temporary})")]
pub struct ResolveError {
    pub host: String,
    pub temporary: bool,
}

impl ResolveError {
    pub fn new(host: impl Into<String>, temporary: bool) -> Self {
        Self {
            host: host.into(),
            temporary,
        }
    }
}
