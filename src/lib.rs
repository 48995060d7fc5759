//! `resilient-http` wraps an HTTP transport with automatic retries.
//!
//! [`ResilientClient::execute`] sends a [`Request`] through a [`Transport`]
//! and transparently retries transient failures:
//! - connection refused / reset, unexpected EOF, timeouts, temporary DNS
//!   failures ([`is_retryable_error`]);
//! - `408`, `429` and `5xx` responses ([`is_retryable_status`]).
//!
//! Waits between attempts come from a [`Backoff`] strategy, and every call is
//! bound to a [`CallContext`] that can cancel it or give it a deadline.

mod backoff;
mod classify;
mod client;
mod context;
mod error;
mod options;
mod request;
mod response;
mod transport;

pub use backoff::{Backoff, ConstantBackoff, ExponentialBackoff};
pub use classify::{is_retryable_error, is_retryable_status, is_retryable_status_code};
pub use client::ResilientClient;
pub use context::CallContext;
pub use error::{BoxError, Cancelled, Error, ResolveError};
pub use options::ClientOptions;
pub use request::{BodyFactory, Request};
pub use response::Response;
pub use transport::{ReqwestTransport, Transport};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, Error>;
