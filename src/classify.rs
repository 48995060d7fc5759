//! Decides whether a failed attempt is worth retrying.
//!
//! Both checks are pure and total: unknown errors and out-of-range status
//! codes are simply not retryable.

use std::error::Error as StdError;
use std::io;

use reqwest::StatusCode;

use crate::{Cancelled, ResolveError};

/// Returns `true` if `err` (or anything in its `source()` chain) describes a
/// transient transport failure: a refused or reset connection, an unexpected
/// end of stream (including a connection closed before the response was
/// complete), a timeout, or a name-resolution failure the resolver marks
/// as temporary.
///
/// Cancellation of the caller's context is never retryable, wherever it
/// appears in the chain.
pub fn is_retryable_error(err: &(dyn StdError + 'static)) -> bool {
    let mut retryable = false;
    for err in causes(err) {
        if err.is::<Cancelled>() {
            return false;
        }
        retryable = retryable || is_transient(err);
    }
    retryable
}

/// Iterates `err` and its causes. The payload of an `io::Error` counts as a
/// cause, since `io::Error::source` skips it.
pub(crate) fn causes<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&err| {
        match err.downcast_ref::<io::Error>().and_then(io::Error::get_ref) {
            Some(inner) => Some(inner as &(dyn StdError + 'static)),
            None => err.source(),
        }
    })
}

fn is_transient(err: &(dyn StdError + 'static)) -> bool {
    if let Some(err) = err.downcast_ref::<io::Error>() {
        return matches!(
            err.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::TimedOut
        );
    }
    if let Some(err) = err.downcast_ref::<reqwest::Error>() {
        return err.is_timeout();
    }
    if let Some(err) = err.downcast_ref::<hyper::Error>() {
        return err.is_incomplete_message();
    }
    if let Some(err) = err.downcast_ref::<ResolveError>() {
        return err.temporary;
    }
    err.is::<tokio::time::error::Elapsed>()
}

/// Returns `true` for 408 Request Timeout, 429 Too Many Requests and every
/// 5xx status. Other client errors are permanent: repeating them yields the
/// same answer.
pub fn is_retryable_status(status: StatusCode) -> bool {
    is_retryable_status_code(i64::from(status.as_u16()))
}

/// Same as [`is_retryable_status`] for raw codes, including values that are
/// not valid HTTP statuses.
pub fn is_retryable_status_code(code: i64) -> bool {
    matches!(code, 408 | 429 | 500..=599)
}
