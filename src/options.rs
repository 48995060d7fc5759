use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ExponentialBackoff;

const ENV_PREFIX: &str = "RESILIENT_HTTP_";

/// Configures the HTTP transport, timeouts and retry behavior.
///
/// Every field has a default, so partial JSON/TOML documents deserialize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Maximum number of retries after the initial attempt. `0` disables
    /// retries.
    pub request_retry_count: u32,
    /// Per-attempt timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Delay before the first retry, in milliseconds.
    pub backoff_initial_timeout_ms: u64,
    /// Upper bound of the exponential delay, in milliseconds.
    pub backoff_max_timeout_ms: u64,
    /// Growth factor between consecutive retries.
    pub backoff_exponent_factor: f64,
    /// Maximum random jitter added to each delay, in milliseconds.
    pub backoff_max_jitter_ms: u64,
    /// TCP connect timeout in milliseconds.
    pub dialer_timeout_ms: u64,
    /// TCP keep-alive interval in milliseconds.
    pub dialer_keep_alive_ms: u64,
    /// How long idle pooled connections are kept, in milliseconds.
    pub transport_idle_timeout_ms: u64,
    /// Maximum idle pooled connections per host.
    pub transport_max_idle_connections: usize,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_retry_count: 2,
            request_timeout_ms: 10_000,
            backoff_initial_timeout_ms: 2,
            backoff_max_timeout_ms: 10,
            backoff_exponent_factor: 2.0,
            backoff_max_jitter_ms: 2,
            dialer_timeout_ms: 5_000,
            dialer_keep_alive_ms: 20_000,
            transport_idle_timeout_ms: 20_000,
            transport_max_idle_connections: 10,
            user_agent: concat!("resilient-http/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl ClientOptions {
    /// Default options overridden by `RESILIENT_HTTP_*` environment variables,
    /// e.g. `RESILIENT_HTTP_REQUEST_RETRY_COUNT=5`.
    ///
    /// Returns an error naming the variable when a value does not parse.
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();
        let var = |field: &str| {
            let name = format!("{ENV_PREFIX}{}", field.to_ascii_uppercase());
            lookup(&name).map(|value| (name, value))
        };

        override_from(&var("request_retry_count"), &mut opts.request_retry_count)?;
        override_from(&var("request_timeout_ms"), &mut opts.request_timeout_ms)?;
        override_from(
            &var("backoff_initial_timeout_ms"),
            &mut opts.backoff_initial_timeout_ms,
        )?;
        override_from(
            &var("backoff_max_timeout_ms"),
            &mut opts.backoff_max_timeout_ms,
        )?;
        override_from(
            &var("backoff_exponent_factor"),
            &mut opts.backoff_exponent_factor,
        )?;
        override_from(&var("backoff_max_jitter_ms"), &mut opts.backoff_max_jitter_ms)?;
        override_from(&var("dialer_timeout_ms"), &mut opts.dialer_timeout_ms)?;
        override_from(&var("dialer_keep_alive_ms"), &mut opts.dialer_keep_alive_ms)?;
        override_from(
            &var("transport_idle_timeout_ms"),
            &mut opts.transport_idle_timeout_ms,
        )?;
        override_from(
            &var("transport_max_idle_connections"),
            &mut opts.transport_max_idle_connections,
        )?;
        if let Some((_, value)) = var("user_agent") {
            if !value.trim().is_empty() {
                opts.user_agent = value;
            }
        }

        Ok(opts)
    }

    /// Backoff strategy described by these options.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.backoff_initial_timeout_ms),
            Duration::from_millis(self.backoff_max_timeout_ms),
            self.backoff_exponent_factor,
            Duration::from_millis(self.backoff_max_jitter_ms),
        )
    }
}

fn override_from<T: FromStr>(
    var: &Option<(String, String)>,
    target: &mut T,
) -> std::result::Result<(), String>
where
    T::Err: std::fmt::Display,
{
    if let Some((name, value)) = var {
        *target = value
            .trim()
            .parse()
            .map_err(|err| format!("{name} has invalid value {value:?}: {err}"))?;
    }
    Ok(())
}
