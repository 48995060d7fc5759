use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{error::BoxError, ClientOptions, Error, Request, Response, Result};

/// Sends one request and returns what the server answered.
///
/// Implementations must not retry on their own; a non-success status is a
/// normal `Ok` response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> std::result::Result<Response, BoxError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> std::result::Result<Response, BoxError> {
        (**self).send(request).await
    }
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Builds the underlying client from the connection and timeout settings
    /// in `opts`.
    pub fn from_options(opts: &ClientOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(opts.request_timeout_ms))
            .connect_timeout(Duration::from_millis(opts.dialer_timeout_ms))
            .tcp_keepalive(Duration::from_millis(opts.dialer_keep_alive_ms))
            .pool_idle_timeout(Duration::from_millis(opts.transport_idle_timeout_ms))
            .pool_max_idle_per_host(opts.transport_max_idle_connections)
            .user_agent(opts.user_agent.as_str())
            .build()
            .map_err(|err| Error::Build(format!("failed to build HTTP client: {err}")))?;
        Ok(Self::new(http))
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.http
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> std::result::Result<Response, BoxError> {
        let response = self.http.execute(request.into_reqwest()).await?;
        Ok(Response::from(response))
    }
}
