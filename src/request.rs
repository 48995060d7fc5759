use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Body, Method, Url};
use serde::Serialize;

use crate::{error::BoxError, Error, Result};

/// Produces a fresh request body for every attempt that needs one.
pub type BodyFactory = Arc<dyn Fn() -> std::result::Result<Body, BoxError> + Send + Sync>;

/// Request handed to [`crate::ResilientClient::execute`] and, one attempt at a
/// time, to a [`crate::Transport`].
///
/// Bodies set through [`Request::bytes`], [`Request::json`] or
/// [`Request::body_with`] can be replayed on retries. A body set through
/// [`Request::stream`] is read once; such a request can only be attempted a
/// single time.
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Body>,
    replay: Option<BodyFactory>,
    body_sent: bool,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .field("replayable", &self.replay.is_some())
            .finish()
    }
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            replay: None,
            body_sent: false,
        }
    }

    /// Parses `url` and creates a request for it.
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|err| Error::Build(format!("invalid url {url:?}: {err}")))?;
        Ok(Self::new(method, url))
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::parse(Method::GET, url)
    }

    pub fn post(url: &str) -> Result<Self> {
        Self::parse(Method::POST, url)
    }

    /// Sets a header, replacing any previous value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header from string parts.
    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| Error::Build(format!("invalid header name {name:?}: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| Error::Build(format!("invalid value for header {name}: {err}")))?;
        Ok(self.header(name, value))
    }

    /// Attaches an in-memory body that is re-sent on every retry.
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        self.body = Some(Body::from(body.clone()));
        self.replay = Some(Arc::new(move || Ok::<_, BoxError>(Body::from(body.clone()))));
        self
    }

    /// Serialises `value` as the JSON body and sets `Content-Type`.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|err| Error::Build(format!("failed to serialise JSON body: {err}")))?;
        Ok(self
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .bytes(body))
    }

    /// Attaches a body that can only be read once. The request is not retried
    /// past its first attempt.
    pub fn stream(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self.replay = None;
        self
    }

    /// Attaches a body produced by `factory`, which is called again for every
    /// retry.
    pub fn body_with<F>(mut self, factory: F) -> Result<Self>
    where
        F: Fn() -> std::result::Result<Body, BoxError> + Send + Sync + 'static,
    {
        self.body = Some(factory().map_err(Error::BodyReproduction)?);
        self.replay = Some(Arc::new(factory));
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Body contents when the body is held in memory.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_ref().and_then(Body::as_bytes)
    }

    /// Whether the body can be reproduced for a retry. Requests without a
    /// body are always replayable.
    pub fn is_replayable(&self) -> bool {
        self.replay.is_some() || (self.body.is_none() && !self.body_sent)
    }

    /// Builds the request for `attempt`.
    ///
    /// Attempt 0 carries the original body. Later attempts carry a fresh body
    /// from the replay factory; a factory failure, or a one-shot body that was
    /// already sent, ends the call.
    pub(crate) fn prepare(&mut self, attempt: u32) -> Result<Request> {
        let body = if attempt == 0 {
            let body = self.body.take();
            self.body_sent = body.is_some();
            body
        } else if let Some(replay) = &self.replay {
            Some(replay().map_err(Error::BodyReproduction)?)
        } else if self.body_sent {
            return Err(Error::BodyNotReplayable { attempt });
        } else {
            None
        };

        Ok(Request {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
            replay: self.replay.clone(),
            body_sent: false,
        })
    }

    /// Converts into a `reqwest` request, consuming the body.
    pub fn into_reqwest(self) -> reqwest::Request {
        let mut request = reqwest::Request::new(self.method, self.url);
        *request.headers_mut() = self.headers;
        *request.body_mut() = self.body;
        request
    }
}
