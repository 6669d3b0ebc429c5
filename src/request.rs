//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::error::Error;

/// An incoming HTTP request with its body fully buffered.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    /// A body-less request, mostly useful for driving an
    /// [`App`](crate::App) without a socket.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
        }
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Buffers at most `limit` body bytes.
    pub(crate) async fn from_hyper<B>(req: hyper::Request<B>, limit: usize) -> Result<Self, Error>
    where
        B: hyper::body::Body,
        B::Error: Into<crate::error::BoxError>,
    {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => return Err(Error::PayloadTooLarge { limit }),
            Err(e) => return Err(Error::Body(e)),
        };
        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            headers: parts.headers,
            body,
            params: HashMap::new(),
        })
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::Full;

    use super::*;

    fn hyper_request(body: &'static str) -> hyper::Request<Full<Bytes>> {
        hyper::Request::post("/todos?page=2").body(Full::new(Bytes::from(body))).unwrap()
    }

    #[tokio::test]
    async fn bodies_within_the_limit_are_buffered() {
        let req = Request::from_hyper(hyper_request("buy milk"), 8).await.unwrap();
        assert_eq!(req.path(), "/todos");
        assert_eq!(req.body(), b"buy milk");
    }

    #[tokio::test]
    async fn bodies_over_the_limit_are_rejected() {
        let err = Request::from_hyper(hyper_request("buy milk"), 4).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 4 }), "{err}");
    }

    #[test]
    fn builder_sets_headers_and_body() {
        let req = Request::new(Method::POST, "/todos")
            .with_header("Content-Type", "text/plain")
            .with_header("bad header", "ignored")
            .with_body("buy milk");
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.body(), b"buy milk");
        assert_eq!(req.param("id"), None);
    }
}
