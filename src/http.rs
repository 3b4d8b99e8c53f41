//! Request and response model shared by the controller, stores and hosts.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the request was initiated, mirroring the fetch `mode` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    /// Same-origin subresource.
    #[default]
    SameOrigin,
    /// Cross-origin request with CORS.
    Cors,
    /// Cross-origin request without CORS; yields an opaque response.
    NoCors,
}

impl RequestMode {
    /// Parses a `Sec-Fetch-Mode` header value.
    #[must_use]
    pub fn from_fetch_mode(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(Self::Navigate),
            "same-origin" => Some(Self::SameOrigin),
            "cors" => Some(Self::Cors),
            "no-cors" => Some(Self::NoCors),
            _ => None,
        }
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: Url,
    /// Fetch mode.
    pub mode: RequestMode,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body, empty for GET.
    pub body: Bytes,
}

impl Request {
    /// Creates a same-origin GET request for `url`.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::SameOrigin,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a navigation request for `url`.
    #[must_use]
    pub fn navigate(url: Url) -> Self {
        Self::get(url)
            .with_mode(RequestMode::Navigate)
            .with_header(ACCEPT, HeaderValue::from_static("text/html"))
    }

    /// Sets the request method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the fetch mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Adds or replaces a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the `Accept` header.
    ///
    /// # Errors
    ///
    /// Returns an error if `accept` is not a valid header value.
    pub fn with_accept(self, accept: &str) -> Result<Self> {
        let value = HeaderValue::from_str(accept)
            .map_err(|e| Error::Network(format!("invalid Accept header: {e}")))?;
        Ok(self.with_header(ACCEPT, value))
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the `Accept` header, or an empty string when absent.
    #[must_use]
    pub fn accept(&self) -> &str {
        self.headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Returns the cache identity of this request.
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), &self.url)
    }
}

/// Cache identity of a request: method plus URL without its fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    /// Builds a key, dropping any URL fragment.
    #[must_use]
    pub fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.into(),
        }
    }

    /// Builds a GET key for `url`.
    #[must_use]
    pub fn get(url: &Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Returns the method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the normalized URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Response type, mirroring the fetch `Response.type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response readable through CORS.
    Cors,
    /// Cross-origin `no-cors` response; status and body are hidden.
    Opaque,
}

/// A captured or synthesized response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
    /// Response type.
    pub kind: ResponseType,
}

impl Response {
    /// Creates a basic response with the given status and body.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            kind: ResponseType::Basic,
        }
    }

    /// Creates a `200 OK` response.
    #[must_use]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Creates the opaque response a `no-cors` cross-origin fetch yields.
    #[must_use]
    pub fn opaque() -> Self {
        Self {
            // Opaque responses report status 0, which `StatusCode` cannot hold.
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            kind: ResponseType::Opaque,
        }
    }

    /// Sets the `Content-Type` header.
    #[must_use]
    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self
    }

    /// Sets the response type.
    #[must_use]
    pub const fn with_kind(mut self, kind: ResponseType) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the `Content-Type` header, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Returns true for a plain (non-opaque) `200 OK` response.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK && self.kind != ResponseType::Opaque
    }

    /// Returns the body as UTF-8 text, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Resolves `path` against `base`, the way a page resolves `./index.html`.
///
/// # Errors
///
/// Returns a configuration error if the joined URL is invalid.
pub fn resolve(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| Error::Config(format!("cannot resolve {path} against {base}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn key_strips_fragment() {
        let a = RequestKey::get(&url("https://example.com/app/index.html#top"));
        let b = RequestKey::get(&url("https://example.com/app/index.html"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "GET https://example.com/app/index.html");
    }

    #[test]
    fn key_keeps_query_and_method() {
        let get = RequestKey::get(&url("https://example.com/a?v=2"));
        let head = RequestKey::new(Method::HEAD, &url("https://example.com/a?v=2"));
        assert_ne!(get, head);
        assert_eq!(get.url(), "https://example.com/a?v=2");
        assert_eq!(head.method(), "HEAD");
    }

    #[test]
    fn resolve_relative_assets() {
        let scope = url("https://example.com/clicker/");
        assert_eq!(
            resolve(&scope, "./style.css").unwrap().as_str(),
            "https://example.com/clicker/style.css"
        );
        assert_eq!(
            resolve(&scope, "./").unwrap().as_str(),
            "https://example.com/clicker/"
        );
    }

    #[test]
    fn accept_defaults_to_empty() {
        let req = Request::get(url("https://example.com/"));
        assert_eq!(req.accept(), "");
        let req = req.with_accept("image/avif,image/*").unwrap();
        assert_eq!(req.accept(), "image/avif,image/*");
    }

    #[test]
    fn navigate_sets_mode_and_accept() {
        let req = Request::navigate(url("https://example.com/"));
        assert_eq!(req.mode, RequestMode::Navigate);
        assert!(req.accept().contains("text/html"));
    }

    #[test]
    fn fetch_mode_parsing() {
        assert_eq!(RequestMode::from_fetch_mode("navigate"), Some(RequestMode::Navigate));
        assert_eq!(RequestMode::from_fetch_mode("NO-CORS"), Some(RequestMode::NoCors));
        assert_eq!(RequestMode::from_fetch_mode("websocket"), None);
    }

    #[test]
    fn cacheable_requires_plain_200() {
        assert!(Response::ok("x").is_cacheable());
        assert!(!Response::new(StatusCode::NOT_FOUND, "x").is_cacheable());
        assert!(!Response::opaque().is_cacheable());
        assert!(!Response::new(StatusCode::NO_CONTENT, "").is_cacheable());
    }

    proptest! {
        #[test]
        fn fragment_never_changes_key(path in "[a-z]{1,12}", frag in "[a-z0-9]{0,12}") {
            let base = format!("https://example.com/{path}");
            let with_frag = url(&format!("{base}#{frag}"));
            prop_assert_eq!(RequestKey::get(&with_frag), RequestKey::get(&url(&base)));
        }
    }
}
