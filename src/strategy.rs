//! Request classification and synthesized fallback responses.

use reqwest::{Method, StatusCode};

use crate::http::{Request, RequestMode, Response};

/// Inline SVG served in place of images that cannot be fetched or found.
pub const OFFLINE_PLACEHOLDER_SVG: &str = concat!(
    "<svg xmlns='http://www.w3.org/2000/svg' width='400' height='300'>",
    "<rect width='100%' height='100%' fill='#0b1220'/>",
    "<text x='50%' y='50%' fill='#ffd85a' font-size='20' text-anchor='middle' ",
    "alignment-baseline='middle'>Offline</text>",
    "</svg>"
);

/// How the controller treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Not intercepted; goes to the network untouched.
    Passthrough,
    /// Page load: network-first.
    Navigation,
    /// Any other GET: cache-first.
    Asset,
}

impl RequestClass {
    /// Classifies a request.
    ///
    /// Only GET is intercepted. A request is a navigation if its mode says so
    /// or if it accepts HTML.
    #[must_use]
    pub fn of(request: &Request) -> Self {
        if request.method != Method::GET {
            Self::Passthrough
        } else if request.mode == RequestMode::Navigate || request.accept().contains("text/html") {
            Self::Navigation
        } else {
            Self::Asset
        }
    }
}

/// Returns true if the request would accept an image.
#[must_use]
pub fn accepts_image(request: &Request) -> bool {
    request.accept().contains("image")
}

/// Builds the "Offline" placeholder image.
#[must_use]
pub fn offline_placeholder() -> Response {
    Response::ok(OFFLINE_PLACEHOLDER_SVG).with_content_type("image/svg+xml")
}

/// Builds the last-resort response when no cached document is available.
#[must_use]
pub fn offline_unavailable() -> Response {
    Response::new(StatusCode::SERVICE_UNAVAILABLE, "Offline")
        .with_content_type("text/plain; charset=utf-8")
}
