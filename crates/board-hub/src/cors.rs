//! Browser origin policy.

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Whether `origin` starts with one of `prefixes`.
pub fn origin_allowed(origin: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| origin.starts_with(p.as_str()))
}

/// CORS layer admitting origins by prefix, e.g. `http://localhost:` for any
/// local dev server port.
pub fn cors_layer(prefixes: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|origin| origin_allowed(origin, &prefixes))
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}
