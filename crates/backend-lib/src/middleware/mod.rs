// crates/backend-lib/src/middleware/mod.rs

//! Request middleware: session resolution and rate limiting.

pub mod auth;
pub mod rate_limit;

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{request::Parts, Extensions, HeaderMap};

pub use auth::{authenticate, AuthState, CurrentSession};
pub use rate_limit::{rate_limit, RateLimiter};

/// Best guess at the calling client, used to key rate limits
pub fn client_key(headers: &HeaderMap, extensions: &Extensions) -> String {
    let forwarded = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|list| list.split(',').next())
        })
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match forwarded {
        Some(ip) => ip.to_string(),
        None => extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

/// Extractor form of [`client_key`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl<St: Send + Sync> FromRequestParts<St> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        Ok(ClientKey(client_key(&parts.headers, &parts.extensions)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_key_sources() {
        let mut headers = HeaderMap::new();
        let mut extensions = Extensions::new();
        assert_eq!(client_key(&headers, &extensions), "unknown");

        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 4000))));
        assert_eq!(client_key(&headers, &extensions), "192.0.2.7");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.1, 10.0.0.1"),
        );
        assert_eq!(client_key(&headers, &extensions), "198.51.100.1");

        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_key(&headers, &extensions), "203.0.113.9");
    }
}
