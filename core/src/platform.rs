//! Platform abstraction traits
//!
//! These traits define the boundary between the dispatch pipeline and the
//! process hosting it (outbound HTTP, wall clock, environment lookups and App
//! JWT signing). The server crate provides the production implementations.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// HTTP client for outbound requests (GitHub API, OIDC discovery, JWKS)
///
/// Implementations must bound every request with a timeout.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse>;
    async fn post(&self, url: &str, headers: &[(&str, &str)], body: &[u8]) -> Result<HttpResponse>;
}

/// HTTP response from an outbound request
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Parse body as UTF-8 string
    pub fn text(&self) -> std::result::Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }

    /// Parse body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Clock for current time (enables testing with deterministic timestamps)
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Environment/secrets access
pub trait Environment {
    fn get_var(&self, name: &str) -> Option<String>;
}

/// Signs short-lived GitHub App JWTs
#[async_trait]
pub trait JwtSigner: Send + Sync {
    async fn sign_app_jwt(&self, now_secs: i64) -> Result<String>;
}
