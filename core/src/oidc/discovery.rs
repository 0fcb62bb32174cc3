//! OIDC Discovery document fetching
//!
//! Fetches and parses OpenID Connect discovery documents.

use serde::Deserialize;

use crate::error::{ApiError, Result};
use crate::platform::HttpClient;

/// OIDC Discovery document (partial)
#[derive(Debug, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    #[serde(default)]
    pub jwks_uri: Option<String>,
}

/// Fetch OIDC discovery document for an issuer
pub async fn fetch_discovery(issuer: &str, http: &dyn HttpClient) -> Result<DiscoveryDocument> {
    validate_issuer_url(issuer)?;

    let discovery_url = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));

    let response = http
        .get(
            &discovery_url,
            &[
                ("Accept", "application/json"),
                ("User-Agent", super::USER_AGENT),
            ],
        )
        .await
        .map_err(|e| ApiError::discovery(format!("failed to fetch discovery document: {}", e)))?;

    if response.status != 200 {
        return Err(ApiError::discovery(format!(
            "failed to fetch discovery document: HTTP {}",
            response.status
        )));
    }

    let doc: DiscoveryDocument = response
        .json()
        .map_err(|e| ApiError::discovery(format!("invalid discovery document: {}", e)))?;

    if doc.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
        return Err(ApiError::discovery(format!(
            "issuer mismatch: expected '{}', got '{}'",
            issuer, doc.issuer
        )));
    }

    match doc.jwks_uri.as_deref() {
        None | Some("") => Err(ApiError::discovery("discovery document has no jwks_uri")),
        Some(_) => Ok(doc),
    }
}

/// Validate issuer URL format per RFC 8414 and OpenID Connect Core 1.0
fn validate_issuer_url(issuer: &str) -> Result<()> {
    let url = url::Url::parse(issuer).map_err(|_| ApiError::discovery("invalid issuer URL"))?;

    let is_localhost = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"));
    if url.scheme() != "https" && !is_localhost {
        return Err(ApiError::discovery("issuer must use HTTPS"));
    }

    if url.query().is_some() {
        return Err(ApiError::discovery("issuer URL must not have query string"));
    }

    if url.fragment().is_some() {
        return Err(ApiError::discovery("issuer URL must not have fragment"));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(ApiError::discovery("issuer URL must not have userinfo"));
    }

    Ok(())
}
