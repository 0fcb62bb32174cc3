//! JWKS (JSON Web Key Set) handling
//!
//! Fetches and caches the issuer's signing keys for identity token validation.

use std::sync::RwLock;
use surrealdb_jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::discovery::fetch_discovery;
use crate::error::{ApiError, Result};
use crate::platform::{Clock, HttpClient};

/// Minimum seconds between two refetches triggered by unknown key IDs
const REFRESH_COOLDOWN_SECS: u64 = 30;

/// Fetch JWKS from a URI
pub async fn fetch_jwks(jwks_uri: &str, http: &dyn HttpClient) -> Result<JwkSet> {
    let response = http
        .get(
            jwks_uri,
            &[
                ("Accept", "application/json"),
                ("User-Agent", super::USER_AGENT),
            ],
        )
        .await
        .map_err(|e| ApiError::discovery(format!("failed to fetch JWKS: {}", e)))?;

    if response.status != 200 {
        return Err(ApiError::discovery(format!(
            "failed to fetch JWKS: HTTP {}",
            response.status
        )));
    }

    response
        .json()
        .map_err(|e| ApiError::discovery(format!("invalid JWKS: {}", e)))
}

struct CachedKeys {
    jwks: JwkSet,
    fetched_at: u64,
}

/// Signing keys of one issuer, fetched on creation and refreshed when a token
/// references a key ID the cached set does not know.
pub struct RemoteKeySet {
    issuer: String,
    jwks_uri: String,
    keys: RwLock<CachedKeys>,
    refresh: Mutex<()>,
}

impl std::fmt::Debug for RemoteKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteKeySet")
            .field("issuer", &self.issuer)
            .field("jwks_uri", &self.jwks_uri)
            .finish_non_exhaustive()
    }
}

impl RemoteKeySet {
    /// Discover the issuer's metadata and load its current key set
    pub async fn discover(issuer: &str, http: &dyn HttpClient, clock: &dyn Clock) -> Result<Self> {
        let discovery = fetch_discovery(issuer, http).await?;
        let jwks_uri = discovery
            .jwks_uri
            .ok_or_else(|| ApiError::discovery("discovery document has no jwks_uri"))?;

        let jwks = fetch_jwks(&jwks_uri, http).await?;
        info!(issuer = %discovery.issuer, keys = jwks.keys.len(), "loaded issuer signing keys");

        Ok(Self {
            issuer: discovery.issuer,
            jwks_uri,
            keys: RwLock::new(CachedKeys {
                jwks,
                fetched_at: clock.now_secs(),
            }),
            refresh: Mutex::new(()),
        })
    }

    /// Issuer as reported by its discovery document
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Find the key for `kid`, refetching the set at most once per cooldown
    pub async fn find_key(&self, kid: &str, http: &dyn HttpClient, clock: &dyn Clock) -> Result<Jwk> {
        if let Some(jwk) = self.cached(kid) {
            return Ok(jwk);
        }

        let _guard = self.refresh.lock().await;

        // Another request may have refreshed while we waited
        if let Some(jwk) = self.cached(kid) {
            return Ok(jwk);
        }

        let now = clock.now_secs();
        if now < self.fetched_at() + REFRESH_COOLDOWN_SECS {
            return Err(ApiError::invalid_token(format!("key '{}' not found in JWKS", kid)));
        }

        debug!(kid = %kid, "unknown key id, refreshing JWKS");
        let jwks = fetch_jwks(&self.jwks_uri, http)
            .await
            .map_err(|e| ApiError::invalid_token(format!("JWKS refresh failed: {}", e)))?;
        let found = jwks.find(kid).cloned();

        if let Ok(mut keys) = self.keys.write() {
            *keys = CachedKeys { jwks, fetched_at: now };
        }

        found.ok_or_else(|| ApiError::invalid_token(format!("key '{}' not found in JWKS", kid)))
    }

    fn cached(&self, kid: &str) -> Option<Jwk> {
        self.keys.read().ok()?.jwks.find(kid).cloned()
    }

    fn fetched_at(&self) -> u64 {
        self.keys.read().map(|k| k.fetched_at).unwrap_or(0)
    }
}
