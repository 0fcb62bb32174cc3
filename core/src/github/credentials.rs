//! GitHub credential resolution
//!
//! In App mode, installation tokens are cached per `owner/repo` and renewed
//! once half of their lifetime has passed. Each key owns a slot guarded by an
//! async mutex, so concurrent misses for the same repository wait on a single
//! exchange instead of each minting a token.

use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::auth::{self, PemJwtSigner};
use crate::config::GitHubAuth;
use crate::error::{ApiError, Result};
use crate::platform::{Clock, HttpClient, JwtSigner};

struct CachedCredential {
    token: SecretString,
    renew_at: u64,
    expires_at: u64,
}

type CredentialSlot = Arc<Mutex<Option<CachedCredential>>>;

/// Resolves the credential used for calls against a target repository
pub enum CredentialResolver {
    /// A configured token used for every repository
    Static(SecretString),
    /// GitHub App installation tokens, cached per repository
    App(AppCredentials),
}

pub struct AppCredentials {
    signer: Arc<dyn JwtSigner>,
    api_base: String,
    slots: Cache<String, CredentialSlot>,
}

impl CredentialResolver {
    pub fn from_auth(auth: GitHubAuth, api_base: &str, capacity: u64) -> Self {
        match auth {
            GitHubAuth::Token(token) => Self::Static(token),
            GitHubAuth::App { app_id, private_key } => Self::app(
                Arc::new(PemJwtSigner {
                    app_id,
                    pem_key: private_key,
                }),
                api_base,
                capacity,
            ),
        }
    }

    pub fn app(signer: Arc<dyn JwtSigner>, api_base: &str, capacity: u64) -> Self {
        Self::App(AppCredentials {
            signer,
            api_base: api_base.to_string(),
            slots: Cache::builder().max_capacity(capacity).build(),
        })
    }

    /// Resolve a token able to act on `owner/repo`
    pub async fn resolve(
        &self,
        owner: &str,
        repo: &str,
        http: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> Result<SecretString> {
        match self {
            Self::Static(token) => Ok(SecretString::from(token.expose_secret().to_string())),
            Self::App(app) => app.resolve(owner, repo, http, clock).await,
        }
    }
}

impl AppCredentials {
    async fn resolve(
        &self,
        owner: &str,
        repo: &str,
        http: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> Result<SecretString> {
        let key = format!("{}/{}", owner, repo);
        let slot = self
            .slots
            .get_with(key.clone(), async { Arc::new(Mutex::new(None)) })
            .await;

        // Held across the exchange so later arrivals reuse its result
        let mut cached = slot.lock().await;

        let now = clock.now_secs();
        if let Some(credential) = cached.as_ref() {
            if now < credential.renew_at {
                tracing::debug!(repository = %key, "using cached installation token");
                return Ok(SecretString::from(credential.token.expose_secret().to_string()));
            }
        }

        let credential = self.exchange(owner, repo, http, clock).await?;
        tracing::info!(
            repository = %key,
            renew_at = credential.renew_at,
            expires_at = credential.expires_at,
            "minted installation token"
        );

        let token = SecretString::from(credential.token.expose_secret().to_string());
        *cached = Some(credential);
        Ok(token)
    }

    async fn exchange(
        &self,
        owner: &str,
        repo: &str,
        http: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> Result<CachedCredential> {
        let signer = self.signer.as_ref();
        let installation_id =
            auth::get_repo_installation_id(owner, repo, &self.api_base, signer, http, clock).await?;
        let issued_at = clock.now_secs();
        let installation_token =
            auth::create_installation_token(installation_id, &self.api_base, signer, http, clock).await?;

        let expires_at = chrono::DateTime::parse_from_rfc3339(&installation_token.expires_at)
            .map_err(|e| {
                ApiError::credential(format!(
                    "invalid token expiry '{}': {}",
                    installation_token.expires_at, e
                ))
            })?
            .timestamp()
            .max(0) as u64;

        Ok(CachedCredential {
            token: installation_token.token,
            renew_at: renewal_deadline(issued_at, expires_at),
            expires_at,
        })
    }
}

/// Midpoint between issuance and expiry
fn renewal_deadline(issued_at: u64, expires_at: u64) -> u64 {
    issued_at + expires_at.saturating_sub(issued_at) / 2
}
