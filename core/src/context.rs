//! Process-wide application context
//!
//! Built once at startup and shared by every request. Holds the read-only
//! policy engine, the lazily discovered issuer key set and the credential
//! cache.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::{Config, InputValidation};
use crate::error::Result;
use crate::github::CredentialResolver;
use crate::oidc::RemoteKeySet;
use crate::platform::{Clock, HttpClient};
use crate::policy::PolicyEngine;

pub struct AppContext {
    pub gh_issuer: String,
    pub id_token_audience: String,
    pub gh_api_url: String,
    pub policy_config: HashMap<String, String>,
    pub policy_input_validation: InputValidation,
    pub policy: PolicyEngine,
    pub credentials: CredentialResolver,
    pub http: Arc<dyn HttpClient>,
    pub clock: Arc<dyn Clock>,
    key_set: OnceCell<RemoteKeySet>,
}

impl AppContext {
    /// Build the context, loading the configured policy
    ///
    /// Fails with a configuration error if the policy source is unusable.
    pub fn new(config: Config, http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Result<Self> {
        let policy = PolicyEngine::from_source(&config.policy)?;
        let credentials = CredentialResolver::from_auth(
            config.github_auth,
            &config.gh_api_url,
            config.credential_cache_capacity,
        );

        Ok(Self {
            gh_issuer: config.gh_issuer,
            id_token_audience: config.id_token_audience,
            gh_api_url: config.gh_api_url,
            policy_config: config.policy_config,
            policy_input_validation: config.policy_input_validation,
            policy,
            credentials,
            http,
            clock,
            key_set: OnceCell::new(),
        })
    }

    /// The issuer key set, discovered on first use
    ///
    /// Concurrent first callers wait on a single discovery; a failed
    /// discovery leaves the cell empty so the next request retries.
    pub async fn key_set(&self) -> Result<&RemoteKeySet> {
        self.key_set
            .get_or_try_init(|| async {
                tracing::info!(issuer = %self.gh_issuer, "discovering identity token issuer");
                RemoteKeySet::discover(&self.gh_issuer, self.http.as_ref(), self.clock.as_ref()).await
            })
            .await
    }
}
