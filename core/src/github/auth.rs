//! GitHub App authentication
//!
//! Generates App JWTs, finds the installation covering a repository and
//! exchanges the App JWT for an installation token.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::github_headers;
use crate::error::{ApiError, Result};
use crate::platform::{Clock, HttpClient, JwtSigner};

/// GitHub App JWT claims
#[derive(Serialize, Deserialize)]
struct AppJwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Installation token response from GitHub
#[derive(Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Deserialize)]
struct InstallationResponse {
    id: u64,
}

/// Short-lived token scoped to one App installation
pub struct InstallationToken {
    pub token: SecretString,
    /// RFC 3339 expiry as reported by GitHub
    pub expires_at: String,
}

/// JWT signer that uses a local PEM private key
pub struct PemJwtSigner {
    pub app_id: String,
    pub pem_key: SecretString,
}

#[async_trait]
impl JwtSigner for PemJwtSigner {
    async fn sign_app_jwt(&self, now_secs: i64) -> Result<String> {
        use surrealdb_jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

        let iat = now_secs - 60;
        let exp = now_secs + 600;

        let claims = AppJwtClaims {
            iat,
            exp,
            iss: self.app_id.clone(),
        };

        let key = EncodingKey::from_rsa_pem(self.pem_key.expose_secret().as_bytes())
            .map_err(|e| ApiError::credential(format!("invalid private key: {}", e)))?;

        let header = Header::new(Algorithm::RS256);

        encode(&header, &claims, &key)
            .map_err(|e| ApiError::credential(format!("failed to encode JWT: {}", e)))
    }
}

/// Get the ID of the App installation covering `owner/repo`
pub async fn get_repo_installation_id(
    owner: &str,
    repo: &str,
    api_base: &str,
    signer: &dyn JwtSigner,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<u64> {
    let app_jwt = signer.sign_app_jwt(clock.now_secs() as i64).await?;

    let url = format!("{}/repos/{}/{}/installation", api_base, owner, repo);
    let auth_header = format!("Bearer {}", app_jwt);
    let headers = github_headers(&auth_header);

    let response = http
        .get(&url, &headers)
        .await
        .map_err(|e| ApiError::credential(format!("failed to call GitHub API: {}", e)))?;

    match response.status {
        200 => {}
        404 => {
            return Err(ApiError::credential(format!(
                "GitHub App not installed for '{}/{}'",
                owner, repo
            )))
        }
        status => {
            return Err(ApiError::credential(format!(
                "installation lookup failed: {}",
                status
            )))
        }
    }

    let installation: InstallationResponse = response
        .json()
        .map_err(|e| ApiError::credential(format!("failed to parse response: {}", e)))?;

    Ok(installation.id)
}

/// Exchange the App JWT for an installation token
pub async fn create_installation_token(
    installation_id: u64,
    api_base: &str,
    signer: &dyn JwtSigner,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<InstallationToken> {
    let app_jwt = signer.sign_app_jwt(clock.now_secs() as i64).await?;

    let url = format!("{}/app/installations/{}/access_tokens", api_base, installation_id);
    let auth_header = format!("Bearer {}", app_jwt);
    let headers = github_headers(&auth_header);

    let response = http
        .post(&url, &headers, b"{}")
        .await
        .map_err(|e| ApiError::credential(format!("failed to call GitHub API: {}", e)))?;

    if response.status != 201 {
        let error_body = response.text().unwrap_or_else(|_| "unknown error".to_string());
        tracing::debug!(status = response.status, body = %error_body, "installation token exchange rejected");
        return Err(ApiError::credential(format!(
            "installation token exchange failed: {}",
            response.status
        )));
    }

    let token_response: InstallationTokenResponse = response
        .json()
        .map_err(|e| ApiError::credential(format!("failed to parse response: {}", e)))?;

    Ok(InstallationToken {
        token: SecretString::from(token_response.token),
        expires_at: token_response.expires_at,
    })
}
