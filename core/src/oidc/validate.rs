//! Identity token validation
//!
//! Verifies identity token signatures against the issuer's key set and checks
//! issuer, audience and time claims.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use surrealdb_jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};

use super::jwks::RemoteKeySet;
use crate::error::{ApiError, Result};
use crate::platform::{Clock, HttpClient};

/// Tolerated clock skew for `nbf` and `iat`
const CLOCK_SKEW_SECS: u64 = 60;

/// Claims of a verified identity token
///
/// Deserializing a payload does not authenticate it. Claims that come from a
/// caller must go through [`verify`] first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer
    pub iss: String,

    /// Subject
    #[serde(default)]
    pub sub: String,

    /// Audience (can be string or array)
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    /// Expiration time
    pub exp: u64,

    /// Issued at
    #[serde(default)]
    pub iat: Option<u64>,

    /// Not before (optional)
    #[serde(default)]
    pub nbf: Option<u64>,

    /// GitHub Actions claims (repository, ref, workflow, run metadata, ...)
    #[serde(flatten)]
    pub custom_claims: HashMap<String, serde_json::Value>,
}

/// Who is calling, as asserted by the identity token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub owner: String,
    pub repository: String,
    pub git_ref: String,
    pub workflow: String,
}

impl IdTokenClaims {
    /// String value of a custom claim
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.custom_claims.get(name).and_then(|v| v.as_str())
    }

    /// Derive the caller identity from the verified claims
    pub fn caller(&self) -> Result<CallerIdentity> {
        let required = |name: &str| {
            self.claim(name)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ApiError::invalid_token(format!("token missing '{}' claim", name)))
        };

        let owner = required("repository_owner")?;
        let full_name = required("repository")?;
        let repository = match full_name.split_once('/') {
            Some((_, name)) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(ApiError::invalid_token(format!(
                    "repository claim '{}' is not in owner/name form",
                    full_name
                )))
            }
        };

        Ok(CallerIdentity {
            owner,
            repository,
            git_ref: required("ref")?,
            workflow: required("workflow")?,
        })
    }
}

/// Deserialize audience as either string or array
fn deserialize_audience<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct AudienceVisitor;

    impl<'de> Visitor<'de> for AudienceVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("string or array of strings")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Vec<String>, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Vec<String>, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut values = Vec::new();
            while let Some(value) = seq.next_element()? {
                values.push(value);
            }
            Ok(values)
        }
    }

    deserializer.deserialize_any(AudienceVisitor)
}

/// Verify an identity token and return its claims
pub async fn verify(
    token: &str,
    key_set: &RemoteKeySet,
    expected_issuer: &str,
    expected_audience: &str,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<IdTokenClaims> {
    let header = decode_header(token)
        .map_err(|e| ApiError::invalid_token(format!("invalid JWT header: {}", e)))?;

    // Symmetric algorithms would let anyone holding the public key forge tokens
    if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Err(ApiError::invalid_token(format!("algorithm {:?} not allowed", header.alg)));
    }

    let kid = header
        .kid
        .as_ref()
        .ok_or_else(|| ApiError::invalid_token("JWT missing 'kid' header"))?;

    let jwk = key_set.find_key(kid, http, clock).await?;

    let decoding_key = DecodingKey::from_jwk(&jwk)
        .map_err(|e| ApiError::invalid_token(format!("invalid JWK: {}", e)))?;

    // Time-based claims are checked below against the platform clock
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);
    validation.set_issuer(&[expected_issuer]);
    validation.set_audience(&[expected_audience]);

    let token_data = decode::<IdTokenClaims>(token, &decoding_key, &validation)
        .map_err(|e| ApiError::invalid_token(format!("token verification failed: {}", e)))?;

    let claims = token_data.claims;
    let now_secs = clock.now_secs();

    if claims.exp <= now_secs {
        return Err(ApiError::invalid_token("token has expired"));
    }

    if let Some(nbf) = claims.nbf {
        if nbf > now_secs + CLOCK_SKEW_SECS {
            return Err(ApiError::invalid_token("token is not yet valid (nbf claim)"));
        }
    }

    if let Some(iat) = claims.iat {
        if iat > now_secs + CLOCK_SKEW_SECS {
            return Err(ApiError::invalid_token("token issued in the future (iat claim)"));
        }
        if iat >= claims.exp {
            return Err(ApiError::invalid_token("invalid token: iat >= exp"));
        }
    }

    Ok(claims)
}
