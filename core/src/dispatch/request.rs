//! Dispatch request parsing

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ApiError, Result};

/// Platform-neutral dispatch request, as delivered by the HTTP layer
pub struct DispatchRequest {
    /// Raw `Authorization` header value, if present
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

/// Request body: which workflow to dispatch, and with what inputs
#[derive(Debug, Deserialize)]
pub struct DispatchBody {
    pub target: DispatchTarget,
    #[serde(default)]
    pub inputs: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct DispatchTarget {
    pub owner: String,
    pub repo: String,
    /// Omitted (or empty) means the repository's default branch
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    pub workflow: String,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub message: String,
}

impl DispatchResponse {
    pub fn created() -> Self {
        Self {
            message: "workflow dispatch created".to_string(),
        }
    }
}

impl DispatchBody {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut parsed: DispatchBody = serde_json::from_slice(body)
            .map_err(|e| ApiError::invalid_request(format!("malformed body: {}", e)))?;

        let target = &mut parsed.target;
        validate_segment("target.owner", &target.owner)?;
        validate_segment("target.repo", &target.repo)?;
        validate_segment("target.workflow", &target.workflow)?;

        if target.git_ref.as_deref().is_some_and(str::is_empty) {
            target.git_ref = None;
        }

        Ok(parsed)
    }
}

/// Values interpolated into GitHub API paths must be a single path segment
fn validate_segment(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ApiError::invalid_request(format!("{} is empty", name)));
    }

    if value == "." || value == ".." {
        return Err(ApiError::invalid_request(format!("{} is not a valid name", name)));
    }

    if let Some(c) = value
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
    {
        return Err(ApiError::invalid_request(format!(
            "{} contains invalid character {:?}",
            name, c
        )));
    }

    Ok(())
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or_else(|| ApiError::missing_authentication("missing Authorization header"))?;

    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(ApiError::missing_authentication(
            "Authorization header must use Bearer scheme",
        )),
    }
}
