//! GitHub repository and workflow calls
//!
//! Every call takes the resolved credential explicitly.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::github_headers;
use crate::error::{ApiError, Result};
use crate::platform::HttpClient;

#[derive(Deserialize)]
struct RepositoryResponse {
    default_branch: String,
}

#[derive(Serialize)]
struct DispatchPayload<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    inputs: Option<&'a HashMap<String, String>>,
}

/// Look up the default branch of `owner/repo`
pub async fn get_default_branch(
    owner: &str,
    repo: &str,
    token: &SecretString,
    api_base: &str,
    http: &dyn HttpClient,
) -> Result<String> {
    let url = format!("{}/repos/{}/{}", api_base, owner, repo);
    let auth_header = format!("Bearer {}", token.expose_secret());
    let headers = github_headers(&auth_header);

    let response = http
        .get(&url, &headers)
        .await
        .map_err(|e| ApiError::repository_lookup(format!("failed to call GitHub API: {}", e)))?;

    match response.status {
        200 => {}
        404 => {
            return Err(ApiError::repository_lookup(format!(
                "repository '{}/{}' not found",
                owner, repo
            )))
        }
        status => {
            return Err(ApiError::repository_lookup(format!(
                "repository lookup failed: {}",
                status
            )))
        }
    }

    let repository: RepositoryResponse = response
        .json()
        .map_err(|e| ApiError::repository_lookup(format!("failed to parse response: {}", e)))?;

    if repository.default_branch.is_empty() {
        return Err(ApiError::repository_lookup("repository has no default branch"));
    }

    Ok(repository.default_branch)
}

/// Trigger a `workflow_dispatch` event
pub async fn create_workflow_dispatch(
    owner: &str,
    repo: &str,
    workflow: &str,
    git_ref: &str,
    inputs: Option<&HashMap<String, String>>,
    token: &SecretString,
    api_base: &str,
    http: &dyn HttpClient,
) -> Result<()> {
    let url = format!(
        "{}/repos/{}/{}/actions/workflows/{}/dispatches",
        api_base, owner, repo, workflow
    );
    let auth_header = format!("Bearer {}", token.expose_secret());
    let headers = github_headers(&auth_header);

    let body = serde_json::to_vec(&DispatchPayload { git_ref, inputs })
        .map_err(|e| ApiError::internal(format!("failed to encode dispatch payload: {}", e)))?;

    let response = http
        .post(&url, &headers, &body)
        .await
        .map_err(|e| ApiError::dispatch(0, format!("failed to call GitHub API: {}", e)))?;

    if !matches!(response.status, 200 | 204) {
        let message = response
            .json::<serde_json::Value>()
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(ApiError::dispatch(response.status, message));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{empty_response, json_response, MockHttp};

    const API: &str = "https://api.github.com";

    fn token() -> SecretString {
        SecretString::from("ghs_test".to_string())
    }

    #[tokio::test]
    async fn test_get_default_branch() {
        let http = MockHttp::new().route(
            "GET",
            "/repos/octo-org/deployments",
            json_response(200, serde_json::json!({"default_branch": "trunk"})),
        );

        let branch = get_default_branch("octo-org", "deployments", &token(), API, &http)
            .await
            .unwrap();
        assert_eq!(branch, "trunk");

        let request = &http.requests("GET", "/repos/octo-org/deployments")[0];
        assert_eq!(request.header("Authorization"), Some("Bearer ghs_test"));
    }

    #[tokio::test]
    async fn test_get_default_branch_not_found() {
        let http = MockHttp::new().route("GET", "/repos/octo-org/missing", empty_response(404));

        let err = get_default_branch("octo-org", "missing", &token(), API, &http)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RepositoryLookup { .. }));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_create_workflow_dispatch_payload() {
        let http = MockHttp::new().route(
            "POST",
            "/repos/octo-org/deployments/actions/workflows/update-version.yml/dispatches",
            empty_response(204),
        );
        let inputs: HashMap<String, String> =
            [("version".to_string(), "1.2.3".to_string())].into_iter().collect();

        create_workflow_dispatch(
            "octo-org",
            "deployments",
            "update-version.yml",
            "main",
            Some(&inputs),
            &token(),
            API,
            &http,
        )
        .await
        .unwrap();

        let request = &http.requests("POST", "/dispatches")[0];
        assert_eq!(
            request.json(),
            serde_json::json!({"ref": "main", "inputs": {"version": "1.2.3"}})
        );
    }

    #[tokio::test]
    async fn test_create_workflow_dispatch_without_inputs() {
        let http = MockHttp::new().route("POST", "/dispatches", empty_response(204));

        create_workflow_dispatch("octo-org", "deployments", "ci.yml", "main", None, &token(), API, &http)
            .await
            .unwrap();

        let request = &http.requests("POST", "/dispatches")[0];
        assert_eq!(request.json(), serde_json::json!({"ref": "main"}));
    }

    #[tokio::test]
    async fn test_create_workflow_dispatch_failure_carries_status() {
        let http = MockHttp::new().route(
            "POST",
            "/dispatches",
            json_response(422, serde_json::json!({"message": "Workflow does not have 'workflow_dispatch' trigger"})),
        );

        let err = create_workflow_dispatch("octo-org", "deployments", "ci.yml", "main", None, &token(), API, &http)
            .await
            .unwrap_err();

        match &err {
            ApiError::Dispatch { status, message } => {
                assert_eq!(*status, 422);
                assert!(message.contains("workflow_dispatch"));
            }
            other => panic!("expected dispatch error, got {:?}", other),
        }
        assert_eq!(err.public_message(), "Failed to send workflow dispatch");
    }
}
