//! GitHub API module
//!
//! Handles GitHub App authentication, credential caching and the repository
//! and workflow calls made on behalf of callers.

pub mod api;
pub mod auth;
pub mod credentials;

pub use credentials::CredentialResolver;

const USER_AGENT: &str = "github-workflow-dispatch-proxy";
const API_VERSION: &str = "2022-11-28";

/// Standard headers for a GitHub REST call authorized by `auth_header`
fn github_headers(auth_header: &str) -> [(&str, &str); 4] {
    [
        ("Authorization", auth_header),
        ("Accept", "application/vnd.github+json"),
        ("User-Agent", USER_AGENT),
        ("X-GitHub-Api-Version", API_VERSION),
    ]
}
