//! dispatch-proxy-core: Platform-agnostic core of the GitHub workflow dispatch proxy
//!
//! A CI job presents its OIDC identity token; the token is verified, the
//! caller/target pair is checked against a pluggable policy, and the proxy
//! triggers a `workflow_dispatch` in the target repository using its own
//! GitHub credentials. Outbound I/O goes through the traits in [`platform`].

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod github;
pub mod oidc;
pub mod platform;
pub mod policy;

#[cfg(test)]
pub mod test_support;
