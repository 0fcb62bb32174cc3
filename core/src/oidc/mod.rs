//! OIDC (OpenID Connect) module
//!
//! Handles identity token validation including discovery, JWKS fetching, and claim verification.

mod discovery;
mod jwks;
mod validate;

pub use jwks::RemoteKeySet;
pub use validate::{verify, CallerIdentity, IdTokenClaims};

const USER_AGENT: &str = "github-workflow-dispatch-proxy";
