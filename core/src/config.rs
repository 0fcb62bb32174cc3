//! Configuration and secrets management

use secrecy::SecretString;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ApiError, Result};
use crate::platform::Environment;

/// Prefix shared by every environment variable the proxy reads
pub const ENV_PREFIX: &str = "APP_";

/// Issuer of GitHub Actions identity tokens
pub const DEFAULT_GH_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// Audience identity tokens must be minted for
pub const DEFAULT_ID_TOKEN_AUDIENCE: &str = "github-workflow-dispatch-proxy";

pub const DEFAULT_GH_API_URL: &str = "https://api.github.com";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CREDENTIAL_CACHE_CAPACITY: u64 = 100;

/// Built-in authorization policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinPolicy {
    AllowAll,
    AllowOrgWide,
}

/// Which policy backend decides requests, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    Builtin(BuiltinPolicy),
    OpaWasm { path: PathBuf },
    Cel { expression: String },
}

/// What to do when a policy input fails validation before evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputValidation {
    /// Deny the request
    Enforce,
    /// Log and evaluate anyway
    Warn,
}

/// Credentials the proxy uses against the GitHub API
#[derive(Debug)]
pub enum GitHubAuth {
    Token(SecretString),
    App {
        app_id: String,
        private_key: SecretString,
    },
}

/// Application configuration loaded from environment
#[derive(Debug)]
pub struct Config {
    pub port: u16,
    /// Path prefix all routes are mounted under (always starts with '/')
    pub base_path: String,
    pub log_level: String,
    pub gh_issuer: String,
    pub id_token_audience: String,
    pub gh_api_url: String,
    /// Bound applied to every outbound call
    pub upstream_timeout: Duration,
    pub policy: PolicySource,
    /// Free-form policy configuration from `POLICY_CONFIG`
    pub policy_config: HashMap<String, String>,
    pub policy_input_validation: InputValidation,
    pub github_auth: GitHubAuth,
    pub credential_cache_capacity: u64,
}

impl Config {
    /// Load configuration from platform environment
    pub fn from_env(env: &dyn Environment) -> Result<Self> {
        let var = |name: &str| {
            env.get_var(&format!("{}{}", ENV_PREFIX, name))
                .filter(|v| !v.is_empty())
        };
        let required = |name: &str, reason: &str| {
            var(name).ok_or_else(|| {
                ApiError::configuration(format!("{}{} must be set {}", ENV_PREFIX, name, reason))
            })
        };

        let port = match var("PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| ApiError::configuration(format!("invalid port '{}'", p)))?,
            None => DEFAULT_PORT,
        };

        let policy = match var("POLICY").as_deref().unwrap_or("builtin") {
            "builtin" => {
                let builtin = match var("POLICY_TYPE").as_deref().unwrap_or("allow_all") {
                    "allow_all" => BuiltinPolicy::AllowAll,
                    "allow_org_wide" => BuiltinPolicy::AllowOrgWide,
                    other => {
                        return Err(ApiError::configuration(format!(
                            "unknown POLICY_TYPE '{}'",
                            other
                        )))
                    }
                };
                PolicySource::Builtin(builtin)
            }
            "opa-wasm" | "custom" => PolicySource::OpaWasm {
                path: PathBuf::from(required("POLICY_PATH", "when POLICY is opa-wasm")?),
            },
            "cel" => PolicySource::Cel {
                expression: required("POLICY_EXPRESSION", "when POLICY is cel")?,
            },
            other => {
                return Err(ApiError::configuration(format!("unknown POLICY '{}'", other)))
            }
        };

        let policy_input_validation = match var("POLICY_INPUT_VALIDATION").as_deref() {
            None | Some("enforce") => InputValidation::Enforce,
            Some("warn") => InputValidation::Warn,
            Some(other) => {
                return Err(ApiError::configuration(format!(
                    "unknown POLICY_INPUT_VALIDATION '{}'",
                    other
                )))
            }
        };

        let github_auth = match var("GH_AUTH_TYPE").as_deref() {
            Some("token") => GitHubAuth::Token(SecretString::from(required(
                "GH_AUTH_TOKEN",
                "when GH_AUTH_TYPE is token",
            )?)),
            Some("app") => GitHubAuth::App {
                app_id: required("GH_AUTH_APP_ID", "when GH_AUTH_TYPE is app")?,
                private_key: SecretString::from(normalize_pem(&required(
                    "GH_AUTH_APP_PRIVATE_KEY",
                    "when GH_AUTH_TYPE is app",
                )?)),
            },
            Some(other) => {
                return Err(ApiError::configuration(format!(
                    "unknown GH_AUTH_TYPE '{}'",
                    other
                )))
            }
            None => {
                return Err(ApiError::configuration(format!(
                    "{}GH_AUTH_TYPE must be set to 'token' or 'app'",
                    ENV_PREFIX
                )))
            }
        };

        Ok(Self {
            port,
            base_path: normalize_base_path(var("BASE_PATH").as_deref().unwrap_or("/")),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            gh_issuer: var("GH_ISSUER").unwrap_or_else(|| DEFAULT_GH_ISSUER.to_string()),
            id_token_audience: var("ID_TOKEN_AUDIENCE")
                .unwrap_or_else(|| DEFAULT_ID_TOKEN_AUDIENCE.to_string()),
            gh_api_url: var("GH_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GH_API_URL.to_string()),
            upstream_timeout: Duration::from_secs(parse_number(
                var("UPSTREAM_TIMEOUT_SECS"),
                "UPSTREAM_TIMEOUT_SECS",
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )?),
            policy,
            policy_config: var("POLICY_CONFIG")
                .map(|c| parse_policy_config(&c))
                .unwrap_or_default(),
            policy_input_validation,
            github_auth,
            credential_cache_capacity: parse_number(
                var("CREDENTIAL_CACHE_CAPACITY"),
                "CREDENTIAL_CACHE_CAPACITY",
                DEFAULT_CREDENTIAL_CACHE_CAPACITY,
            )?,
        })
    }
}

/// Parse `key=value;key=value` policy configuration into a flat map.
///
/// Only the first '=' separates key from value; empty segments are skipped.
pub fn parse_policy_config(value: &str) -> HashMap<String, String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
            None => (segment.to_string(), String::new()),
        })
        .collect()
}

fn parse_number(value: Option<String>, name: &str, default: u64) -> Result<u64> {
    match value {
        Some(v) => v.parse().map_err(|_| {
            ApiError::configuration(format!("{}{} must be a number, got '{}'", ENV_PREFIX, name, v))
        }),
        None => Ok(default),
    }
}

fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Private keys passed through env files often carry literal "\n" sequences
fn normalize_pem(key: &str) -> String {
    if key.contains("\\n") && !key.contains('\n') {
        key.replace("\\n", "\n")
    } else {
        key.to_string()
    }
}
