//! Error types and HTTP response mapping
//!
//! Every failure in the dispatch pipeline maps to exactly one HTTP status and
//! one fixed, user-visible message. The detailed message is for logs only.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Pipeline error with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing authentication: {message}")]
    MissingAuthentication { message: String },

    #[error("invalid token: {message}")]
    InvalidToken { message: String },

    #[error("issuer discovery failed: {message}")]
    Discovery { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("request denied by policy")]
    PolicyDenied,

    #[error("policy evaluation failed: {message}")]
    Policy { message: String },

    #[error("credential resolution failed: {message}")]
    Credential { message: String },

    #[error("repository lookup failed: {message}")]
    RepositoryLookup { message: String },

    #[error("workflow dispatch failed ({status}): {message}")]
    Dispatch { status: u16, message: String },

    #[error("upstream error: {message}")]
    Upstream { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn missing_authentication(message: impl Into<String>) -> Self {
        Self::MissingAuthentication {
            message: message.into(),
        }
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::Policy {
            message: message.into(),
        }
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    pub fn repository_lookup(message: impl Into<String>) -> Self {
        Self::RepositoryLookup {
            message: message.into(),
        }
    }

    pub fn dispatch(status: u16, message: impl Into<String>) -> Self {
        Self::Dispatch {
            status,
            message: message.into(),
        }
    }

    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingAuthentication { .. } => 401,
            Self::InvalidToken { .. } => 400,
            Self::Discovery { .. } => 400,
            Self::InvalidRequest { .. } => 400,
            Self::PolicyDenied => 401,
            Self::Policy { .. } => 401,
            Self::Credential { .. } => 500,
            Self::RepositoryLookup { .. } => 500,
            Self::Dispatch { .. } => 500,
            Self::Upstream { .. } => 500,
            Self::Configuration { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }

    /// Fixed message returned to callers. Never contains upstream details.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingAuthentication { .. } => "Missing authentication",
            Self::InvalidToken { .. } | Self::Discovery { .. } => "Failed to decode ID token",
            Self::InvalidRequest { .. } => "Invalid request body",
            Self::PolicyDenied | Self::Policy { .. } => "Request blocked by policy",
            Self::Credential { .. }
            | Self::RepositoryLookup { .. }
            | Self::Dispatch { .. }
            | Self::Upstream { .. } => "Failed to send workflow dispatch",
            Self::Configuration { .. } | Self::Internal { .. } => "Internal server error",
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            error: err.public_message().to_string(),
        }
    }
}
