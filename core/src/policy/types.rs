//! Policy input types
//!
//! `caller` is only ever built from verified identity token claims; `target`
//! comes from the request body. Policies see both through this one shape.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{ApiError, Result};
use crate::oidc::CallerIdentity;

/// Structured input every policy backend evaluates
#[derive(Debug, Clone, Serialize)]
pub struct PolicyInput {
    pub config: HashMap<String, String>,
    pub target: PolicyTarget,
    pub caller: PolicyCaller,
}

/// Repository and workflow the request wants to dispatch
#[derive(Debug, Clone, Serialize)]
pub struct PolicyTarget {
    pub owner: String,
    pub repository: String,
    /// Empty when the request omits a ref and the default branch applies
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub workflow: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<HashMap<String, String>>,
}

/// Workload that sent the request
#[derive(Debug, Clone, Serialize)]
pub struct PolicyCaller {
    pub owner: String,
    pub repository: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub workflow: String,
}

impl From<CallerIdentity> for PolicyCaller {
    fn from(identity: CallerIdentity) -> Self {
        Self {
            owner: identity.owner,
            repository: identity.repository,
            git_ref: identity.git_ref,
            workflow: identity.workflow,
        }
    }
}

impl PolicyInput {
    /// Check the input is complete before handing it to a policy
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("target.owner", &self.target.owner),
            ("target.repository", &self.target.repository),
            ("target.workflow", &self.target.workflow),
            ("caller.owner", &self.caller.owner),
            ("caller.repository", &self.caller.repository),
            ("caller.ref", &self.caller.git_ref),
            ("caller.workflow", &self.caller.workflow),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ApiError::policy(format!("policy input field '{}' is empty", name)));
            }
        }

        if self.config.keys().any(|k| k.is_empty()) {
            return Err(ApiError::policy("policy config contains an empty key"));
        }

        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
