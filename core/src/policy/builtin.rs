//! Built-in policies

use super::types::PolicyInput;
use crate::config::BuiltinPolicy;

pub fn evaluate(policy: BuiltinPolicy, input: &PolicyInput) -> bool {
    match policy {
        BuiltinPolicy::AllowAll => true,
        BuiltinPolicy::AllowOrgWide => allow_org_wide(input),
    }
}

/// Caller and target must both belong to the configured organization
fn allow_org_wide(input: &PolicyInput) -> bool {
    match input.config.get("organization") {
        Some(org) if !org.is_empty() => *org == input.caller.owner && *org == input.target.owner,
        _ => false,
    }
}
