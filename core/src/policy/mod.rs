//! Authorization policies
//!
//! One backend is selected at startup and decides every request. Any
//! evaluation failure is a denial.

mod builtin;
mod cel;
mod opa_wasm;
pub mod types;

pub use cel::CelPolicy;
pub use opa_wasm::OpaWasmPolicy;
pub use types::{PolicyCaller, PolicyInput, PolicyTarget};

use crate::config::{BuiltinPolicy, InputValidation, PolicySource};
use crate::error::{ApiError, Result};

/// The policy backend in force for the life of the process
pub enum PolicyEngine {
    Builtin(BuiltinPolicy),
    Cel(CelPolicy),
    OpaWasm(OpaWasmPolicy),
}

impl PolicyEngine {
    /// Build the configured backend, failing on unusable policy sources
    pub fn from_source(source: &PolicySource) -> Result<Self> {
        match source {
            PolicySource::Builtin(policy) => Ok(Self::Builtin(*policy)),
            PolicySource::Cel { expression } => Ok(Self::Cel(CelPolicy::compile(expression)?)),
            PolicySource::OpaWasm { path } => Ok(Self::OpaWasm(OpaWasmPolicy::load(path)?)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Builtin(BuiltinPolicy::AllowAll) => "builtin:allow_all",
            Self::Builtin(BuiltinPolicy::AllowOrgWide) => "builtin:allow_org_wide",
            Self::Cel(_) => "cel",
            Self::OpaWasm(_) => "opa-wasm",
        }
    }

    /// Raw backend decision
    pub async fn evaluate(&self, input: &PolicyInput) -> Result<bool> {
        match self {
            Self::Builtin(policy) => Ok(builtin::evaluate(*policy, input)),
            Self::Cel(policy) => policy.evaluate(input),
            Self::OpaWasm(policy) => policy.evaluate(input).await,
        }
    }

    /// Decide a request, mapping every failure to a denial
    ///
    /// Returns `Ok(())` only when the backend returned an explicit allow.
    pub async fn authorize(&self, input: &PolicyInput, validation: InputValidation) -> Result<()> {
        if let Err(e) = input.validate() {
            match validation {
                InputValidation::Enforce => return Err(e),
                InputValidation::Warn => {
                    tracing::warn!(policy = self.name(), error = %e, "policy input failed validation")
                }
            }
        }

        match self.evaluate(input).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ApiError::PolicyDenied),
            Err(e) => Err(e),
        }
    }
}
