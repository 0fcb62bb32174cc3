//! CEL expression policies
//!
//! The expression sees `config`, `target` and `caller` as variables and must
//! evaluate to a boolean.

use cel_interpreter::objects::Value as CelValue;
use cel_interpreter::{Context, Program};

use super::types::PolicyInput;
use crate::error::{ApiError, Result};

/// A CEL expression validated at startup
pub struct CelPolicy {
    expression: String,
}

impl CelPolicy {
    /// Parse the expression once so syntax errors stop startup
    pub fn compile(expression: &str) -> Result<Self> {
        Program::compile(expression).map_err(|e| {
            ApiError::configuration(format!("invalid CEL policy expression: {}", e))
        })?;

        Ok(Self {
            expression: expression.to_string(),
        })
    }

    pub fn evaluate(&self, input: &PolicyInput) -> Result<bool> {
        let program = Program::compile(&self.expression)
            .map_err(|e| ApiError::policy(format!("CEL compile error: {}", e)))?;

        let mut ctx = Context::default();
        let json = input.to_json();
        for name in ["config", "target", "caller"] {
            let value = json.get(name).cloned().unwrap_or(serde_json::Value::Null);
            ctx.add_variable_from_value(name, json_to_cel(value));
        }

        let result = program
            .execute(&ctx)
            .map_err(|e| ApiError::policy(format!("CEL execution error: {}", e)))?;

        match result {
            CelValue::Bool(b) => Ok(b),
            other => Err(ApiError::policy(format!(
                "CEL expression did not evaluate to bool: {:?}",
                other
            ))),
        }
    }
}

fn json_to_cel(value: serde_json::Value) -> CelValue {
    match value {
        serde_json::Value::Null => CelValue::Null,
        serde_json::Value::Bool(b) => CelValue::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else if let Some(f) = n.as_f64() {
                CelValue::Float(f)
            } else {
                CelValue::Null
            }
        }
        serde_json::Value::String(s) => CelValue::String(s.into()),
        serde_json::Value::Array(arr) => {
            let values = arr.into_iter().map(json_to_cel).collect::<Vec<_>>();
            CelValue::List(std::sync::Arc::new(values))
        }
        serde_json::Value::Object(map) => {
            let mut obj = std::collections::HashMap::new();
            for (k, v) in map {
                obj.insert(cel_interpreter::objects::Key::from(k), json_to_cel(v));
            }
            CelValue::Map(cel_interpreter::objects::Map {
                map: std::sync::Arc::new(obj),
            })
        }
    }
}
