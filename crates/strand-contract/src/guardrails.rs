use crate::error::RuntimeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-request guardrail configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailsConfig {
    /// Topics explicitly permitted even if the deny list would match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_list: Vec<String>,
    /// Topics the validator should reject.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_list: Vec<String>,
}

/// A prior conversation turn, reduced to what a validator needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardrailMessage {
    pub role: String,
    pub content: String,
}

/// The payload submitted to a guardrail validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailInput {
    /// The latest user input under evaluation.
    pub input: String,
    /// Preceding conversation turns, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<GuardrailMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_list: Vec<String>,
}

/// Verdict of a guardrail check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GuardrailDecision {
    Allowed,
    Denied { reason: String },
}

impl GuardrailDecision {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Pre-flight input validation seam.
///
/// A denial is a normal outcome; an `Err` means the validator itself
/// could not be consulted.
#[async_trait]
pub trait GuardrailValidator: Send + Sync {
    async fn validate(&self, input: GuardrailInput) -> RuntimeResult<GuardrailDecision>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_wire_form() {
        let denied = GuardrailDecision::denied("off topic");
        let value = serde_json::to_value(&denied).unwrap();
        assert_eq!(value["status"], "denied");
        assert_eq!(value["reason"], "off topic");

        let allowed: GuardrailDecision =
            serde_json::from_str(r#"{"status":"allowed"}"#).unwrap();
        assert!(allowed.is_allowed());
    }
}
