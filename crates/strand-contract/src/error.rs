use thiserror::Error;

/// Result alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Normalized runtime error taxonomy.
///
/// Every failure surfaced to a caller goes through one of these variants,
/// each carrying a stable machine-readable [`code`](RuntimeError::code).
/// Internal details (connection strings, backend payloads) stay in the
/// `Display` form for logs; [`user_facing_message`](RuntimeError::user_facing_message)
/// gives the redacted form suitable for clients.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid request: {message}")]
    Validation { message: String },

    #[error("guardrails denied the request: {reason}")]
    GuardrailDenied { reason: String },

    #[error("agent not found: {name}")]
    AgentNotFound { name: String },

    #[error("action not found: {name}")]
    ActionNotFound { name: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("execution failed: {message}")]
    Execution { message: String },

    #[error("stream interrupted: {message}")]
    StreamInterrupted { message: String },

    #[error("state store error: {message}")]
    Store { message: String },
}

impl RuntimeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn guardrail_denied(reason: impl Into<String>) -> Self {
        Self::GuardrailDenied {
            reason: reason.into(),
        }
    }

    pub fn agent_not_found(name: impl Into<String>) -> Self {
        Self::AgentNotFound { name: name.into() }
    }

    pub fn action_not_found(name: impl Into<String>) -> Self {
        Self::ActionNotFound { name: name.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn stream_interrupted(message: impl Into<String>) -> Self {
        Self::StreamInterrupted {
            message: message.into(),
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::GuardrailDenied { .. } => "GUARDRAILS_VALIDATION_FAILED",
            Self::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            Self::ActionNotFound { .. } => "ACTION_NOT_FOUND",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Execution { .. } => "EXECUTION_ERROR",
            Self::StreamInterrupted { .. } => "STREAM_INTERRUPTED",
            Self::Store { .. } => "STATE_STORE_ERROR",
        }
    }

    /// Whether a retry with the same input can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Redacted description safe to show to end users.
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::Validation { message } => format!("Invalid request: {message}"),
            Self::GuardrailDenied { reason } => reason.clone(),
            Self::AgentNotFound { name } => format!("No agent named \"{name}\" is available."),
            Self::ActionNotFound { name } => format!("No action named \"{name}\" is available."),
            Self::Network { .. } => "The agent backend could not be reached.".to_string(),
            Self::Authentication { .. } => {
                "Authentication with the agent backend failed.".to_string()
            }
            Self::Execution { .. } => "The agent failed while generating a response.".to_string(),
            Self::StreamInterrupted { .. } => {
                "The response stream ended unexpectedly.".to_string()
            }
            Self::Store { .. } => "Agent state could not be read or written.".to_string(),
        }
    }
}
