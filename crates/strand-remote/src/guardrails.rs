use async_trait::async_trait;
use std::time::Duration;
use strand_contract::{
    GuardrailDecision, GuardrailInput, GuardrailValidator, RuntimeError, RuntimeResult,
};
use tracing::debug;

/// Guardrail validator backed by an HTTP service.
///
/// Sends the guardrail input to `POST {url}` and expects a
/// [`GuardrailDecision`] back. A non-success response is a validator
/// failure, not a denial.
pub struct HttpGuardrailValidator {
    url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpGuardrailValidator {
    pub fn new(url: impl Into<String>) -> RuntimeResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RuntimeError::execution(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            api_key: None,
            timeout: Duration::from_secs(10),
            client,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl GuardrailValidator for HttpGuardrailValidator {
    async fn validate(&self, input: GuardrailInput) -> RuntimeResult<GuardrailDecision> {
        let mut builder = self.client.post(&self.url).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.json(&input).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                RuntimeError::network(format!("guardrail service unreachable: {e}"))
            } else {
                RuntimeError::execution(format!("guardrail request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(RuntimeError::authentication(format!(
                "guardrail service returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeError::network(format!(
                "guardrail service error {status}: {body}"
            )));
        }

        let decision: GuardrailDecision = response.json().await.map_err(|e| {
            RuntimeError::execution(format!("invalid guardrail response: {e}"))
        })?;
        debug!(allowed = decision.is_allowed(), "guardrail decision received");
        Ok(decision)
    }
}
