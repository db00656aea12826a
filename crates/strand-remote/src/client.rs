use crate::decoder::LineDecoder;
use crate::retry::RetryPolicy;
use async_stream::stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use strand_contract::{
    ActionDescriptor, AgentDescriptor, EventStream, Message, RuntimeError, RuntimeResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Connection settings for one remote endpoint.
#[derive(Debug, Clone)]
pub struct RemoteEndpointConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Timeout for discovery and action calls. Agent streams are governed
    /// by `idle_timeout` instead.
    pub call_timeout: Duration,
    /// An agent stream producing no bytes for this long is treated as
    /// interrupted.
    pub idle_timeout: Duration,
    pub retry: RetryPolicy,
}

impl RemoteEndpointConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            call_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// An action definition advertised by a remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteActionDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Capabilities reported by `POST {base}/info`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteEndpointInfo {
    #[serde(default)]
    pub actions: Vec<RemoteActionDef>,
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,
}

/// Wire form of an agent execution request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAgentRequest {
    pub name: String,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub messages: Vec<Message>,
    pub state: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub actions: Vec<ActionDescriptor>,
}

#[derive(Debug, Serialize)]
struct ExecuteActionBody<'a> {
    name: &'a str,
    arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ExecuteActionResponse {
    result: Value,
}

/// HTTP client for one remote agent endpoint.
///
/// The underlying reqwest client carries no global timeout: agent
/// executions stream for as long as the agent runs. Discovery and action
/// calls apply `call_timeout` per request.
pub struct RemoteEndpointClient {
    config: RemoteEndpointConfig,
    client: reqwest::Client,
}

impl RemoteEndpointClient {
    pub fn new(config: RemoteEndpointConfig) -> RuntimeResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RuntimeError::execution(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Discover the endpoint's actions and agents. Transient failures are
    /// retried per the configured policy.
    pub async fn info(&self) -> RuntimeResult<RemoteEndpointInfo> {
        self.config
            .retry
            .run(|| async move {
                let response = self
                    .request("info")
                    .timeout(self.config.call_timeout)
                    .json(&Value::Object(Default::default()))
                    .send()
                    .await
                    .map_err(map_send_error)?;
                let response = check_status(response).await?;
                let info: RemoteEndpointInfo = response
                    .json()
                    .await
                    .map_err(|e| RuntimeError::execution(format!("invalid info response: {e}")))?;
                debug!(
                    actions = info.actions.len(),
                    agents = info.agents.len(),
                    endpoint = %self.config.base_url,
                    "endpoint discovery completed"
                );
                Ok(info)
            })
            .await
    }

    /// Execute a single action and return its result value. Transient
    /// failures are retried per the configured policy.
    pub async fn execute_action(
        &self,
        name: &str,
        arguments: Value,
        properties: Option<Value>,
    ) -> RuntimeResult<Value> {
        let arguments = &arguments;
        let properties = &properties;
        self.config
            .retry
            .run(|| async move {
                let body = ExecuteActionBody {
                    name,
                    arguments: arguments.clone(),
                    properties: properties.clone(),
                };
                let response = self
                    .request("actions/execute")
                    .timeout(self.config.call_timeout)
                    .json(&body)
                    .send()
                    .await
                    .map_err(map_send_error)?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(RuntimeError::action_not_found(name));
                }
                let response = check_status(response).await?;
                let parsed: ExecuteActionResponse = response.json().await.map_err(|e| {
                    RuntimeError::execution(format!("invalid action response: {e}"))
                })?;
                Ok(parsed.result)
            })
            .await
    }

    /// Start an agent execution and return its event stream.
    ///
    /// The request itself is not retried: replaying a partially consumed
    /// generation is not safe. `call_timeout` bounds the header phase (an
    /// endpoint that accepts the connection but never responds); once the
    /// stream exists only `idle_timeout` applies. Mid-stream failures
    /// surface as one `Err` item terminating the stream.
    pub async fn execute_agent(
        &self,
        request: RemoteAgentRequest,
        cancellation: CancellationToken,
    ) -> RuntimeResult<EventStream> {
        let send = self.request("agents/execute").json(&request).send();
        let response = tokio::select! {
            _ = cancellation.cancelled() => {
                return Err(RuntimeError::stream_interrupted(
                    "agent execution cancelled before the endpoint responded",
                ));
            }
            outcome = tokio::time::timeout(self.config.call_timeout, send) => match outcome {
                Ok(result) => result.map_err(map_send_error)?,
                Err(_) => {
                    return Err(RuntimeError::network(format!(
                        "agent endpoint did not respond within {}s",
                        self.config.call_timeout.as_secs()
                    )));
                }
            },
        };
        let response = check_status(response).await?;

        let idle_timeout = self.config.idle_timeout;
        let stream = stream! {
            let mut body = Box::pin(response.bytes_stream());
            let mut decoder = LineDecoder::new();
            loop {
                let chunk = tokio::select! {
                    _ = cancellation.cancelled() => {
                        debug!("agent stream cancelled");
                        break;
                    }
                    chunk = body.next() => chunk,
                    _ = tokio::time::sleep(idle_timeout) => {
                        yield Err(RuntimeError::stream_interrupted(format!(
                            "no data from agent endpoint for {}s",
                            idle_timeout.as_secs()
                        )));
                        break;
                    }
                };
                match chunk {
                    Some(Ok(bytes)) => {
                        for event in decoder.feed(&bytes) {
                            yield Ok(event);
                        }
                    }
                    Some(Err(err)) => {
                        yield Err(RuntimeError::stream_interrupted(format!(
                            "agent stream failed: {err}"
                        )));
                        break;
                    }
                    None => {
                        if decoder.has_partial() {
                            warn!("agent stream ended with a partial trailing line");
                        }
                        if let Some(event) = decoder.finish() {
                            yield Ok(event);
                        }
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let builder = self.client.post(url);
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

fn map_send_error(err: reqwest::Error) -> RuntimeError {
    if err.is_timeout() || err.is_connect() {
        RuntimeError::network(err.to_string())
    } else {
        RuntimeError::execution(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> RuntimeResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(RuntimeError::authentication(format!(
            "endpoint returned {status}"
        ))),
        429 => Err(RuntimeError::network(format!("endpoint throttled: {status}"))),
        code if code >= 500 => Err(RuntimeError::network(format!(
            "endpoint error {status}: {body}"
        ))),
        _ => Err(RuntimeError::execution(format!(
            "endpoint rejected request ({status}): {body}"
        ))),
    }
}
