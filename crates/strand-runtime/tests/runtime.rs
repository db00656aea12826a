//! End-to-end orchestrator tests with scripted adapters.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strand_contract::{
    AgentDescriptor, AgentSession, AgentStateSnapshot, EventStream, ExecutionAdapter,
    ExecutionContext, ExecutionRequest, GuardrailDecision, GuardrailInput, GuardrailValidator,
    GuardrailsConfig, Message, MessageStatus, ResponseStatus, RunRequest, RuntimeError,
    RuntimeEvent, RuntimeResult, StreamItem,
};
use strand_runtime::{AgentRunner, InProcessAgentAdapter, RequestOrchestrator, RunHandle};
use strand_store::{MemoryStateStore, StateStore, StateStoreError};
use tokio::sync::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct ScriptedAdapter {
    script: Vec<Result<RuntimeEvent, String>>,
    calls: AtomicU32,
}

impl ScriptedAdapter {
    fn new(script: Vec<Result<RuntimeEvent, String>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicU32::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(
        &self,
        _request: ExecutionRequest,
        _ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Result<RuntimeEvent, RuntimeError>> = self
            .script
            .iter()
            .map(|item| match item {
                Ok(event) => Ok(event.clone()),
                Err(message) => Err(RuntimeError::stream_interrupted(message.clone())),
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

struct SlowAdapter;

#[async_trait]
impl ExecutionAdapter for SlowAdapter {
    fn name(&self) -> &str {
        "slow"
    }

    async fn execute(
        &self,
        _request: ExecutionRequest,
        _ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream> {
        Ok(Box::pin(stream! {
            tokio::time::sleep(Duration::from_millis(100)).await;
            yield Ok(RuntimeEvent::text_start("m1"));
            yield Ok(RuntimeEvent::text_content("m1", "late reply"));
            yield Ok(RuntimeEvent::text_end("m1"));
        }))
    }
}

struct HangingAdapter;

#[async_trait]
impl ExecutionAdapter for HangingAdapter {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn execute(
        &self,
        _request: ExecutionRequest,
        _ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream> {
        std::future::pending().await
    }
}

struct SpyGuardrail {
    decision: GuardrailDecision,
    calls: AtomicU32,
}

impl SpyGuardrail {
    fn allowing() -> Arc<Self> {
        Arc::new(Self {
            decision: GuardrailDecision::Allowed,
            calls: AtomicU32::new(0),
        })
    }

    fn denying(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            decision: GuardrailDecision::denied(reason),
            calls: AtomicU32::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GuardrailValidator for SpyGuardrail {
    async fn validate(&self, _input: GuardrailInput) -> RuntimeResult<GuardrailDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.decision.clone())
    }
}

struct UnreachableGuardrail;

#[async_trait]
impl GuardrailValidator for UnreachableGuardrail {
    async fn validate(&self, _input: GuardrailInput) -> RuntimeResult<GuardrailDecision> {
        Err(RuntimeError::network("guardrail service unreachable"))
    }
}

struct CountingAgent {
    received_state: Mutex<Option<Value>>,
}

#[async_trait]
impl AgentRunner for CountingAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: "chef-1".into(),
            name: "chef".into(),
            description: Some("counts steps".into()),
        }
    }

    async fn run(
        &self,
        request: ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream> {
        *self.received_state.lock().await = request.state.clone();
        let step = request
            .state
            .as_ref()
            .and_then(|s| s["step"].as_u64())
            .unwrap_or(0)
            + 1;
        let thread_id = ctx.thread_id.clone();
        let run_id = ctx.run_id.clone();
        Ok(Box::pin(stream! {
            yield Ok(RuntimeEvent::AgentStateMessage {
                thread_id,
                agent_name: "chef".into(),
                node_name: None,
                run_id: Some(run_id),
                active: true,
                running: false,
                state: json!({ "step": step }),
            });
            yield Ok(RuntimeEvent::text_start("m1"));
            yield Ok(RuntimeEvent::text_content("m1", format!("step {step}")));
            yield Ok(RuntimeEvent::text_end("m1"));
        }))
    }
}

struct FailingStore;

#[async_trait]
impl StateStore for FailingStore {
    async fn load(
        &self,
        _thread_id: &str,
        _agent_name: &str,
    ) -> Result<Option<AgentStateSnapshot>, StateStoreError> {
        Ok(None)
    }

    async fn save(&self, _snapshot: AgentStateSnapshot) -> Result<(), StateStoreError> {
        Err(StateStoreError::backend("disk full"))
    }

    async fn delete(&self, _thread_id: &str, _agent_name: &str) -> Result<(), StateStoreError> {
        Ok(())
    }

    async fn list_thread_agents(&self, _thread_id: &str) -> Result<Vec<String>, StateStoreError> {
        Ok(Vec::new())
    }
}

struct CountingDiscovery {
    inner: InProcessAgentAdapter,
    discoveries: AtomicU32,
}

#[async_trait]
impl ExecutionAdapter for CountingDiscovery {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn agents(&self) -> RuntimeResult<Vec<AgentDescriptor>> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        self.inner.agents().await
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream> {
        self.inner.execute(request, ctx).await
    }
}

fn request(text: &str) -> RunRequest {
    RunRequest::new(vec![Message::user(text)]).with_thread_id("t1")
}

fn guarded_request(text: &str) -> RunRequest {
    request(text).with_guardrails(GuardrailsConfig {
        allow_list: vec!["cooking".into()],
        deny_list: vec!["politics".into()],
    })
}

async fn collect(handle: RunHandle) -> Vec<StreamItem> {
    handle.into_stream().collect().await
}

fn terminal_status(items: &[StreamItem]) -> &ResponseStatus {
    let terminal_count = items.iter().filter(|i| i.is_terminal()).count();
    assert_eq!(terminal_count, 1, "expected exactly one terminal item");
    match items.last() {
        Some(StreamItem::Terminal { status, .. }) => status,
        other => panic!("expected terminal as last item, got {other:?}"),
    }
}

fn finalized_texts(items: &[StreamItem]) -> Vec<&Message> {
    items
        .iter()
        .filter_map(StreamItem::as_message)
        .filter(|m| matches!(m, Message::Text { .. }))
        .collect()
}

#[tokio::test]
async fn streamed_text_is_assembled_and_run_succeeds() {
    init_tracing();
    let adapter = ScriptedAdapter::new(vec![
        Ok(RuntimeEvent::text_start("m1")),
        Ok(RuntimeEvent::text_content("m1", "Hello ")),
        Ok(RuntimeEvent::text_content("m1", "there")),
        Ok(RuntimeEvent::text_end("m1")),
    ]);
    let orchestrator =
        RequestOrchestrator::new(adapter.clone(), Arc::new(MemoryStateStore::new()));

    let items = collect(orchestrator.process(request("hi")).await.unwrap()).await;

    let chunks: Vec<_> = items.iter().filter_map(StreamItem::as_chunk).collect();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].delta, "Hello ");

    let texts = finalized_texts(&items);
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].text_content(), Some("Hello there"));
    assert_eq!(texts[0].status(), &MessageStatus::Success);

    assert!(terminal_status(&items).is_success());
    assert_eq!(adapter.call_count(), 1);
}

#[tokio::test]
async fn action_execution_round_trip() {
    let adapter = ScriptedAdapter::new(vec![
        Ok(RuntimeEvent::action_start("a1", "lookup")),
        Ok(RuntimeEvent::action_args("a1", r#"{"q":"rust"}"#)),
        Ok(RuntimeEvent::action_end("a1")),
        Ok(RuntimeEvent::action_result("a1", "lookup", "42")),
    ]);
    let orchestrator = RequestOrchestrator::new(adapter, Arc::new(MemoryStateStore::new()));

    let items = collect(orchestrator.process(request("hi")).await.unwrap()).await;

    let messages: Vec<_> = items.iter().filter_map(StreamItem::as_message).collect();
    assert_eq!(messages.len(), 2);
    match messages[0] {
        Message::ActionExecution {
            name, arguments, ..
        } => {
            assert_eq!(name, "lookup");
            assert_eq!(arguments, r#"{"q":"rust"}"#);
        }
        other => panic!("expected action execution, got {other:?}"),
    }
    match messages[1] {
        Message::Result {
            action_execution_id,
            result,
            ..
        } => {
            assert_eq!(action_execution_id, "a1");
            assert_eq!(result, "42");
        }
        other => panic!("expected action result, got {other:?}"),
    }
    assert!(terminal_status(&items).is_success());
}

#[tokio::test]
async fn guardrail_denial_skips_the_adapter() {
    let adapter = ScriptedAdapter::new(vec![Ok(RuntimeEvent::text_start("m1"))]);
    let guardrail = SpyGuardrail::denying("stick to cooking topics");
    let orchestrator =
        RequestOrchestrator::new(adapter.clone(), Arc::new(MemoryStateStore::new()))
            .with_guardrails(guardrail.clone());

    let items = collect(
        orchestrator
            .process(guarded_request("tell me about politics"))
            .await
            .unwrap(),
    )
    .await;

    let texts = finalized_texts(&items);
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].text_content(), Some("stick to cooking topics"));
    assert_eq!(texts[0].status(), &MessageStatus::Success);

    match terminal_status(&items) {
        ResponseStatus::Failed { error_code, reason, .. } => {
            assert_eq!(error_code, "GUARDRAILS_VALIDATION_FAILED");
            assert_eq!(reason, "stick to cooking topics");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(adapter.call_count(), 0);
    assert_eq!(guardrail.call_count(), 1);
}

#[tokio::test]
async fn guardrail_service_failure_aborts_without_synthetic_message() {
    let adapter = ScriptedAdapter::new(vec![Ok(RuntimeEvent::text_start("m1"))]);
    let orchestrator =
        RequestOrchestrator::new(adapter.clone(), Arc::new(MemoryStateStore::new()))
            .with_guardrails(Arc::new(UnreachableGuardrail));

    let items = collect(orchestrator.process(guarded_request("hi")).await.unwrap()).await;

    assert!(items.iter().all(|i| i.as_message().is_none()));
    match terminal_status(&items) {
        ResponseStatus::Failed { error_code, .. } => {
            assert_eq!(error_code, "NETWORK_ERROR");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(adapter.call_count(), 0);
}

#[tokio::test]
async fn allowed_requests_proceed_to_the_adapter() {
    let adapter = ScriptedAdapter::new(vec![
        Ok(RuntimeEvent::text_start("m1")),
        Ok(RuntimeEvent::text_content("m1", "sure")),
        Ok(RuntimeEvent::text_end("m1")),
    ]);
    let guardrail = SpyGuardrail::allowing();
    let orchestrator =
        RequestOrchestrator::new(adapter.clone(), Arc::new(MemoryStateStore::new()))
            .with_guardrails(guardrail.clone());

    let items = collect(
        orchestrator
            .process(guarded_request("how do I sear a steak?"))
            .await
            .unwrap(),
    )
    .await;

    assert!(terminal_status(&items).is_success());
    assert_eq!(guardrail.call_count(), 1);
    assert_eq!(adapter.call_count(), 1);
}

#[tokio::test]
async fn requests_without_guardrail_config_skip_validation() {
    let adapter = ScriptedAdapter::new(vec![
        Ok(RuntimeEvent::text_start("m1")),
        Ok(RuntimeEvent::text_end("m1")),
    ]);
    let guardrail = SpyGuardrail::denying("would deny");
    let orchestrator =
        RequestOrchestrator::new(adapter.clone(), Arc::new(MemoryStateStore::new()))
            .with_guardrails(guardrail.clone());

    let items = collect(orchestrator.process(request("hi")).await.unwrap()).await;

    assert!(terminal_status(&items).is_success());
    assert_eq!(guardrail.call_count(), 0);
    assert_eq!(adapter.call_count(), 1);
}

#[tokio::test]
async fn mid_stream_failure_explains_and_fails_open_messages() {
    init_tracing();
    let adapter = ScriptedAdapter::new(vec![
        Ok(RuntimeEvent::text_start("m1")),
        Ok(RuntimeEvent::text_content("m1", "partial")),
        Err("backend dropped the connection".to_string()),
    ]);
    let orchestrator = RequestOrchestrator::new(adapter, Arc::new(MemoryStateStore::new()));

    let items = collect(orchestrator.process(request("hi")).await.unwrap()).await;

    let texts = finalized_texts(&items);
    // The synthetic explanation plus the failed partial message.
    assert_eq!(texts.len(), 2);
    let explanation = texts
        .iter()
        .find(|m| m.status() == &MessageStatus::Success)
        .expect("explanation message");
    assert!(explanation.text_content().unwrap().contains("unexpectedly"));
    let failed = texts
        .iter()
        .find(|m| m.id() == "m1")
        .expect("partial message");
    assert!(matches!(failed.status(), MessageStatus::Failed { .. }));

    match terminal_status(&items) {
        ResponseStatus::Failed { error_code, .. } => {
            assert_eq!(error_code, "STREAM_INTERRUPTED");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn clean_end_with_open_message_fails_the_run() {
    let adapter = ScriptedAdapter::new(vec![
        Ok(RuntimeEvent::text_start("m1")),
        Ok(RuntimeEvent::text_content("m1", "never finished")),
    ]);
    let orchestrator = RequestOrchestrator::new(adapter, Arc::new(MemoryStateStore::new()));

    let items = collect(orchestrator.process(request("hi")).await.unwrap()).await;

    let texts = finalized_texts(&items);
    assert_eq!(texts.len(), 1);
    assert!(matches!(texts[0].status(), MessageStatus::Failed { .. }));
    match terminal_status(&items) {
        ResponseStatus::Failed { error_code, .. } => {
            assert_eq!(error_code, "STREAM_INTERRUPTED");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn second_run_on_an_active_thread_is_rejected() {
    let orchestrator =
        RequestOrchestrator::new(Arc::new(SlowAdapter), Arc::new(MemoryStateStore::new()));

    let first = orchestrator.process(request("one")).await.unwrap();
    let rejected = orchestrator.process(request("two")).await;
    assert_eq!(rejected.unwrap_err().code(), "VALIDATION_ERROR");

    let items = collect(first).await;
    assert!(terminal_status(&items).is_success());

    // The thread frees up once the first run finishes.
    let third = orchestrator.process(request("three")).await.unwrap();
    let items = collect(third).await;
    assert!(terminal_status(&items).is_success());
}

#[tokio::test]
async fn malformed_requests_fail_before_guardrails_run() {
    let adapter = ScriptedAdapter::new(vec![]);
    let guardrail = SpyGuardrail::denying("would deny");
    let orchestrator =
        RequestOrchestrator::new(adapter.clone(), Arc::new(MemoryStateStore::new()))
            .with_guardrails(guardrail.clone());

    let err = orchestrator
        .process(RunRequest::new(vec![]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(guardrail.call_count(), 0);
    assert_eq!(adapter.call_count(), 0);
}

#[tokio::test]
async fn cancellation_resolves_a_failed_terminal_status() {
    let orchestrator =
        RequestOrchestrator::new(Arc::new(SlowAdapter), Arc::new(MemoryStateStore::new()));

    let handle = orchestrator.process(request("hi")).await.unwrap();
    handle.cancel();
    let items = collect(handle).await;

    match terminal_status(&items) {
        ResponseStatus::Failed { error_code, .. } => {
            assert_eq!(error_code, "STREAM_INTERRUPTED");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_while_the_adapter_is_starting_still_terminates() {
    let orchestrator =
        RequestOrchestrator::new(Arc::new(HangingAdapter), Arc::new(MemoryStateStore::new()));

    let handle = orchestrator.process(request("hi")).await.unwrap();
    handle.cancel();
    let items = tokio::time::timeout(Duration::from_secs(2), collect(handle))
        .await
        .expect("run terminates after cancellation");

    match terminal_status(&items) {
        ResponseStatus::Failed { error_code, .. } => {
            assert_eq!(error_code, "STREAM_INTERRUPTED");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn additional_consumers_see_the_raw_event_stream() {
    let adapter = ScriptedAdapter::new(vec![
        Ok(RuntimeEvent::text_start("m1")),
        Ok(RuntimeEvent::text_content("m1", "hello")),
        Ok(RuntimeEvent::text_end("m1")),
    ]);
    let orchestrator = RequestOrchestrator::new(adapter, Arc::new(MemoryStateStore::new()));

    let handle = orchestrator.process(request("hi")).await.unwrap();
    let mut raw_events = handle.subscribe_events(true);

    let items = collect(handle).await;
    assert!(terminal_status(&items).is_success());

    // The second consumer gets its own full copy of the run's events.
    let mut seen = Vec::new();
    while let Some(event) = raw_events.next().await {
        seen.push(event);
    }
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], RuntimeEvent::text_start("m1"));
    assert_eq!(seen[2], RuntimeEvent::text_end("m1"));
}

#[tokio::test]
async fn state_save_failure_fails_an_otherwise_successful_run() {
    let agent = Arc::new(CountingAgent {
        received_state: Mutex::new(None),
    });
    let orchestrator =
        RequestOrchestrator::new(ScriptedAdapter::new(vec![]), Arc::new(FailingStore))
            .register_adapter(Arc::new(InProcessAgentAdapter::new().register(agent)));

    let run = RunRequest::new(vec![Message::user("go")])
        .with_thread_id("t1")
        .with_agent_session(AgentSession::new("chef"));
    let items = collect(orchestrator.process(run).await.unwrap()).await;

    // The generated messages still arrive; only the terminal status flips.
    assert_eq!(finalized_texts(&items).len(), 1);
    match terminal_status(&items) {
        ResponseStatus::Failed { error_code, .. } => {
            assert_eq!(error_code, "STATE_STORE_ERROR");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn agent_resolution_reuses_the_discovery_cache() {
    let agent = Arc::new(CountingAgent {
        received_state: Mutex::new(None),
    });
    let host = Arc::new(CountingDiscovery {
        inner: InProcessAgentAdapter::new().register(agent),
        discoveries: AtomicU32::new(0),
    });
    let orchestrator = RequestOrchestrator::new(
        ScriptedAdapter::new(vec![]),
        Arc::new(MemoryStateStore::new()),
    )
    .register_adapter(host.clone());

    let agent_request = |thread: &str| {
        RunRequest::new(vec![Message::user("go")])
            .with_thread_id(thread)
            .with_agent_session(AgentSession::new("chef"))
    };

    let items = collect(orchestrator.process(agent_request("t1")).await.unwrap()).await;
    assert!(terminal_status(&items).is_success());
    let items = collect(orchestrator.process(agent_request("t2")).await.unwrap()).await;
    assert!(terminal_status(&items).is_success());
    assert_eq!(host.discoveries.load(Ordering::SeqCst), 1);

    // Invalidation forces one fresh discovery on the next admission.
    orchestrator.invalidate_agent_cache().await;
    let items = collect(orchestrator.process(agent_request("t3")).await.unwrap()).await;
    assert!(terminal_status(&items).is_success());
    assert_eq!(host.discoveries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn agent_runs_persist_and_resume_state() {
    let store = Arc::new(MemoryStateStore::new());
    let agent = Arc::new(CountingAgent {
        received_state: Mutex::new(None),
    });
    let default_adapter = ScriptedAdapter::new(vec![]);
    let orchestrator = RequestOrchestrator::new(default_adapter.clone(), store.clone())
        .register_adapter(Arc::new(
            InProcessAgentAdapter::new().register(agent.clone()),
        ));

    let agent_request = || {
        RunRequest::new(vec![Message::user("go")])
            .with_thread_id("t1")
            .with_agent_session(AgentSession::new("chef"))
    };

    let items = collect(orchestrator.process(agent_request()).await.unwrap()).await;
    assert!(terminal_status(&items).is_success());
    assert!(items
        .iter()
        .filter_map(StreamItem::as_message)
        .any(|m| matches!(m, Message::AgentState { .. })));

    let snapshot = store.load("t1", "chef").await.unwrap().expect("snapshot");
    assert_eq!(snapshot.state, json!({ "step": 1 }));
    assert!(agent.received_state.lock().await.is_none());

    // Second run resumes from the persisted snapshot.
    let items = collect(orchestrator.process(agent_request()).await.unwrap()).await;
    assert!(terminal_status(&items).is_success());
    assert_eq!(
        agent.received_state.lock().await.as_ref(),
        Some(&json!({ "step": 1 }))
    );
    let snapshot = store.load("t1", "chef").await.unwrap().expect("snapshot");
    assert_eq!(snapshot.state, json!({ "step": 2 }));

    // The default adapter never saw the agent runs.
    assert_eq!(default_adapter.call_count(), 0);
}

#[tokio::test]
async fn unknown_agents_are_rejected_before_admission() {
    let orchestrator = RequestOrchestrator::new(
        ScriptedAdapter::new(vec![]),
        Arc::new(MemoryStateStore::new()),
    );

    let err = orchestrator
        .process(
            RunRequest::new(vec![Message::user("go")])
                .with_agent_session(AgentSession::new("nobody")),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "AGENT_NOT_FOUND");
}

#[tokio::test]
async fn discovery_aggregates_and_caches_agents() {
    let agent = Arc::new(CountingAgent {
        received_state: Mutex::new(None),
    });
    let orchestrator = RequestOrchestrator::new(
        ScriptedAdapter::new(vec![]),
        Arc::new(MemoryStateStore::new()),
    )
    .register_adapter(Arc::new(InProcessAgentAdapter::new().register(agent)));

    let agents = orchestrator.discover_agents().await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].name, "chef");

    orchestrator.invalidate_agent_cache().await;
    let agents = orchestrator.discover_agents().await.unwrap();
    assert_eq!(agents[0].name, "chef");
}
