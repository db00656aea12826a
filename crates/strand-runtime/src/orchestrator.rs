use crate::assembler::MessageAssembler;
use crate::config::RuntimeConfig;
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use strand_bus::{EventBus, Subscription};
use strand_contract::{
    gen_message_id, gen_run_id, gen_thread_id, now_millis, AgentDescriptor, AgentStateSnapshot,
    ExecutionAdapter, ExecutionContext, ExecutionRequest, GuardrailDecision, GuardrailInput,
    GuardrailMessage, GuardrailValidator, ResponseStatus, Role, RunRequest, RuntimeError,
    RuntimeEvent, RuntimeResult, StreamItem,
};
use strand_store::StateStore;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to an admitted run.
///
/// The stream yields assembled messages, incremental chunks, and meta
/// events, and always ends with exactly one terminal status item.
pub struct RunHandle {
    thread_id: String,
    run_id: String,
    cancellation: CancellationToken,
    bus: Arc<EventBus>,
    stream: Pin<Box<dyn Stream<Item = StreamItem> + Send>>,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("thread_id", &self.thread_id)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl RunHandle {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Token that cancels the run when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Attach an additional consumer to the run's raw event stream.
    ///
    /// With `replay`, events published before the subscription attached
    /// are delivered first. Each subscription gets an independent copy;
    /// the assembled stream from [`into_stream`](Self::into_stream) is
    /// unaffected.
    pub fn subscribe_events(&self, replay: bool) -> Subscription {
        self.bus.subscribe(replay)
    }

    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = StreamItem> + Send>> {
        self.stream
    }
}

/// The engine's front door: admits requests, routes them to adapters,
/// and turns adapter events into the outbound message stream.
pub struct RequestOrchestrator {
    config: RuntimeConfig,
    store: Arc<dyn StateStore>,
    guardrails: Option<Arc<dyn GuardrailValidator>>,
    default_adapter: Arc<dyn ExecutionAdapter>,
    agent_adapters: Vec<Arc<dyn ExecutionAdapter>>,
    active_threads: Arc<StdMutex<HashSet<String>>>,
    agent_cache: Mutex<Option<Vec<Vec<AgentDescriptor>>>>,
}

impl RequestOrchestrator {
    pub fn new(default_adapter: Arc<dyn ExecutionAdapter>, store: Arc<dyn StateStore>) -> Self {
        Self {
            config: RuntimeConfig::default(),
            store,
            guardrails: None,
            default_adapter,
            agent_adapters: Vec::new(),
            active_threads: Arc::new(StdMutex::new(HashSet::new())),
            agent_cache: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_guardrails(mut self, validator: Arc<dyn GuardrailValidator>) -> Self {
        self.guardrails = Some(validator);
        self
    }

    /// Register an additional adapter consulted for agent runs.
    pub fn register_adapter(mut self, adapter: Arc<dyn ExecutionAdapter>) -> Self {
        self.agent_adapters.push(adapter);
        self
    }

    /// All agents reachable through the registered adapters. Results are
    /// cached until [`invalidate_agent_cache`](Self::invalidate_agent_cache);
    /// agent-run admission resolves through the same cache, so discovery
    /// hits each adapter once, not once per request.
    pub async fn discover_agents(&self) -> RuntimeResult<Vec<AgentDescriptor>> {
        Ok(self.agent_tables().await?.into_iter().flatten().collect())
    }

    pub async fn invalidate_agent_cache(&self) {
        *self.agent_cache.lock().await = None;
    }

    /// Admit and start a run.
    ///
    /// Returns an error without creating any run state when the request
    /// is malformed, the thread already has an active run, or the named
    /// agent cannot be resolved. Everything after admission is reported
    /// through the handle's stream, which always ends with one terminal
    /// status.
    pub async fn process(&self, request: RunRequest) -> RuntimeResult<RunHandle> {
        request.validate()?;

        let thread_id = request
            .thread_id
            .clone()
            .or_else(|| {
                request
                    .agent_session
                    .as_ref()
                    .and_then(|s| s.thread_id.clone())
            })
            .unwrap_or_else(gen_thread_id);
        let run_id = request.run_id.clone().unwrap_or_else(gen_run_id);

        let reservation = self.reserve(&thread_id)?;

        let agent_name = request
            .agent_session
            .as_ref()
            .map(|s| s.agent_name.clone());
        let adapter = match &agent_name {
            Some(name) => self.adapter_for_agent(name).await?,
            None => Arc::clone(&self.default_adapter),
        };

        let state = match &agent_name {
            Some(name) => self
                .store
                .load(&thread_id, name)
                .await
                .map_err(RuntimeError::store)?
                .map(|snapshot| snapshot.state),
            None => None,
        };

        info!(
            thread_id = %thread_id,
            run_id = %run_id,
            adapter = adapter.name(),
            agent_name = %agent_name.as_deref().unwrap_or(""),
            "run admitted"
        );

        let bus = Arc::new(EventBus::new(self.config.bus_config()));
        let cancellation = CancellationToken::new();
        // Subscribed before the driver starts, so replay is never needed
        // to catch up; it still covers consumers attached later.
        let mut subscription = bus.subscribe(true);
        let (status_tx, status_rx) = oneshot::channel();

        let driver = RunDriver {
            request,
            adapter,
            guardrails: self.guardrails.clone(),
            store: Arc::clone(&self.store),
            bus: Arc::clone(&bus),
            ctx: ExecutionContext {
                thread_id: thread_id.clone(),
                run_id: run_id.clone(),
                agent_name,
                cancellation: cancellation.clone(),
            },
            state,
        };
        tokio::spawn(async move {
            let status = driver.drive().await;
            // Free the thread before consumers can observe the terminal
            // status, so a follow-up run is admitted immediately.
            drop(reservation);
            let _ = status_tx.send(status);
        });

        let stream_thread_id = thread_id.clone();
        let stream_run_id = run_id.clone();
        let output = stream! {
            let mut assembler = MessageAssembler::new();
            while let Some(event) = subscription.next().await {
                for item in assembler.handle(event) {
                    yield item;
                }
            }
            let status = match status_rx.await {
                Ok(status) => status,
                Err(_) => {
                    ResponseStatus::failed("EXECUTION_ERROR", "run driver terminated unexpectedly")
                }
            };
            let (status, finish_reason) = if status.is_success() {
                if assembler.has_open_messages() {
                    (
                        ResponseStatus::failed(
                            "STREAM_INTERRUPTED",
                            "stream ended with unterminated messages",
                        ),
                        "unterminated at end of stream",
                    )
                } else {
                    (status, "")
                }
            } else {
                (status, "interrupted")
            };
            for item in assembler.finish(finish_reason) {
                yield item;
            }
            yield StreamItem::Terminal {
                thread_id: stream_thread_id.clone(),
                run_id: stream_run_id.clone(),
                status,
            };
        };

        Ok(RunHandle {
            thread_id,
            run_id,
            cancellation,
            bus,
            stream: Box::pin(output),
        })
    }

    fn reserve(&self, thread_id: &str) -> RuntimeResult<ThreadReservation> {
        let mut threads = self
            .active_threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !threads.insert(thread_id.to_string()) {
            return Err(RuntimeError::validation(format!(
                "thread {thread_id} already has an active run"
            )));
        }
        Ok(ThreadReservation {
            threads: Arc::clone(&self.active_threads),
            thread_id: thread_id.to_string(),
        })
    }

    /// Per-adapter agent lists, queried once and cached. Registered
    /// adapters come first, the default adapter last, matching resolution
    /// order.
    async fn agent_tables(&self) -> RuntimeResult<Vec<Vec<AgentDescriptor>>> {
        let mut cache = self.agent_cache.lock().await;
        if let Some(tables) = cache.as_ref() {
            return Ok(tables.clone());
        }
        let mut tables = Vec::with_capacity(self.agent_adapters.len() + 1);
        for adapter in &self.agent_adapters {
            tables.push(adapter.agents().await?);
        }
        tables.push(self.default_adapter.agents().await?);
        *cache = Some(tables.clone());
        Ok(tables)
    }

    async fn adapter_for_agent(&self, name: &str) -> RuntimeResult<Arc<dyn ExecutionAdapter>> {
        let tables = self.agent_tables().await?;
        let adapters = self
            .agent_adapters
            .iter()
            .chain(std::iter::once(&self.default_adapter));
        for (adapter, agents) in adapters.zip(&tables) {
            if agents.iter().any(|a| a.name == name) {
                return Ok(Arc::clone(adapter));
            }
        }
        Err(RuntimeError::agent_not_found(name))
    }
}

/// Frees the thread for new runs when dropped, including on driver panic.
struct ThreadReservation {
    threads: Arc<StdMutex<HashSet<String>>>,
    thread_id: String,
}

impl Drop for ThreadReservation {
    fn drop(&mut self) {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.thread_id);
    }
}

struct RunDriver {
    request: RunRequest,
    adapter: Arc<dyn ExecutionAdapter>,
    guardrails: Option<Arc<dyn GuardrailValidator>>,
    store: Arc<dyn StateStore>,
    bus: Arc<EventBus>,
    ctx: ExecutionContext,
    state: Option<Value>,
}

impl RunDriver {
    async fn drive(self) -> ResponseStatus {
        let status = self.run_inner().await;
        self.bus.complete();
        status
    }

    async fn run_inner(&self) -> ResponseStatus {
        if let Some(validator) = &self.guardrails {
            if let Some(input) = self.guardrail_input() {
                match validator.validate(input).await {
                    Ok(GuardrailDecision::Allowed) => {
                        debug!(run_id = %self.ctx.run_id, "guardrails allowed the request");
                    }
                    Ok(GuardrailDecision::Denied { reason }) => {
                        warn!(
                            thread_id = %self.ctx.thread_id,
                            reason = %reason,
                            "guardrails denied the request"
                        );
                        let err = RuntimeError::guardrail_denied(reason);
                        self.publish_assistant_text(&err.user_facing_message()).await;
                        return ResponseStatus::failed(err.code(), err.user_facing_message());
                    }
                    Err(err) => {
                        warn!(error = %err, "guardrail validation unavailable");
                        return ResponseStatus::failed(err.code(), err.user_facing_message());
                    }
                }
            }
        }

        let exec = ExecutionRequest {
            messages: self.request.messages.clone(),
            available_actions: self.request.available_actions.clone(),
            state: self.state.clone(),
            node_name: self
                .request
                .agent_session
                .as_ref()
                .and_then(|s| s.node_name.clone()),
            forwarded_parameters: self.request.forwarded_parameters.clone(),
            context_properties: self.request.context_properties.clone(),
        };
        // The adapter may block on a remote endpoint before producing a
        // stream; cancellation has to win that race too.
        let mut events = tokio::select! {
            _ = self.ctx.cancellation.cancelled() => {
                debug!(run_id = %self.ctx.run_id, "run cancelled before the adapter started");
                return ResponseStatus::failed(
                    "STREAM_INTERRUPTED",
                    "run cancelled by the client",
                );
            }
            started = self.adapter.execute(exec, &self.ctx) => match started {
                Ok(events) => events,
                Err(err) => {
                    warn!(error = %err, run_id = %self.ctx.run_id, "adapter failed to start");
                    return ResponseStatus::failed(err.code(), err.user_facing_message());
                }
            },
        };

        let mut last_state: Option<AgentStateSnapshot> = None;
        let status = loop {
            let item = tokio::select! {
                _ = self.ctx.cancellation.cancelled() => {
                    debug!(run_id = %self.ctx.run_id, "run cancelled");
                    break ResponseStatus::failed(
                        "STREAM_INTERRUPTED",
                        "run cancelled by the client",
                    );
                }
                item = events.next() => item,
            };
            match item {
                Some(Ok(event)) => {
                    if let RuntimeEvent::AgentStateMessage {
                        thread_id,
                        agent_name,
                        node_name,
                        run_id,
                        active,
                        running,
                        state,
                    } = &event
                    {
                        last_state = Some(AgentStateSnapshot {
                            thread_id: thread_id.clone(),
                            agent_name: agent_name.clone(),
                            node_name: node_name.clone(),
                            run_id: run_id.clone(),
                            active: *active,
                            running: *running,
                            state: state.clone(),
                            updated_at: now_millis(),
                        });
                    }
                    self.bus.publish(event).await;
                }
                Some(Err(err)) => {
                    warn!(
                        error = %err,
                        run_id = %self.ctx.run_id,
                        "execution failed mid-stream"
                    );
                    // Generation already started; tell the user what
                    // happened in-band before failing the run.
                    self.publish_assistant_text(&err.user_facing_message()).await;
                    break ResponseStatus::failed(err.code(), err.user_facing_message());
                }
                None => break ResponseStatus::Success,
            }
        };

        if let Some(snapshot) = last_state {
            if let Err(err) = self.store.save(snapshot).await {
                warn!(error = %err, "failed to persist agent state");
                if status.is_success() {
                    let err = RuntimeError::store(err);
                    return ResponseStatus::failed(err.code(), err.user_facing_message());
                }
            }
        }
        status
    }

    /// Guardrails apply only when the request carries a guardrail config
    /// and the most recent message is user-authored.
    fn guardrail_input(&self) -> Option<GuardrailInput> {
        let config = self.request.guardrails.clone()?;
        let last = self.request.messages.last()?;
        if last.role() != Some(Role::User) {
            return None;
        }
        let input = last.text_content()?.to_string();
        let history = &self.request.messages[..self.request.messages.len() - 1];
        let messages = history
            .iter()
            .filter_map(|message| {
                let content = message.text_content()?;
                let role = message.role()?;
                Some(GuardrailMessage {
                    role: role.as_str().to_string(),
                    content: content.to_string(),
                })
            })
            .collect();
        Some(GuardrailInput {
            input,
            messages,
            allow_list: config.allow_list,
            deny_list: config.deny_list,
        })
    }

    async fn publish_assistant_text(&self, content: &str) {
        let id = gen_message_id();
        self.bus.publish(RuntimeEvent::text_start(id.clone())).await;
        self.bus
            .publish(RuntimeEvent::text_content(id.clone(), content))
            .await;
        self.bus.publish(RuntimeEvent::text_end(id)).await;
    }
}
