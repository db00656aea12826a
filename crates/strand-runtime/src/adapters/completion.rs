use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use strand_contract::{
    gen_message_id, EventStream, ExecutionAdapter, ExecutionContext, ExecutionRequest,
    RuntimeError, RuntimeEvent, RuntimeResult,
};
use tracing::warn;

/// A raw chunk from a completion provider.
#[derive(Debug, Clone)]
pub enum CompletionChunk {
    TextDelta(String),
    ActionCallStart { id: String, name: String },
    ActionArgsDelta { id: String, delta: String },
    ActionCallEnd { id: String },
}

pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<CompletionChunk, RuntimeError>> + Send>>;

/// Seam for a concrete completion provider (an LLM client, typically).
#[async_trait]
pub trait CompletionDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &ExecutionRequest) -> RuntimeResult<CompletionStream>;
}

/// Default execution path: turns a completion provider's delta stream
/// into the runtime event grammar, inserting the start/end framing the
/// provider does not emit itself.
pub struct CompletionAdapter {
    driver: Arc<dyn CompletionDriver>,
}

impl CompletionAdapter {
    pub fn new(driver: Arc<dyn CompletionDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl ExecutionAdapter for CompletionAdapter {
    fn name(&self) -> &str {
        self.driver.name()
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        _ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream> {
        let mut chunks = self.driver.complete(&request).await?;
        let events = stream! {
            let mut text_id: Option<String> = None;
            let mut open_actions: HashSet<String> = HashSet::new();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(CompletionChunk::TextDelta(delta)) => {
                        let id = match &text_id {
                            Some(id) => id.clone(),
                            None => {
                                let id = gen_message_id();
                                text_id = Some(id.clone());
                                yield Ok(RuntimeEvent::text_start(id.clone()));
                                id
                            }
                        };
                        yield Ok(RuntimeEvent::text_content(id, delta));
                    }
                    Ok(CompletionChunk::ActionCallStart { id, name }) => {
                        // A tool call ends the current text message.
                        if let Some(text) = text_id.take() {
                            yield Ok(RuntimeEvent::text_end(text));
                        }
                        open_actions.insert(id.clone());
                        yield Ok(RuntimeEvent::action_start(id, name));
                    }
                    Ok(CompletionChunk::ActionArgsDelta { id, delta }) => {
                        if !open_actions.contains(&id) {
                            warn!(action_execution_id = %id, "args for unopened action call");
                        }
                        yield Ok(RuntimeEvent::action_args(id, delta));
                    }
                    Ok(CompletionChunk::ActionCallEnd { id }) => {
                        open_actions.remove(&id);
                        yield Ok(RuntimeEvent::action_end(id));
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
            if let Some(text) = text_id.take() {
                yield Ok(RuntimeEvent::text_end(text));
            }
            for id in open_actions.drain() {
                yield Ok(RuntimeEvent::action_end(id));
            }
        };
        Ok(Box::pin(events))
    }
}
