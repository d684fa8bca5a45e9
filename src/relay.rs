use crate::config::prompt::{ Instruction, PromptConfig };
use crate::llm::chat::{ ChatClient, ChatError, FragmentStream };
use crate::models::chat::ChatMessage;

use futures::{ stream, StreamExt };
use log::{ debug, error, info, warn };
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("upstream call failed: {0}")]
    Upstream(#[from] ChatError),
}

/// Lifecycle of a single relayed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    RequestReceived,
    UpstreamCallInitiated,
    Streaming,
    Completed,
    Failed,
    UpstreamCallFailed,
}

struct RequestTrace {
    id: Uuid,
    phase: RelayPhase,
    fragments: usize,
}

impl RequestTrace {
    fn new() -> Self {
        Self { id: Uuid::new_v4(), phase: RelayPhase::Idle, fragments: 0 }
    }

    fn advance(&mut self, next: RelayPhase) {
        debug!("Relay {}: {:?} -> {:?}", self.id, self.phase, next);
        self.phase = next;
    }
}

impl Drop for RequestTrace {
    fn drop(&mut self) {
        if self.phase == RelayPhase::Streaming {
            warn!(
                "Relay {}: consumer went away after {} fragments, dropping upstream stream",
                self.id,
                self.fragments
            );
        }
    }
}

/// Stateless bridge between a caller's conversation and the upstream completion API.
#[derive(Clone)]
pub struct Relay {
    client: Arc<dyn ChatClient>,
    prompts: Arc<PromptConfig>,
}

impl Relay {
    pub fn new(client: Arc<dyn ChatClient>, prompts: Arc<PromptConfig>) -> Self {
        Self { client, prompts }
    }

    pub fn parse_request(body: &[u8]) -> Result<Vec<ChatMessage>, RelayError> {
        serde_json::from_slice(body).map_err(|e| RelayError::Malformed(e.to_string()))
    }

    /// Picks the system instruction from the newest message, which is assumed to be the user's.
    pub fn select_instruction(&self, messages: &[ChatMessage]) -> Option<Instruction> {
        messages.last().map(|latest| self.prompts.select(&latest.content))
    }

    /// Prepends the system instruction to `messages`.
    pub fn prepare(&self, messages: Vec<ChatMessage>) -> Result<Vec<ChatMessage>, RelayError> {
        let instruction = self
            .select_instruction(&messages)
            .ok_or_else(|| RelayError::Malformed("conversation is empty".to_string()))?;
        debug!("Selected '{}' instruction", instruction.language.code());

        let mut full = Vec::with_capacity(messages.len() + 1);
        full.push(ChatMessage::system(instruction.text));
        full.extend(messages);
        Ok(full)
    }

    /// Starts the upstream call and returns the fragments as they arrive.
    ///
    /// An `Err` here means nothing was streamed yet. Once the stream is returned, a failure
    /// shows up as a final `Err` item and no further fragments follow it.
    pub async fn open(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, RelayError> {
        let mut trace = RequestTrace::new();
        trace.advance(RelayPhase::RequestReceived);
        info!("Relay {}: received conversation of {} messages", trace.id, messages.len());

        let prepared = self.prepare(messages).map_err(|e| {
            warn!("Relay {}: rejecting request: {}", trace.id, e);
            e
        })?;

        trace.advance(RelayPhase::UpstreamCallInitiated);
        let upstream = match self.client.stream_chat(&prepared).await {
            Ok(upstream) => upstream,
            Err(e) => {
                trace.advance(RelayPhase::UpstreamCallFailed);
                error!(
                    "Relay {}: upstream call to model {} at {} failed: {}",
                    trace.id,
                    self.client.get_model(),
                    self.client.get_base_url().as_deref().unwrap_or("default endpoint"),
                    e
                );
                return Err(e.into());
            }
        };

        trace.advance(RelayPhase::Streaming);
        Ok(relay_fragments(upstream, trace))
    }
}

fn relay_fragments(upstream: FragmentStream, trace: RequestTrace) -> FragmentStream {
    Box::pin(
        stream::unfold(Some((upstream, trace)), |state| async move {
            let Some((mut upstream, mut trace)) = state else {
                return None;
            };
            loop {
                match upstream.next().await {
                    Some(Ok(fragment)) if fragment.is_empty() => continue,
                    Some(Ok(fragment)) => {
                        trace.fragments += 1;
                        return Some((Ok(fragment), Some((upstream, trace))));
                    }
                    Some(Err(e)) => {
                        trace.advance(RelayPhase::Failed);
                        error!("Relay {}: stream failed after {} fragments: {}", trace.id, trace.fragments, e);
                        return Some((Err(e), None));
                    }
                    None => {
                        trace.advance(RelayPhase::Completed);
                        info!("Relay {}: completed with {} fragments", trace.id, trace.fragments);
                        return None;
                    }
                }
            }
        })
    )
}
