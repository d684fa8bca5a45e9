pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::debug;
use reqwest::Client as HttpClient;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;

/// Bound on fragments buffered between the upstream reader and the consumer.
pub const FRAGMENT_CHANNEL_CAPACITY: usize = 32;

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid chat client configuration: {0}")]
    Config(String),
    #[error("upstream request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream body read failed: {0}")]
    Body(String),
    #[error("upstream reported an error: {0}")]
    Upstream(String),
    #[error("upstream closed the stream before signalling completion")]
    Truncated,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Opens a streamed completion for `messages`.
    ///
    /// Resolves once the upstream has accepted the request, so connection and status
    /// failures surface here rather than as the first stream item.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, ChatError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, ChatError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// What a provider's line parser made of one line of the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Fragment(String),
    Done,
    Failed(String),
    Skip,
}

/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let line = std::mem::replace(&mut self.pending, rest);
            lines.push(decode_line(&line[..pos]));
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(decode_line(&line))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

pub async fn http_stream_generate(
    http: &HttpClient,
    url: &str,
    payload: &(impl serde::Serialize + Sync),
    line_parser: fn(&str) -> LineEvent,
    headers: Option<Vec<(String, String)>>,
) -> Result<FragmentStream, ChatError> {
    let mut req = http.post(url).json(payload);

    if let Some(header_list) = headers {
        for (name, value) in header_list {
            req = req.header(name, value);
        }
    }

    let resp = req.send().await.map_err(ChatError::Request)?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ChatError::Status { status: status.as_u16(), body });
    }

    Ok(pump_lines(resp.bytes_stream(), line_parser))
}

/// Spawns the producer half of the fragment pipe and returns the consumer half.
pub fn pump_lines<S, B, E>(stream: S, line_parser: fn(&str) -> LineEvent) -> FragmentStream
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static
{
    let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        let mut lines = LineBuffer::default();

        while let Some(chunk_result) = stream.next().await {
            match chunk_result {
                Ok(chunk) => {
                    for line in lines.push(chunk.as_ref()) {
                        if !forward(line_parser(&line), &tx).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(ChatError::Body(e.to_string()))).await;
                    return;
                }
            }
        }

        if let Some(line) = lines.finish() {
            if !forward(line_parser(&line), &tx).await {
                return;
            }
        }
        let _ = tx.send(Err(ChatError::Truncated)).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Returns false once the pipe is finished, either by the upstream or by the consumer.
async fn forward(event: LineEvent, tx: &mpsc::Sender<Result<String, ChatError>>) -> bool {
    match event {
        LineEvent::Fragment(text) => {
            if tx.send(Ok(text)).await.is_err() {
                debug!("Fragment consumer went away, dropping upstream response");
                return false;
            }
            true
        }
        LineEvent::Done => false,
        LineEvent::Failed(message) => {
            let _ = tx.send(Err(ChatError::Upstream(message))).await;
            false
        }
        LineEvent::Skip => true,
    }
}
