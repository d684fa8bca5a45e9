use crate::models::chat::ChatMessage;

use async_trait::async_trait;
use futures::{ stream, Stream, StreamExt };
use log::debug;
use reqwest::Client as HttpClient;
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

pub const NETWORK_ERROR_TEXT: &str = "Network issue. Please check your connection.";
pub const UPSTREAM_ERROR_TEXT: &str = "API error. Please try again later.";
pub const OTHER_ERROR_TEXT: &str = "An unexpected error occurred.";

/// Transport failure, tagged where it happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("relay error: {0}")]
    Upstream(String),
    #[error("unexpected error: {0}")]
    Other(String),
}

impl ClientError {
    /// Text shown to the user as an assistant message.
    pub fn user_message(&self) -> &'static str {
        match self {
            ClientError::Network(_) => NETWORK_ERROR_TEXT,
            ClientError::Upstream(_) => UPSTREAM_ERROR_TEXT,
            ClientError::Other(_) => OTHER_ERROR_TEXT,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ClientError::Other(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts `history` to the relay and returns the reply body as decoded text fragments.
    async fn send(&self, history: &[ChatMessage]) -> Result<ResponseStream, ClientError>;
}

pub struct HttpTransport {
    http: HttpClient,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(relay_url: &str) -> Self {
        Self::with_client(HttpClient::new(), relay_url)
    }

    pub fn with_client(http: HttpClient, relay_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/api/chat", relay_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, history: &[ChatMessage]) -> Result<ResponseStream, ClientError> {
        debug!("Posting {} messages to {}", history.len(), self.endpoint);
        let resp = self.http.post(&self.endpoint).json(history).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Upstream(format!("HTTP {}: {}", status.as_u16(), body.trim())));
        }

        Ok(decode_body(resp.bytes_stream()))
    }
}

/// Incremental UTF-8 decoder that carries incomplete trailing sequences to the next chunk.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - rest.len();
        self.pending.drain(..consumed);
        out
    }

    /// Flushes bytes left over when the body ended mid-character.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&tail).into_owned())
    }
}

struct BodyState<S> {
    body: Pin<Box<S>>,
    decoder: Utf8Decoder,
}

pub fn decode_body<S, B, E>(body: S) -> ResponseStream
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static
{
    let state = BodyState { body: Box::pin(body), decoder: Utf8Decoder::default() };

    Box::pin(
        stream::unfold(Some(state), |state| async move {
            let Some(mut state) = state else {
                return None;
            };
            loop {
                match state.body.next().await {
                    Some(Ok(chunk)) => {
                        let text = state.decoder.decode(chunk.as_ref());
                        if !text.is_empty() {
                            return Some((Ok(text), Some(state)));
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(ClientError::Network(format!("response interrupted: {}", e))), None));
                    }
                    None => {
                        return state.decoder.finish().map(|tail| (Ok(tail), None));
                    }
                }
            }
        })
    )
}
