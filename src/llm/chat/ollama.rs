use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ http_stream_generate, ChatClient, ChatError, FragmentStream, LineEvent };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct StreamMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| "cogito:3b".to_string());
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url,
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ChatError> {
        if config.llm_type != LlmType::Ollama {
            return Err(ChatError::Config("Invalid config type for OllamaClient".into()));
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }
}

/// Parses one newline-delimited JSON object of an `/api/chat` stream.
pub fn parse_ndjson_line(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }

    match serde_json::from_str::<StreamResponse>(line) {
        Ok(StreamResponse { error: Some(error), .. }) => LineEvent::Failed(error),
        Ok(stream_resp) => {
            match stream_resp.message {
                Some(message) if !message.content.is_empty() => LineEvent::Fragment(message.content),
                _ if stream_resp.done => LineEvent::Done,
                _ => LineEvent::Skip,
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for line: {}", e, line);
            LineEvent::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, ChatError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let req = ChatRequest {
            model: &self.completion_model,
            messages,
            stream: true,
        };

        http_stream_generate(&self.http, &url, &req, parse_ndjson_line, None).await
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
