use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ http_stream_generate, ChatClient, ChatError, FragmentStream, LineEvent };
use crate::llm::LlmConfig;
use crate::models::chat::ChatMessage;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    #[serde(rename = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamError {
    error: OpenAIErrorBody,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    message: String,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, ChatError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url = base_url.unwrap_or_else(|| DEFAULT_URL.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| ChatError::Config(format!("Invalid API key format: {}", e)))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ChatError::Config(e.to_string()))?;

        Ok(Self {
            http,
            model: chat_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ChatError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ChatError::Config("OpenAI API key is required".to_string()))?;

        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }
}

/// Parses one server-sent-events line of a chat completions stream.
pub fn parse_sse_line(line: &str) -> LineEvent {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // blank separators, comments and `event:` lines
        return LineEvent::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return LineEvent::Done;
    }

    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(stream_resp) => {
            let Some(choice) = stream_resp.choices.into_iter().next() else {
                return LineEvent::Skip;
            };
            match choice.delta.content {
                Some(content) if !content.is_empty() => LineEvent::Fragment(content),
                _ if choice.finish_reason.as_deref() == Some("stop") => LineEvent::Done,
                _ => LineEvent::Skip,
            }
        }
        Err(e) => {
            if let Ok(err) = serde_json::from_str::<OpenAIStreamError>(data) {
                return LineEvent::Failed(err.error.message);
            }
            debug!("JSON parse error: {} for data: {}", e, data);
            LineEvent::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, ChatError> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OpenAIMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            stream: true,
        };

        http_stream_generate(&self.http, &self.base_url, &req, parse_sse_line, None).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
