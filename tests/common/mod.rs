#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use futures::stream;
use std::net::SocketAddr;
use std::sync::{ Arc, Mutex };
use support_chat::config::prompt::PromptConfig;
use support_chat::llm::chat::{ ChatClient, ChatError, FragmentStream };
use support_chat::models::chat::ChatMessage;
use support_chat::relay::Relay;

pub enum Script {
    Fragments(Vec<&'static str>),
    FailAfter(Vec<&'static str>),
    Refuse,
}

/// Upstream stand-in that replays a fixed script and records what it was sent.
pub struct ScriptedClient {
    script: Script,
    pub seen: Mutex<Vec<ChatMessage>>,
}

impl ScriptedClient {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self { script, seen: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, ChatError> {
        *self.seen.lock().unwrap() = messages.to_vec();
        let items: Vec<Result<String, ChatError>> = match &self.script {
            Script::Fragments(parts) => parts.iter().map(|p| Ok(p.to_string())).collect(),
            Script::FailAfter(parts) => {
                let mut items: Vec<Result<String, ChatError>> = parts
                    .iter()
                    .map(|p| Ok(p.to_string()))
                    .collect();
                items.push(Err(ChatError::Truncated));
                items
            }
            Script::Refuse => {
                return Err(ChatError::Status { status: 401, body: "invalid api key".to_string() });
            }
        };
        Ok(Box::pin(stream::iter(items)))
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

pub fn relay_for(client: Arc<ScriptedClient>) -> Relay {
    Relay::new(client, Arc::new(PromptConfig::default()))
}

pub async fn spawn_app(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
