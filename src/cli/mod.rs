use clap::{ Args as ClapArgs, Parser, Subcommand };

use crate::client::conversation::{ DEFAULT_GREETING, MAX_MESSAGES };
use crate::llm::{ LlmConfig, LlmType, ParseLlmTypeError };
use crate::server::TlsPaths;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the chat relay and serve the browser widget.
    Serve(ServeArgs),
    /// Chat with a running relay from the terminal.
    Chat(ChatArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the relay to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider. Falls back to OPENAI_API_KEY.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Optional JSON file overriding the per-language system instructions.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl ServeArgs {
    pub fn api_key(&self) -> Option<String> {
        Some(self.chat_api_key.clone())
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()))
    }

    pub fn llm_config(&self) -> Result<LlmConfig, ParseLlmTypeError> {
        Ok(LlmConfig {
            llm_type: self.chat_llm_type.parse::<LlmType>()?,
            api_key: self.api_key(),
            completion_model: self.chat_model.clone(),
            base_url: self.chat_base_url.clone(),
        })
    }

    pub fn tls_paths(&self) -> Result<Option<TlsPaths>, String> {
        if !self.enable_tls {
            return Ok(None);
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert_path), Some(key_path)) =>
                Ok(Some(TlsPaths { cert_path: cert_path.clone(), key_path: key_path.clone() })),
            (Some(_), None) | (None, Some(_)) => {
                Err("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".to_string())
            }
            (None, None) => Err("--enable-tls was set but no certificate/key paths provided.".to_string()),
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChatArgs {
    /// Base URL of the relay to talk to.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:3000")]
    pub relay_url: String,

    /// Number of most recent messages kept in the conversation.
    #[arg(long, env = "MAX_MESSAGES", default_value_t = MAX_MESSAGES)]
    pub max_messages: usize,

    /// Assistant greeting a new conversation starts with.
    #[arg(long, env = "GREETING", default_value = DEFAULT_GREETING)]
    pub greeting: String,
}
