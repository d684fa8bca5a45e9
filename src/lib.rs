pub mod cli;
pub mod client;
pub mod config;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;

use cli::{ Args, Command, ServeArgs };
use config::prompt::{ load_prompts, PromptConfig };
use llm::chat::new_client as new_chat_client;
use log::info;
use relay::Relay;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match &args.command {
        Command::Serve(serve) => run_relay(serve).await,
        Command::Chat(chat) => client::terminal::run(chat).await,
    }
}

async fn run_relay(args: &ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let chat_config = args.llm_config()?;
    let tls = args.tls_paths()?;

    info!("--- Relay Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", chat_config.llm_type);
    info!("Chat Model: {}", chat_config.completion_model.as_deref().unwrap_or("adapter default"));
    info!("Chat Base URL: {}", chat_config.base_url.as_deref().unwrap_or("adapter default"));
    info!("Chat API Key set: {}", chat_config.api_key.is_some());
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("TLS Enabled: {}", tls.is_some());
    info!("---------------------------");

    let prompts = match &args.prompts_path {
        Some(path) => load_prompts(path)?,
        None => PromptConfig::default(),
    };
    let chat_client = new_chat_client(&chat_config)?;
    let relay = Relay::new(chat_client, Arc::new(prompts));

    let server = Server::new(args.server_addr.clone(), relay, tls);
    server.run().await
}
