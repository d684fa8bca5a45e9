use super::conversation::Conversation;
use super::session::{ Change, ChatSession, Rejection, SubmitOutcome, View };
use super::transport::HttpTransport;
use crate::cli::ChatArgs;
use crate::models::chat::Role;

use log::info;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{ AsyncBufReadExt, BufReader };

const RETRY_COMMAND: &str = "/retry";
const QUIT_COMMAND: &str = "/quit";

/// Prints assistant output as it grows; the terminal scrolls on its own.
pub struct TerminalView;

impl View for TerminalView {
    fn render(&self, change: Change<'_>, _conversation: &Conversation) {
        let mut out = std::io::stdout().lock();
        let _ = match change {
            Change::Pushed(message) if message.role == Role::Assistant => {
                write!(out, "\nassistant> {}", message.content)
            }
            Change::Pushed(_) => Ok(()),
            Change::Appended(text) => write!(out, "{}", text),
        };
        let _ = out.flush();
    }
}

pub async fn run(args: &ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let transport = HttpTransport::new(&args.relay_url);
    info!("Chatting with relay at {}", transport.endpoint());

    let conversation = Conversation::with_greeting(args.max_messages, args.greeting.clone());
    println!("assistant> {}", args.greeting);
    println!("(type {} after a failure, {} to leave)", RETRY_COMMAND, QUIT_COMMAND);

    let session = ChatSession::with_view(Arc::new(transport), conversation, Arc::new(TerminalView));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nyou> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let outcome = match line.trim() {
            QUIT_COMMAND => break,
            RETRY_COMMAND => session.retry().await,
            _ => session.submit(&line).await,
        };

        match outcome {
            SubmitOutcome::Completed => println!(),
            SubmitOutcome::Failed(_) => println!("\n(type {} to try again)", RETRY_COMMAND),
            SubmitOutcome::Ignored(Rejection::NothingToRetry) => println!("nothing to retry"),
            SubmitOutcome::Ignored(_) => {}
        }
    }

    Ok(())
}
