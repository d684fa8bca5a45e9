use super::conversation::Conversation;
use super::transport::{ ClientError, Transport };
use crate::models::chat::ChatMessage;

use futures::StreamExt;
use log::{ debug, warn };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use tokio::sync::Mutex;

/// What changed in the conversation since the last render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<'a> {
    Pushed(&'a ChatMessage),
    Appended(&'a str),
}

/// Render hook, called after every mutation. Views scroll to the newest message.
pub trait View: Send + Sync {
    fn render(&self, change: Change<'_>, conversation: &Conversation);
}

pub struct NoopView;

impl View for NoopView {
    fn render(&self, _change: Change<'_>, _conversation: &Conversation) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyInput,
    InFlight,
    NothingToRetry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Completed,
    Failed(ClientError),
    Ignored(Rejection),
}

struct SessionState {
    conversation: Conversation,
    last_error: Option<ClientError>,
    last_submission: Option<String>,
}

/// Resets the in-flight flag even if the submitting future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatSession {
    transport: Arc<dyn Transport>,
    view: Arc<dyn View>,
    state: Mutex<SessionState>,
    in_flight: AtomicBool,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn Transport>, conversation: Conversation) -> Self {
        Self::with_view(transport, conversation, Arc::new(NoopView))
    }

    pub fn with_view(transport: Arc<dyn Transport>, conversation: Conversation, view: Arc<dyn View>) -> Self {
        Self {
            transport,
            view,
            state: Mutex::new(SessionState {
                conversation,
                last_error: None,
                last_submission: None,
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        if input.trim().is_empty() {
            return SubmitOutcome::Ignored(Rejection::EmptyInput);
        }
        if self.in_flight.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            debug!("Submission rejected, a request is already in flight");
            return SubmitOutcome::Ignored(Rejection::InFlight);
        }
        let _in_flight = InFlight(&self.in_flight);

        let history = {
            let mut state = self.state.lock().await;
            state.last_submission = Some(input.to_string());
            state.last_error = None;

            let mut history = state.conversation.messages();
            history.push(ChatMessage::user(input));
            debug!(
                "Submitting turn, conversation holds {} of {} messages",
                state.conversation.len(),
                state.conversation.capacity()
            );

            self.push(&mut state, ChatMessage::user(input));
            self.push(&mut state, ChatMessage::assistant(""));
            history
        };

        match self.stream_reply(&history).await {
            Ok(()) => SubmitOutcome::Completed,
            Err(e) => {
                warn!("Chat request failed: {}", e);
                let mut state = self.state.lock().await;
                self.push(&mut state, ChatMessage::assistant(e.user_message()));
                state.last_error = Some(e.clone());
                SubmitOutcome::Failed(e)
            }
        }
    }

    /// Repeats the last submission. Only available after a failed attempt.
    pub async fn retry(&self) -> SubmitOutcome {
        let last = {
            let state = self.state.lock().await;
            match (&state.last_error, &state.last_submission) {
                (Some(_), Some(text)) => text.clone(),
                _ => return SubmitOutcome::Ignored(Rejection::NothingToRetry),
            }
        };
        self.submit(&last).await
    }

    async fn stream_reply(&self, history: &[ChatMessage]) -> Result<(), ClientError> {
        let mut fragments = self.transport.send(history).await?;

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            let mut state = self.state.lock().await;
            if state.conversation.append_to_last(&fragment) {
                self.view.render(Change::Appended(&fragment), &state.conversation);
            }
        }
        Ok(())
    }

    fn push(&self, state: &mut SessionState, message: ChatMessage) {
        if state.conversation.push(message) {
            if let Some(last) = state.conversation.last() {
                self.view.render(Change::Pushed(last), &state.conversation);
            }
        }
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.conversation.messages()
    }

    pub async fn last_error(&self) -> Option<ClientError> {
        self.state.lock().await.last_error.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::{ ResponseStream, NETWORK_ERROR_TEXT, UPSTREAM_ERROR_TEXT };
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    /// Hands each request's reply channel to the test.
    struct ChannelTransport {
        requests: mpsc::UnboundedSender<(Vec<ChatMessage>, mpsc::Sender<Result<String, ClientError>>)>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&self, history: &[ChatMessage]) -> Result<ResponseStream, ClientError> {
            let (tx, rx) = mpsc::channel(8);
            self.requests
                .send((history.to_vec(), tx))
                .map_err(|e| ClientError::Other(e.to_string()))?;
            Ok(Box::pin(ReceiverStream::new(rx)))
        }
    }

    struct FailingTransport(ClientError);

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _history: &[ChatMessage]) -> Result<ResponseStream, ClientError> {
            Err(self.0.clone())
        }
    }

    struct ScriptedTransport(Vec<Result<String, ClientError>>);

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _history: &[ChatMessage]) -> Result<ResponseStream, ClientError> {
            Ok(Box::pin(stream::iter(self.0.clone())))
        }
    }

    #[derive(Default)]
    struct RecordingView {
        renders: StdMutex<Vec<usize>>,
    }

    impl View for RecordingView {
        fn render(&self, _change: Change<'_>, conversation: &Conversation) {
            self.renders.lock().unwrap().push(conversation.len());
        }
    }

    fn greeted() -> Conversation {
        Conversation::with_greeting(50, "Hi!")
    }

    #[tokio::test]
    async fn placeholder_fills_with_fragments_in_order() {
        let (req_tx, mut req_rx) = mpsc::unbounded_channel();
        let session = Arc::new(ChatSession::new(Arc::new(ChannelTransport { requests: req_tx }), greeted()));

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("Hello").await })
        };

        let (history, reply) = req_rx.recv().await.unwrap();
        assert_eq!(history, vec![ChatMessage::assistant("Hi!"), ChatMessage::user("Hello")]);
        assert_eq!(session.messages().await, vec![
            ChatMessage::assistant("Hi!"),
            ChatMessage::user("Hello"),
            ChatMessage::assistant(""),
        ]);
        assert!(session.is_in_flight());

        for fragment in ["He", "llo", "!"] {
            reply.send(Ok(fragment.to_string())).await.unwrap();
        }
        drop(reply);

        assert_eq!(task.await.unwrap(), SubmitOutcome::Completed);
        assert_eq!(session.messages().await.last(), Some(&ChatMessage::assistant("Hello!")));
        assert!(!session.is_in_flight());
    }

    #[tokio::test]
    async fn submit_while_in_flight_is_a_no_op() {
        let (req_tx, mut req_rx) = mpsc::unbounded_channel();
        let session = Arc::new(ChatSession::new(Arc::new(ChannelTransport { requests: req_tx }), greeted()));

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("first").await })
        };
        let (_history, reply) = req_rx.recv().await.unwrap();
        let before = session.messages().await.len();

        assert_eq!(session.submit("second").await, SubmitOutcome::Ignored(Rejection::InFlight));
        assert_eq!(session.messages().await.len(), before);

        drop(reply);
        assert_eq!(task.await.unwrap(), SubmitOutcome::Completed);
        assert!(req_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let session = ChatSession::new(Arc::new(ScriptedTransport(Vec::new())), greeted());
        assert_eq!(session.submit("   \n\t").await, SubmitOutcome::Ignored(Rejection::EmptyInput));
        assert_eq!(session.submit("").await, SubmitOutcome::Ignored(Rejection::EmptyInput));
        assert_eq!(session.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn network_failure_appends_network_text() {
        let transport = FailingTransport(ClientError::Network("Network down".to_string()));
        let session = ChatSession::new(Arc::new(transport), greeted());

        let outcome = session.submit("Hello").await;

        assert!(matches!(outcome, SubmitOutcome::Failed(ClientError::Network(_))));
        let messages = session.messages().await;
        assert_eq!(messages.last().map(|m| m.content.as_str()), Some(NETWORK_ERROR_TEXT));
        assert_eq!(messages.len(), 4);
        assert!(session.last_error().await.is_some());
        assert!(!session.is_in_flight());
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_reply() {
        let transport = ScriptedTransport(vec![
            Ok("Par".to_string()),
            Err(ClientError::Network("response interrupted".to_string())),
        ]);
        let session = ChatSession::new(Arc::new(transport), greeted());

        session.submit("Hello").await;

        let messages = session.messages().await;
        assert_eq!(messages[2], ChatMessage::assistant("Par"));
        assert_eq!(messages[3], ChatMessage::assistant(NETWORK_ERROR_TEXT));
    }

    #[tokio::test]
    async fn retry_repeats_last_submission_after_failure_only() {
        let transport = FailingTransport(ClientError::Upstream("HTTP 500".to_string()));
        let session = ChatSession::new(Arc::new(transport), greeted());
        assert_eq!(session.retry().await, SubmitOutcome::Ignored(Rejection::NothingToRetry));

        session.submit("Where is my order?").await;
        let outcome = session.retry().await;

        assert!(matches!(outcome, SubmitOutcome::Failed(ClientError::Upstream(_))));
        let users: Vec<ChatMessage> = session
            .messages().await
            .into_iter()
            .filter(|m| m.role == crate::models::chat::Role::User)
            .collect();
        assert_eq!(users, vec![ChatMessage::user("Where is my order?"); 2]);
        assert_eq!(session.messages().await.last().unwrap().content, UPSTREAM_ERROR_TEXT);
    }

    #[tokio::test]
    async fn success_clears_the_visible_error() {
        let failing = ChatSession::new(
            Arc::new(FailingTransport(ClientError::Other("boom".to_string()))),
            greeted()
        );
        failing.submit("Hello").await;
        assert!(failing.last_error().await.is_some());

        let session = ChatSession::new(Arc::new(ScriptedTransport(vec![Ok("ok".to_string())])), greeted());
        assert_eq!(session.submit("Hello").await, SubmitOutcome::Completed);
        assert_eq!(session.last_error().await, None);
        assert_eq!(session.retry().await, SubmitOutcome::Ignored(Rejection::NothingToRetry));
    }

    #[tokio::test]
    async fn view_renders_after_every_mutation() {
        let view = Arc::new(RecordingView::default());
        let transport = ScriptedTransport(vec![Ok("He".to_string()), Ok("llo".to_string())]);
        let session = ChatSession::with_view(Arc::new(transport), greeted(), view.clone());

        session.submit("Hello").await;

        // user push, placeholder push, two fragments
        assert_eq!(*view.renders.lock().unwrap(), vec![2, 3, 3, 3]);
    }

    #[tokio::test]
    async fn history_stays_bounded_across_turns() {
        let transport = ScriptedTransport(vec![Ok("answer".to_string())]);
        let session = ChatSession::new(Arc::new(transport), Conversation::with_greeting(4, "Hi!"));

        for i in 0..5 {
            session.submit(&format!("question {}", i)).await;
        }

        let messages = session.messages().await;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ChatMessage::user("question 3"));
        assert_eq!(messages[3], ChatMessage::assistant("answer"));
    }
}
