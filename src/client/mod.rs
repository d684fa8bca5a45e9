pub mod conversation;
pub mod session;
pub mod terminal;
pub mod transport;

pub use conversation::{ Conversation, DEFAULT_GREETING, MAX_MESSAGES };
pub use session::{ Change, ChatSession, Rejection, SubmitOutcome, View };
pub use transport::{ ClientError, HttpTransport, Transport };
