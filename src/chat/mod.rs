//! Conversation state: chats, the active chat, its messages, and the
//! send / fetch / rename intents that mutate them.

mod store;

pub use store::{
    chat_title, ChatState, ChatStore, FailedTurn, SendOutcome, SendRequest, NEW_CHAT_TITLE,
    TITLE_MAX_CHARS,
};
