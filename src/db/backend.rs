//! Contracts for the remote collaborators: the identity provider, the profile
//! records it is paired with, and conversation persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::db::models::{Chat, Identity, Message, NewMessage, Tone, User};
use crate::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_in_anonymously(&self) -> Result<Identity>;

    async fn sign_out(&self) -> Result<()>;

    /// Session-change notifications. The current value is the active session.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, uid: &str) -> Result<Option<User>>;

    /// Creates or replaces the profile record.
    async fn put_profile(&self, user: &User) -> Result<User>;

    async fn update_tone(&self, uid: &str, tone: Tone) -> Result<()>;

    /// Counts one message for the current UTC day, restarting from zero on
    /// the first message of a new day. Returns the new counter value.
    async fn increment_usage(&self, uid: &str) -> Result<u32>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Timestamps are assigned server side.
    async fn create_chat(&self, user_id: &str, title: &str) -> Result<Chat>;

    async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()>;

    /// Bumps `updated_at` and returns the stored value.
    async fn touch_chat(&self, chat_id: &str) -> Result<DateTime<Utc>>;

    /// Most recently updated first.
    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>>;

    async fn create_message(&self, message: NewMessage) -> Result<Message>;

    /// Oldest first.
    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>>;
}
