use chrono::{DateTime, Utc};
use futures::future::{AbortHandle, Abortable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::completion::{CompletionClient, CompletionRequest};
use crate::db::backend::ConversationStore;
use crate::db::models::{Chat, Message, NewMessage, Tone};
use crate::error::AppError;
use crate::Result;

pub const TITLE_MAX_CHARS: usize = 50;
pub const NEW_CHAT_TITLE: &str = "New Chat";
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_MESSAGE_LENGTH: usize = 1000;

/// Title for a chat opened by `content`: its first 50 characters, with an
/// ellipsis when anything was cut.
pub fn chat_title(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() > TITLE_MAX_CHARS {
        let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
        title.push_str("...");
        title
    } else {
        content.to_string()
    }
}

/// A send that failed after some of its writes reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedTurn {
    pub chat_id: String,
    pub chat_created: bool,
    pub user_message: Option<Message>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub chats: Vec<Chat>,
    /// `None` means the next send opens a new conversation.
    pub active_chat: Option<Chat>,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub is_sending: bool,
    pub error: Option<String>,
    pub last_failed_turn: Option<FailedTurn>,
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub content: String,
    pub chat_id: Option<String>,
    pub user_id: String,
    pub tone: Tone,
    pub is_voice: bool,
}

impl SendRequest {
    pub fn new(content: impl Into<String>, user_id: impl Into<String>, tone: Tone) -> Self {
        Self {
            content: content.into(),
            chat_id: None,
            user_id: user_id.into(),
            tone,
            is_voice: false,
        }
    }

    pub fn in_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn voice(mut self, is_voice: bool) -> Self {
        self.is_voice = is_voice;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub chat_id: String,
    pub user_message: Message,
    pub ai_message: Message,
    pub is_new_chat: bool,
}

#[derive(Default)]
struct SendProgress {
    chat_id: Option<String>,
    created_chat: Option<Chat>,
    user_message: Option<Message>,
}

impl SendProgress {
    fn into_failed_turn(self) -> Option<FailedTurn> {
        let chat_created = self.created_chat.is_some();
        if !chat_created && self.user_message.is_none() {
            return None;
        }
        Some(FailedTurn {
            chat_id: self.chat_id?,
            chat_created,
            user_message: self.user_message,
        })
    }
}

struct InFlight {
    send_id: u64,
    handle: AbortHandle,
}

struct Completed {
    outcome: SendOutcome,
    new_chat: Option<Chat>,
    updated_at: DateTime<Utc>,
}

/// Owns the conversation list, the active conversation and its messages.
/// All mutation goes through these methods; readers take snapshots or
/// subscribe to changes.
pub struct ChatStore {
    conversations: Arc<dyn ConversationStore>,
    completion: Arc<dyn CompletionClient>,
    state: watch::Sender<ChatState>,
    in_flight: Mutex<Option<InFlight>>,
    next_send: AtomicU64,
    /// Bumped by `reset`; sends started under an older value never write back.
    generation: AtomicU64,
    send_timeout: Duration,
    max_message_length: usize,
}

impl ChatStore {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self {
            conversations,
            completion,
            state,
            in_flight: Mutex::new(None),
            next_send: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn is_sending(&self) -> bool {
        self.state.borrow().is_sending
    }

    pub fn active_chat_id(&self) -> Option<String> {
        self.state.borrow().active_chat.as_ref().map(|c| c.chat_id.clone())
    }

    fn validate_content<'a>(&self, content: &'a str) -> Result<&'a str> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::validation("Message cannot be empty"));
        }
        if content.chars().count() > self.max_message_length {
            return Err(AppError::validation(format!(
                "Message is too long (max {} characters)",
                self.max_message_length
            )));
        }
        Ok(content)
    }

    /// Create chat if needed, persist the user message, ask the completion
    /// endpoint, persist the reply, bump the chat. Local state only changes
    /// once the whole sequence has succeeded.
    pub async fn send_message(&self, request: SendRequest) -> Result<SendOutcome> {
        let content = match self.validate_content(&request.content) {
            Ok(content) => content.to_string(),
            Err(e) => {
                self.state.send_modify(|s| s.error = Some(e.to_string()));
                return Err(e);
            }
        };

        // Claim and abort registration share one critical section.
        let (abort, registration) = AbortHandle::new_pair();
        let send_id = self.next_send.fetch_add(1, Ordering::Relaxed);
        let mut generation = 0;
        {
            let mut in_flight = self.in_flight.lock().await;
            let claimed = self.state.send_if_modified(|s| {
                if s.is_sending {
                    return false;
                }
                s.is_sending = true;
                s.error = None;
                s.last_failed_turn = None;
                generation = self.generation.load(Ordering::SeqCst);
                true
            });
            if !claimed {
                warn!("Rejected send while another message is in flight");
                return Err(AppError::validation("A message is already being sent"));
            }
            *in_flight = Some(InFlight {
                send_id,
                handle: abort,
            });
        }

        // Prior turns of the active conversation are already local.
        let local_history = {
            let state = self.state.borrow();
            match (&request.chat_id, &state.active_chat) {
                (Some(id), Some(active)) if *id == active.chat_id => Some(state.messages.clone()),
                _ => None,
            }
        };

        let mut progress = SendProgress::default();
        let result = tokio::time::timeout(
            self.send_timeout,
            Abortable::new(
                self.run_send(&request, &content, local_history, &mut progress),
                registration,
            ),
        )
        .await;
        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.as_ref().map_or(false, |f| f.send_id == send_id) {
                in_flight.take();
            }
        }

        let result = match result {
            Err(_) => Err(AppError::Timeout(self.send_timeout)),
            Ok(Err(_aborted)) => Err(AppError::Aborted),
            Ok(Ok(inner)) => inner,
        };

        match result {
            Ok(completed) => {
                let outcome = completed.outcome.clone();
                self.commit_send(completed, generation);
                info!(
                    "Sent message to chat {} (new chat: {})",
                    outcome.chat_id, outcome.is_new_chat
                );
                Ok(outcome)
            }
            Err(e) => {
                error!("Send failed: {}", e);
                let failed_turn = progress.into_failed_turn();
                if let Some(turn) = &failed_turn {
                    warn!(
                        "Chat {} holds an unanswered turn (chat created: {})",
                        turn.chat_id, turn.chat_created
                    );
                }
                let message = e.to_string();
                let written = self.state.send_if_modified(|s| {
                    if self.is_stale(generation) {
                        return false;
                    }
                    s.is_sending = false;
                    s.error = Some(message);
                    s.last_failed_turn = failed_turn;
                    true
                });
                if !written {
                    debug!("Store was reset during the send, dropping its failure");
                }
                Err(e)
            }
        }
    }

    async fn run_send(
        &self,
        request: &SendRequest,
        content: &str,
        local_history: Option<Vec<Message>>,
        progress: &mut SendProgress,
    ) -> Result<Completed> {
        let (chat_id, new_chat) = match &request.chat_id {
            Some(id) => (id.clone(), None),
            None => {
                let chat = self
                    .conversations
                    .create_chat(&request.user_id, &chat_title(content))
                    .await?;
                progress.created_chat = Some(chat.clone());
                (chat.chat_id.clone(), Some(chat))
            }
        };
        progress.chat_id = Some(chat_id.clone());

        let history = match (&new_chat, local_history) {
            (Some(_), _) => Vec::new(),
            (None, Some(history)) => history,
            (None, None) => self.conversations.list_messages(&chat_id).await?,
        };

        let user_message = self
            .conversations
            .create_message(NewMessage::user(&chat_id, content, request.is_voice))
            .await?;
        progress.user_message = Some(user_message.clone());

        debug!("Requesting completion with {} prior turns", history.len());
        let reply = self
            .completion
            .complete(CompletionRequest::for_conversation(request.tone, &history, content))
            .await?;

        let ai_message = self
            .conversations
            .create_message(NewMessage::ai(&chat_id, &reply))
            .await?;

        // The reply is stored; a failed bump only leaves the list order stale.
        let updated_at = match self.conversations.touch_chat(&chat_id).await {
            Ok(at) => at,
            Err(e) => {
                warn!("Failed to bump chat {}: {}", chat_id, e);
                ai_message.timestamp
            }
        };

        Ok(Completed {
            outcome: SendOutcome {
                chat_id,
                user_message,
                ai_message,
                is_new_chat: new_chat.is_some(),
            },
            new_chat,
            updated_at,
        })
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn commit_send(&self, completed: Completed, generation: u64) {
        let Completed {
            outcome,
            new_chat,
            updated_at,
        } = completed;

        let written = self.state.send_if_modified(|s| {
            if self.is_stale(generation) {
                return false;
            }
            s.is_sending = false;

            if let Some(mut chat) = new_chat {
                chat.updated_at = updated_at;
                s.chats.insert(0, chat.clone());
                s.active_chat = Some(chat);
                s.messages.clear();
            } else {
                if let Some(chat) = s.chats.iter_mut().find(|c| c.chat_id == outcome.chat_id) {
                    chat.updated_at = updated_at;
                }
                if let Some(active) = s.active_chat.as_mut() {
                    if active.chat_id == outcome.chat_id {
                        active.updated_at = updated_at;
                    }
                }
            }

            let shows_chat = s
                .active_chat
                .as_ref()
                .map_or(false, |a| a.chat_id == outcome.chat_id);
            if shows_chat {
                s.messages.push(outcome.user_message.clone());
                s.messages.push(outcome.ai_message.clone());
            }
            true
        });
        if !written {
            debug!("Store was reset during the send, dropping chat {}", outcome.chat_id);
        }
    }

    /// Cancels the in-flight send, if any.
    pub async fn abort_send(&self) -> bool {
        match self.in_flight.lock().await.take() {
            Some(in_flight) => {
                info!("Aborting in-flight send");
                in_flight.handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn fetch_chats(&self, user_id: &str) -> Result<Vec<Chat>> {
        self.begin_loading();
        match self.conversations.list_chats(user_id).await {
            Ok(chats) => {
                debug!("Loaded {} chats for {}", chats.len(), user_id);
                self.state.send_modify(|s| {
                    s.is_loading = false;
                    s.chats = chats.clone();
                });
                Ok(chats)
            }
            Err(e) => Err(self.fail_loading(e)),
        }
    }

    pub async fn fetch_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        self.begin_loading();
        match self.conversations.list_messages(chat_id).await {
            Ok(mut messages) => {
                messages.sort_by_key(|m| m.timestamp);
                self.state.send_modify(|s| {
                    s.is_loading = false;
                    s.messages = messages.clone();
                });
                Ok(messages)
            }
            Err(e) => Err(self.fail_loading(e)),
        }
    }

    fn begin_loading(&self) {
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    fn fail_loading(&self, e: AppError) -> AppError {
        error!("Load failed: {}", e);
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.error = Some(e.to_string());
        });
        e
    }

    pub fn set_active_chat(&self, chat: Option<Chat>) {
        self.state.send_modify(|s| {
            s.active_chat = chat;
            s.messages.clear();
            s.last_failed_turn = None;
        });
    }

    pub async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            let e = AppError::validation("Title cannot be empty");
            self.state.send_modify(|s| s.error = Some(e.to_string()));
            return Err(e);
        }

        if let Err(e) = self.conversations.rename_chat(chat_id, title).await {
            error!("Rename of chat {} failed: {}", chat_id, e);
            self.state.send_modify(|s| s.error = Some(e.to_string()));
            return Err(e);
        }

        self.state.send_modify(|s| {
            if let Some(chat) = s.chats.iter_mut().find(|c| c.chat_id == chat_id) {
                chat.title = title.to_string();
            }
            if let Some(active) = s.active_chat.as_mut() {
                if active.chat_id == chat_id {
                    active.title = title.to_string();
                }
            }
        });
        Ok(())
    }

    /// Opens an empty conversation titled "New Chat" and makes it active.
    pub async fn create_chat(&self, user_id: &str) -> Result<Chat> {
        match self.conversations.create_chat(user_id, NEW_CHAT_TITLE).await {
            Ok(chat) => {
                self.state.send_modify(|s| {
                    s.chats.insert(0, chat.clone());
                    s.active_chat = Some(chat.clone());
                    s.messages.clear();
                });
                Ok(chat)
            }
            Err(e) => {
                self.state.send_modify(|s| s.error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn add_optimistic_message(&self, message: Message) {
        self.state.send_modify(|s| s.messages.push(message));
    }

    pub fn clear_messages(&self) {
        self.state.send_modify(|s| s.messages.clear());
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }

    /// Drops everything, e.g. on sign-out. A send still running when this
    /// is called finishes without touching the new state.
    pub fn reset(&self) {
        self.state.send_modify(|s| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *s = ChatState::default();
        });
    }

    /// Surfaces a failure raised before the store was reached, e.g. a send
    /// refused by the usage gate.
    pub(crate) fn record_failure(&self, e: AppError) -> AppError {
        warn!("Chat intent refused: {}", e);
        self.state.send_modify(|s| s.error = Some(e.to_string()));
        e
    }
}
