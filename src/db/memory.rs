//! In-process backends. Used for offline/guest development builds and as the
//! reference behaviour the remote backends are tested against.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::backend::{ConversationStore, IdentityProvider, ProfileStore};
use crate::db::models::{Chat, Identity, Message, NewMessage, Tone, User};
use crate::error::{AppError, AuthError, StoreError};
use crate::Result;

const MIN_PASSWORD_LEN: usize = 6;

/// Hands out strictly increasing timestamps, so two writes issued back to back
/// never compare equal.
#[derive(Debug)]
struct ServerClock {
    last: Mutex<DateTime<Utc>>,
}

impl ServerClock {
    fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::from(std::time::UNIX_EPOCH)),
        }
    }

    async fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().await;
        let now = Utc::now();
        let next = if now > *last {
            now
        } else {
            *last + Duration::microseconds(1)
        };
        *last = next;
        next
    }
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    password_hash: String,
}

fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

pub struct MemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    session: watch::Sender<Option<Identity>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts: RwLock::new(HashMap::new()),
            session,
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn publish(&self, identity: Option<Identity>) {
        self.session.send_replace(identity);
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(AuthError::Provider("The email address is badly formatted".into()).into());
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Provider("Password should be at least 6 characters".into()).into());
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(AuthError::EmailInUse.into());
        }

        let account = Account {
            uid: Uuid::new_v4().simple().to_string(),
            password_hash: hash_password(password),
        };
        let identity = Identity {
            uid: account.uid.clone(),
            email: Some(email.clone()),
        };
        accounts.insert(email, account);
        drop(accounts);

        info!("Created account {}", identity.uid);
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let email = email.trim().to_lowercase();
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&email)
            .filter(|a| a.password_hash == hash_password(password))
            .ok_or(AuthError::InvalidCredentials)?;

        let identity = Identity {
            uid: account.uid.clone(),
            email: Some(email),
        };
        drop(accounts);

        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_anonymously(&self) -> Result<Identity> {
        let identity = Identity {
            uid: Uuid::new_v4().simple().to_string(),
            email: None,
        };
        info!("Started anonymous session {}", identity.uid);
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        self.publish(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

/// Profile and conversation records held in memory.
pub struct MemoryBackend {
    profiles: RwLock<HashMap<String, User>>,
    chats: RwLock<HashMap<String, Chat>>,
    messages: RwLock<Vec<Message>>,
    /// UTC day each profile's `daily_usage` counts for.
    usage_days: RwLock<HashMap<String, NaiveDate>>,
    clock: ServerClock,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            chats: RwLock::new(HashMap::new()),
            messages: RwLock::new(Vec::new()),
            usage_days: RwLock::new(HashMap::new()),
            clock: ServerClock::new(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    async fn increment_usage_on(&self, uid: &str, today: NaiveDate) -> Result<u32> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles.get_mut(uid).ok_or(AuthError::ProfileNotFound)?;
        let mut days = self.usage_days.write().await;
        if days.insert(uid.to_string(), today).map_or(false, |day| day != today) {
            debug!("Usage day rolled over for {}", uid);
            profile.daily_usage = 0;
        }
        profile.daily_usage += 1;
        Ok(profile.daily_usage)
    }

    pub async fn message_count(&self, chat_id: &str) -> usize {
        self.messages
            .read()
            .await
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .count()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn get_profile(&self, uid: &str) -> Result<Option<User>> {
        Ok(self.profiles.read().await.get(uid).cloned())
    }

    async fn put_profile(&self, user: &User) -> Result<User> {
        let mut stored = user.clone();
        stored.created_at = self.clock.now().await;
        self.profiles
            .write()
            .await
            .insert(stored.uid.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_tone(&self, uid: &str, tone: Tone) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles.get_mut(uid).ok_or(AuthError::ProfileNotFound)?;
        profile.selected_tone = tone;
        Ok(())
    }

    async fn increment_usage(&self, uid: &str) -> Result<u32> {
        self.increment_usage_on(uid, Utc::now().date_naive()).await
    }
}

#[async_trait]
impl ConversationStore for MemoryBackend {
    async fn create_chat(&self, user_id: &str, title: &str) -> Result<Chat> {
        let now = self.clock.now().await;
        let chat = Chat {
            chat_id: Uuid::new_v4().simple().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.chats
            .write()
            .await
            .insert(chat.chat_id.clone(), chat.clone());
        debug!("Created chat {} for {}", chat.chat_id, user_id);
        Ok(chat)
    }

    async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .get_mut(chat_id)
            .ok_or_else(|| StoreError::ChatNotFound(chat_id.to_string()))?;
        chat.title = title.to_string();
        Ok(())
    }

    async fn touch_chat(&self, chat_id: &str) -> Result<DateTime<Utc>> {
        let now = self.clock.now().await;
        let mut chats = self.chats.write().await;
        let chat = chats
            .get_mut(chat_id)
            .ok_or_else(|| StoreError::ChatNotFound(chat_id.to_string()))?;
        chat.updated_at = now;
        Ok(now)
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>> {
        let mut chats: Vec<Chat> = self
            .chats
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message> {
        if !self.chats.read().await.contains_key(&message.chat_id) {
            return Err(AppError::StoreError(StoreError::ChatNotFound(message.chat_id)));
        }

        let stored = Message {
            message_id: Uuid::new_v4().simple().to_string(),
            chat_id: message.chat_id,
            sender: message.sender,
            content: message.content,
            timestamp: self.clock.now().await,
            is_voice: message.is_voice,
        };
        self.messages.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Sender;

    #[tokio::test]
    async fn test_clock_is_strictly_increasing() {
        let clock = ServerClock::new();
        let mut previous = clock.now().await;
        for _ in 0..1000 {
            let next = clock.now().await;
            assert!(next > previous);
            previous = next;
        }
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let provider = MemoryIdentityProvider::new();
        let created = provider.create_account("Ada@Example.com", "secret1").await.unwrap();

        let signed_in = provider.sign_in("ada@example.com", "secret1").await.unwrap();
        assert_eq!(signed_in.uid, created.uid);

        let err = provider.sign_in("ada@example.com", "wrong!!").await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::InvalidCredentials)));

        let err = provider.create_account("ada@example.com", "another1").await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::EmailInUse)));
    }

    #[tokio::test]
    async fn test_session_notifications() {
        let provider = MemoryIdentityProvider::new();
        let mut rx = provider.subscribe();
        assert!(rx.borrow().is_none());

        let guest = provider.sign_in_anonymously().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref(), Some(&guest));

        provider.sign_out().await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_chats_are_listed_by_recency() {
        let backend = MemoryBackend::new();
        let first = backend.create_chat("u1", "first").await.unwrap();
        let second = backend.create_chat("u1", "second").await.unwrap();
        backend.create_chat("u2", "someone else").await.unwrap();

        let chats = backend.list_chats("u1").await.unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].chat_id, second.chat_id);

        backend.touch_chat(&first.chat_id).await.unwrap();
        let chats = backend.list_chats("u1").await.unwrap();
        assert_eq!(chats[0].chat_id, first.chat_id);
    }

    #[tokio::test]
    async fn test_messages_require_a_chat() {
        let backend = MemoryBackend::new();
        let err = backend
            .create_message(NewMessage::user("missing", "hi", false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreError(StoreError::ChatNotFound(_))));

        let chat = backend.create_chat("u1", "t").await.unwrap();
        let user = backend
            .create_message(NewMessage::user(&chat.chat_id, "hi", true))
            .await
            .unwrap();
        let ai = backend
            .create_message(NewMessage::ai(&chat.chat_id, "hello"))
            .await
            .unwrap();
        assert!(user.timestamp < ai.timestamp);
        assert!(user.is_voice);

        let listed = backend.list_messages(&chat.chat_id).await.unwrap();
        let senders: Vec<Sender> = listed.iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::User, Sender::Ai]);
    }

    #[tokio::test]
    async fn test_usage_counter() {
        let backend = MemoryBackend::new();
        let identity = Identity { uid: "u1".into(), email: None };
        backend.put_profile(&User::new(&identity, Tone::Friendly)).await.unwrap();

        assert_eq!(backend.increment_usage("u1").await.unwrap(), 1);
        assert_eq!(backend.increment_usage("u1").await.unwrap(), 2);
        assert!(backend.increment_usage("nobody").await.is_err());
    }

    #[tokio::test]
    async fn test_usage_counter_restarts_each_day() {
        let backend = MemoryBackend::new();
        let identity = Identity { uid: "u1".into(), email: None };
        backend.put_profile(&User::new(&identity, Tone::Friendly)).await.unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let tuesday = monday.succ_opt().unwrap();

        assert_eq!(backend.increment_usage_on("u1", monday).await.unwrap(), 1);
        assert_eq!(backend.increment_usage_on("u1", monday).await.unwrap(), 2);
        assert_eq!(backend.increment_usage_on("u1", tuesday).await.unwrap(), 1);
        assert_eq!(backend.get_profile("u1").await.unwrap().unwrap().daily_usage, 1);
    }
}
