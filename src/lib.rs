pub mod auth;
pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod preferences;
pub mod setup;
pub mod voice;

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthState, AuthStore, SessionWatcher, UsageLimitConfig, UsageLimiter};
pub use chat::{ChatState, ChatStore, SendOutcome, SendRequest};
pub use completion::{CompletionClient, HttpCompletionClient};
pub use db::{Chat, ConversationStore, IdentityProvider, Message, ProfileStore, Tone, User};
pub use preferences::{PreferenceStore, Preferences};
pub use voice::{VoiceAdapter, VoiceState};

use crate::auth::validation::{validate_sign_in, validate_sign_up};
use crate::db::{MemoryBackend, MemoryIdentityProvider};
use crate::error::AuthError;

/// External services the application talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub completion: Arc<dyn CompletionClient>,
}

impl Collaborators {
    /// In-process identity and storage around the given completion client.
    pub fn in_memory(completion: Arc<dyn CompletionClient>) -> Self {
        let backend = MemoryBackend::shared();
        Self {
            identity: Arc::new(MemoryIdentityProvider::new()),
            profiles: backend.clone(),
            conversations: backend,
            completion,
        }
    }

    /// In-process identity and storage, with the HTTP completion client
    /// built from `settings`.
    pub fn in_memory_with_http(settings: &Settings) -> Result<Self> {
        let client = HttpCompletionClient::new(settings.completion.clone())?;
        Ok(Self::in_memory(Arc::new(client)))
    }
}

/// Application state shared by every screen. Screens read snapshots or
/// subscribe to the stores; all writes go through the intents below.
pub struct App {
    settings: Arc<Settings>,
    identity: Arc<dyn IdentityProvider>,
    pub auth: Arc<AuthStore>,
    pub chat: Arc<ChatStore>,
    pub preferences: Arc<PreferenceStore>,
    pub voice: Option<Arc<VoiceAdapter>>,
    usage: UsageLimiter,
    watcher: Mutex<Option<SessionWatcher>>,
}

impl App {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        let Collaborators {
            identity,
            profiles,
            conversations,
            completion,
        } = collaborators;

        let chat = ChatStore::new(conversations, completion)
            .with_send_timeout(settings.limits.send_timeout())
            .with_max_message_length(settings.limits.max_message_length);

        Self {
            usage: UsageLimiter::new(UsageLimitConfig::from_limits(&settings.limits)),
            auth: Arc::new(AuthStore::new(identity.clone(), profiles)),
            chat: Arc::new(chat),
            preferences: Arc::new(PreferenceStore::default()),
            voice: None,
            identity,
            settings: Arc::new(settings),
            watcher: Mutex::new(None),
        }
    }

    pub fn with_voice(mut self, voice: VoiceAdapter) -> Self {
        self.voice = Some(Arc::new(voice));
        self
    }

    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = Arc::new(PreferenceStore::new(preferences));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Begins mirroring the identity provider's session. Calling it again
    /// while the watcher runs does nothing.
    pub async fn start(&self) {
        let mut watcher = self.watcher.lock().await;
        if watcher.as_ref().map_or(false, SessionWatcher::is_running) {
            return;
        }
        info!("Starting {} session watcher", self.settings.app_name);
        *watcher = Some(SessionWatcher::start(self.identity.clone(), self.auth.clone()));
    }

    pub async fn shutdown(&self) {
        if let Some(mut watcher) = self.watcher.lock().await.take() {
            watcher.stop();
        }
        self.chat.abort_send().await;
    }

    fn signed_in_user(&self) -> Result<User> {
        Ok(self.auth.current_user().ok_or(AuthError::NotSignedIn)?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        if let Err(e) = validate_sign_in(email, password) {
            return Err(self.auth.record_failure(e));
        }
        let user = self.auth.login(email.trim(), password).await?;
        self.chat.abort_send().await;
        self.chat.reset();
        self.preferences.set_tone(user.selected_tone);
        self.load_history(&user).await;
        Ok(user)
    }

    pub async fn register(&self, email: &str, password: &str, confirm_password: &str) -> Result<User> {
        if let Err(e) = validate_sign_up(email, password, confirm_password) {
            return Err(self.auth.record_failure(e));
        }
        let tone = self.preferences.get().selected_tone;
        let user = self.auth.register(email.trim(), password, tone).await?;
        self.chat.abort_send().await;
        self.chat.reset();
        Ok(user)
    }

    pub async fn login_as_guest(&self) -> Result<User> {
        let tone = self.preferences.get().selected_tone;
        let user = self.auth.login_as_guest(tone).await?;
        self.chat.abort_send().await;
        self.chat.reset();
        Ok(user)
    }

    pub async fn logout(&self) -> Result<()> {
        self.chat.abort_send().await;
        self.auth.logout().await?;
        self.chat.reset();
        Ok(())
    }

    async fn load_history(&self, user: &User) {
        if let Err(e) = self.chat.fetch_chats(&user.uid).await {
            warn!("Could not load chats for {}: {}", user.uid, e);
        }
    }

    /// Sends `content` to the active conversation (or a new one when none
    /// is active) in the effective tone, within the daily allowance.
    pub async fn send_message(&self, content: &str, is_voice: bool) -> Result<SendOutcome> {
        let (user, remaining) = match self.admit_send().await {
            Ok(admitted) => admitted,
            Err(e) => return Err(self.chat.record_failure(e)),
        };

        let tone = self.preferences.get().effective_tone(Some(&user));
        let mut request = SendRequest::new(content, user.uid.clone(), tone).voice(is_voice);
        if let Some(chat_id) = self.chat.active_chat_id() {
            request = request.in_chat(chat_id);
        }

        let outcome = self.chat.send_message(request).await?;

        self.usage.record(&user.uid).await;
        if let Err(e) = self.auth.record_usage().await {
            warn!("Could not record usage for {}: {}", user.uid, e);
        }
        info!("{} has {} messages left today", user.uid, remaining.saturating_sub(1));

        self.auto_play(&outcome.ai_message.content).await;
        Ok(outcome)
    }

    async fn admit_send(&self) -> Result<(User, u32)> {
        let user = self.signed_in_user()?;
        let remaining = self.usage.check(&user.uid, self.tier_of(&user)).await?;
        Ok((user, remaining))
    }

    /// Premium allowances only apply while premium features are switched on.
    fn tier_of(&self, user: &User) -> &'static str {
        if self.settings.features.premium {
            user.tier()
        } else {
            "free"
        }
    }

    async fn auto_play(&self, reply: &str) {
        if !self.preferences.get().should_auto_play() || !self.settings.voice_output_enabled() {
            return;
        }
        if let Some(voice) = &self.voice {
            // Failures are already recorded in the voice state.
            let _ = voice.speak(reply).await;
        }
    }

    pub async fn select_chat(&self, chat: Chat) -> Result<Vec<Message>> {
        let chat_id = chat.chat_id.clone();
        self.chat.set_active_chat(Some(chat));
        self.chat.fetch_messages(&chat_id).await
    }

    /// The next send opens a fresh conversation.
    pub fn new_conversation(&self) {
        self.chat.set_active_chat(None);
    }

    pub async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()> {
        self.chat.rename_chat(chat_id, title).await
    }

    pub async fn refresh_history(&self) -> Result<Vec<Chat>> {
        let user = self
            .signed_in_user()
            .map_err(|e| self.chat.record_failure(e))?;
        self.chat.fetch_chats(&user.uid).await
    }

    /// Updates the local preference and, when signed in, the profile.
    pub async fn set_tone(&self, tone: Tone) -> Result<()> {
        self.preferences.set_tone(tone);
        if self.auth.current_user().is_some() {
            self.auth.update_tone(tone).await?;
        }
        Ok(())
    }

    pub fn toggle_dark_mode(&self) -> Preferences {
        self.preferences.toggle_dark_mode()
    }

    pub fn toggle_voice(&self) -> Preferences {
        let prefs = self.preferences.toggle_voice();
        if !prefs.voice_enabled {
            if let Some(voice) = &self.voice {
                voice.stop_speaking();
            }
        }
        prefs
    }

    pub fn toggle_auto_play(&self) -> Preferences {
        self.preferences.toggle_auto_play()
    }
}
