use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::db::backend::{IdentityProvider, ProfileStore};
use crate::db::models::{Identity, Tone, User};
use crate::error::{AppError, AuthError};
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_guest: bool,
    /// True until the first session notification has been handled.
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_guest: false,
            is_loading: true,
            error: None,
        }
    }
}

/// Mirrors the identity provider's session and the matching profile record.
pub struct AuthStore {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    state: watch::Sender<AuthState>,
    // Serialises explicit sign-in flows with session-watcher refreshes.
    ops: Mutex<()>,
}

impl AuthStore {
    pub fn new(identity: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            identity,
            profiles,
            state,
            ops: Mutex::new(()),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn identity_provider(&self) -> Arc<dyn IdentityProvider> {
        self.identity.clone()
    }

    fn set_user(&self, user: Option<User>) {
        self.state.send_modify(|s| {
            s.is_authenticated = user.is_some();
            s.is_guest = user.as_ref().map_or(false, User::is_guest);
            s.user = user;
            s.is_loading = false;
        });
    }

    fn begin(&self) {
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    fn fail(&self, action: &str, e: AppError) -> AppError {
        error!("{} failed: {}", action, e);
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.error = Some(e.to_string());
        });
        e
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let _op = self.ops.lock().await;
        self.begin();
        match self.sign_in(email, password).await {
            Ok(user) => {
                info!("Signed in {}", user.uid);
                self.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(e) => Err(self.fail("Sign in", e)),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let identity = self.identity.sign_in(email, password).await?;
        let profile = self.profiles.get_profile(&identity.uid).await?;
        Ok(profile.ok_or(AuthError::ProfileNotFound)?)
    }

    pub async fn register(&self, email: &str, password: &str, tone: Tone) -> Result<User> {
        let _op = self.ops.lock().await;
        self.begin();
        let result = async {
            let identity = self.identity.create_account(email, password).await?;
            self.profiles.put_profile(&User::new(&identity, tone)).await
        }
        .await;

        match result {
            Ok(user) => {
                info!("Registered {}", user.uid);
                self.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(e) => Err(self.fail("Sign up", e)),
        }
    }

    pub async fn login_as_guest(&self, tone: Tone) -> Result<User> {
        let _op = self.ops.lock().await;
        self.begin();
        let result = async {
            let identity = self.identity.sign_in_anonymously().await?;
            self.profiles.put_profile(&User::new(&identity, tone)).await
        }
        .await;

        match result {
            Ok(user) => {
                info!("Guest session {}", user.uid);
                self.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(e) => Err(self.fail("Guest sign in", e)),
        }
    }

    pub async fn logout(&self) -> Result<()> {
        let _op = self.ops.lock().await;
        self.begin();
        match self.identity.sign_out().await {
            Ok(()) => {
                self.set_user(None);
                Ok(())
            }
            Err(e) => Err(self.fail("Sign out", e)),
        }
    }

    /// Loads the profile for a signed-in session, creating it when the
    /// provider knows the identity but no record exists yet.
    pub async fn fetch_current_user(&self, identity: &Identity) -> Result<User> {
        let _op = self.ops.lock().await;
        let result = match self.profiles.get_profile(&identity.uid).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                warn!("No profile for {}, creating one", identity.uid);
                self.profiles
                    .put_profile(&User::new(identity, Tone::default()))
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(user) => {
                self.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(e) => Err(self.fail("Fetch user", e)),
        }
    }

    /// Session ended outside an explicit logout.
    pub fn clear_user(&self) {
        self.set_user(None);
    }

    pub async fn update_tone(&self, tone: Tone) -> Result<()> {
        let uid = self
            .current_user()
            .map(|u| u.uid)
            .ok_or(AuthError::NotSignedIn)?;
        if let Err(e) = self.profiles.update_tone(&uid, tone).await {
            return Err(self.fail("Tone update", e));
        }
        self.state.send_modify(|s| {
            if let Some(user) = s.user.as_mut() {
                user.selected_tone = tone;
            }
        });
        Ok(())
    }

    /// Bumps the profile's daily usage counter after a successful send.
    pub async fn record_usage(&self) -> Result<u32> {
        let uid = self
            .current_user()
            .map(|u| u.uid)
            .ok_or(AuthError::NotSignedIn)?;
        let usage = self.profiles.increment_usage(&uid).await?;
        self.state.send_modify(|s| {
            if let Some(user) = s.user.as_mut() {
                user.daily_usage = usage;
            }
        });
        Ok(usage)
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }

    /// Surfaces a failure raised before the provider was reached, e.g. a
    /// form that did not validate.
    pub(crate) fn record_failure(&self, e: AppError) -> AppError {
        warn!("Auth intent refused: {}", e);
        self.state.send_modify(|s| s.error = Some(e.to_string()));
        e
    }
}
