use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::service::AuthStore;
use crate::db::backend::IdentityProvider;

/// Process-wide subscriber to the identity provider's session changes.
///
/// A signed-in session loads (or creates) the profile into the [`AuthStore`];
/// a signed-out session clears it. The current session is handled right after
/// `start`, which is what ends the store's initial loading state.
pub struct SessionWatcher {
    handle: Option<JoinHandle<()>>,
}

impl SessionWatcher {
    pub fn start(identity: Arc<dyn IdentityProvider>, auth: Arc<AuthStore>) -> Self {
        let mut sessions = identity.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                let current = sessions.borrow_and_update().clone();
                match current {
                    Some(identity) => {
                        info!("Session active for {}", identity.uid);
                        if let Err(e) = auth.fetch_current_user(&identity).await {
                            warn!("Could not load profile for {}: {}", identity.uid, e);
                        }
                    }
                    None => {
                        info!("Session ended");
                        auth.clear_user();
                    }
                }

                if sessions.changed().await.is_err() {
                    info!("Identity provider dropped, session watcher exiting");
                    break;
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::backend::ProfileStore;
    use crate::db::memory::{MemoryBackend, MemoryIdentityProvider};
    use crate::db::models::Tone;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn wait_for<F>(auth: &AuthStore, predicate: F)
    where
        F: Fn(&crate::auth::AuthState) -> bool,
    {
        let mut rx = auth.subscribe();
        timeout(Duration::from_secs(2), async {
            loop {
                if predicate(&rx.borrow_and_update()) {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .expect("state never reached");
    }

    #[tokio::test]
    async fn test_watcher_tracks_session() {
        let identity = Arc::new(MemoryIdentityProvider::new());
        let backend = MemoryBackend::shared();
        let auth = Arc::new(AuthStore::new(identity.clone(), backend.clone()));

        let mut watcher = SessionWatcher::start(identity.clone(), auth.clone());
        assert!(watcher.is_running());
        wait_for(&auth, |s| !s.is_loading).await;
        assert!(auth.current_user().is_none());

        // A session opened directly at the provider still gets a profile.
        let guest = identity.sign_in_anonymously().await.unwrap();
        wait_for(&auth, |s| s.user.as_ref().map(|u| &u.uid) == Some(&guest.uid)).await;
        assert!(auth.state().is_guest);
        assert_eq!(auth.current_user().unwrap().selected_tone, Tone::Friendly);

        identity.sign_out().await.unwrap();
        wait_for(&auth, |s| s.user.is_none()).await;

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_watcher_keeps_registered_tone() {
        let identity = Arc::new(MemoryIdentityProvider::new());
        let backend = MemoryBackend::shared();
        let auth = Arc::new(AuthStore::new(identity.clone(), backend.clone()));
        let _watcher = SessionWatcher::start(identity.clone(), auth.clone());

        let user = auth.register("t@t.io", "secret1", Tone::Tutor).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stored = backend.get_profile(&user.uid).await.unwrap().unwrap();
        assert_eq!(stored.selected_tone, Tone::Tutor);
        assert_eq!(auth.current_user().unwrap().selected_tone, Tone::Tutor);
    }
}
