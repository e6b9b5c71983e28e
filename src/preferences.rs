//! Client-local preferences: tone, theme, voice and auto-play.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::db::models::{Tone, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub selected_tone: Tone,
    pub dark_mode: bool,
    pub voice_enabled: bool,
    pub auto_play_responses: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            selected_tone: Tone::Friendly,
            dark_mode: true,
            voice_enabled: true,
            auto_play_responses: false,
        }
    }
}

impl Preferences {
    /// The signed-in profile's tone wins; the local tone covers signed-out use.
    pub fn effective_tone(&self, profile: Option<&User>) -> Tone {
        profile.map_or(self.selected_tone, |u| u.selected_tone)
    }

    pub fn should_auto_play(&self) -> bool {
        self.voice_enabled && self.auto_play_responses
    }
}

pub struct PreferenceStore {
    state: watch::Sender<Preferences>,
}

impl PreferenceStore {
    pub fn new(initial: Preferences) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    pub fn get(&self) -> Preferences {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut Preferences)) -> Preferences {
        self.state.send_modify(f);
        let prefs = self.get();
        debug!("Preferences now {:?}", prefs);
        prefs
    }

    pub fn set_tone(&self, tone: Tone) -> Preferences {
        self.update(|p| p.selected_tone = tone)
    }

    pub fn toggle_dark_mode(&self) -> Preferences {
        self.update(|p| p.dark_mode = !p.dark_mode)
    }

    pub fn set_dark_mode(&self, on: bool) -> Preferences {
        self.update(|p| p.dark_mode = on)
    }

    pub fn toggle_voice(&self) -> Preferences {
        self.update(|p| p.voice_enabled = !p.voice_enabled)
    }

    pub fn set_voice_enabled(&self, on: bool) -> Preferences {
        self.update(|p| p.voice_enabled = on)
    }

    pub fn toggle_auto_play(&self) -> Preferences {
        self.update(|p| p.auto_play_responses = !p.auto_play_responses)
    }

    pub fn set_auto_play(&self, on: bool) -> Preferences {
        self.update(|p| p.auto_play_responses = on)
    }

    pub fn reset(&self) -> Preferences {
        self.update(|p| *p = Preferences::default())
    }
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new(Preferences::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Identity;

    #[test]
    fn test_defaults() {
        let prefs = PreferenceStore::default().get();
        assert_eq!(prefs.selected_tone, Tone::Friendly);
        assert!(prefs.dark_mode);
        assert!(prefs.voice_enabled);
        assert!(!prefs.auto_play_responses);
        assert!(!prefs.should_auto_play());
    }

    #[test]
    fn test_double_toggle_restores_dark_mode() {
        let store = PreferenceStore::default();
        let original = store.get().dark_mode;
        assert_ne!(store.toggle_dark_mode().dark_mode, original);
        assert_eq!(store.toggle_dark_mode().dark_mode, original);
    }

    #[test]
    fn test_auto_play_needs_voice() {
        let store = PreferenceStore::default();
        assert!(store.set_auto_play(true).should_auto_play());
        assert!(!store.toggle_voice().should_auto_play());
        assert_eq!(store.reset(), Preferences::default());
    }

    #[test]
    fn test_profile_tone_wins() {
        let store = PreferenceStore::default();
        store.set_tone(Tone::Professional);
        let prefs = store.get();
        assert_eq!(prefs.effective_tone(None), Tone::Professional);

        let user = User::new(&Identity { uid: "u".into(), email: None }, Tone::Tutor);
        assert_eq!(prefs.effective_tone(Some(&user)), Tone::Tutor);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = PreferenceStore::default();
        let mut rx = store.subscribe();
        store.set_voice_enabled(false);
        rx.changed().await.unwrap();
        assert!(!rx.borrow().voice_enabled);
    }
}
