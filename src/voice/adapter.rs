use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{AppError, VoiceError};
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOptions {
    pub rate: f32,
    pub pitch: f32,
    pub language: String,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            language: "en-US".to_string(),
        }
    }
}

/// Device microphone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    async fn request_permission(&self) -> Result<bool>;

    async fn start(&self) -> Result<()>;

    /// Locator of the finished recording, if one was produced.
    async fn stop(&self) -> Result<Option<String>>;

    async fn cancel(&self) -> Result<()>;
}

/// Device text-to-speech. `speak` resolves when the utterance finishes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str, options: &SpeechOptions) -> Result<()>;

    fn stop(&self);

    async fn is_speaking(&self) -> bool;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, uri: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceState {
    pub is_recording: bool,
    pub is_playing: bool,
    pub last_recording: Option<String>,
    pub error: Option<String>,
}

/// Push-to-talk recording and speech output. Failures land in `error` and
/// reset the matching flag, so the state never stays stuck.
pub struct VoiceAdapter {
    recorder: Arc<dyn AudioRecorder>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    options: SpeechOptions,
    state: watch::Sender<VoiceState>,
}

impl VoiceAdapter {
    pub fn new(
        recorder: Arc<dyn AudioRecorder>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
    ) -> Self {
        let (state, _) = watch::channel(VoiceState::default());
        Self {
            recorder,
            synthesizer,
            player,
            options: SpeechOptions::default(),
            state,
        }
    }

    pub fn with_speech_options(mut self, options: SpeechOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> VoiceState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceState> {
        self.state.subscribe()
    }

    fn record_error(&self, e: &AppError, reset: impl FnOnce(&mut VoiceState)) {
        error!("Voice failure: {}", e);
        self.state.send_modify(|s| {
            reset(s);
            s.error = Some(e.to_string());
        });
    }

    pub async fn start_recording(&self) -> Result<()> {
        self.state.send_modify(|s| s.error = None);

        let result = async {
            if !self.recorder.request_permission().await? {
                return Err(AppError::VoiceError(VoiceError::PermissionDenied));
            }
            self.recorder.start().await
        }
        .await;

        match result {
            Ok(()) => {
                info!("Recording started");
                self.state.send_modify(|s| s.is_recording = true);
                Ok(())
            }
            Err(e) => {
                self.record_error(&e, |s| s.is_recording = false);
                Err(e)
            }
        }
    }

    pub async fn stop_recording(&self) -> Option<String> {
        match self.recorder.stop().await {
            Ok(uri) => {
                info!("Recording stopped: {:?}", uri);
                self.state.send_modify(|s| {
                    s.is_recording = false;
                    s.last_recording = uri.clone();
                });
                uri
            }
            Err(e) => {
                self.record_error(&e, |s| {
                    s.is_recording = false;
                    s.last_recording = None;
                });
                None
            }
        }
    }

    pub async fn cancel_recording(&self) {
        if let Err(e) = self.recorder.cancel().await {
            error!("Failed to cancel recording: {}", e);
        }
        self.state.send_modify(|s| {
            s.is_recording = false;
            s.last_recording = None;
        });
    }

    pub async fn speak(&self, text: &str) -> Result<()> {
        self.state.send_modify(|s| {
            s.error = None;
            s.is_playing = true;
        });

        match self.synthesizer.speak(text, &self.options).await {
            Ok(()) => {
                self.state.send_modify(|s| s.is_playing = false);
                Ok(())
            }
            Err(e) => {
                self.record_error(&e, |s| s.is_playing = false);
                Err(e)
            }
        }
    }

    pub async fn is_speaking(&self) -> bool {
        self.synthesizer.is_speaking().await
    }

    pub fn stop_speaking(&self) {
        self.synthesizer.stop();
        self.state.send_modify(|s| s.is_playing = false);
    }

    pub async fn play_audio(&self, uri: &str) -> Result<()> {
        self.state.send_modify(|s| {
            s.error = None;
            s.is_playing = true;
        });

        match self.player.play(uri).await {
            Ok(()) => {
                self.state.send_modify(|s| s.is_playing = false);
                Ok(())
            }
            Err(e) => {
                self.record_error(&e, |s| s.is_playing = false);
                Err(e)
            }
        }
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }
}
