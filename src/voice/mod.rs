//! Voice input and output behind device-facing traits.

mod adapter;

pub use adapter::{
    AudioPlayer, AudioRecorder, SpeechOptions, SpeechSynthesizer, VoiceAdapter, VoiceState,
};

#[cfg(test)]
pub use adapter::{MockAudioPlayer, MockAudioRecorder, MockSpeechSynthesizer};
