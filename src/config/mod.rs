use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub const ENV_PREFIX: &str = "chatmate";

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub model: String,
    pub openai_url: String,
    pub openrouter_url: String,
    pub openrouter_model: String,
    /// Sent as `HTTP-Referer` to the alternate provider.
    pub referer: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub free_daily_messages: u32,
    pub premium_daily_messages: u32,
    pub max_message_length: usize,
    pub send_timeout_secs: u64,
}

impl LimitsConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeaturesConfig {
    pub voice: bool,
    pub tts: bool,
    pub premium: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub app_name: String,
    pub completion: CompletionConfig,
    pub backend: BackendConfig,
    pub limits: LimitsConfig,
    pub features: FeaturesConfig,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("environment", "development")?
        .set_default("app_name", "ChatMate")?
        .set_default("completion.api_key", "")?
        .set_default("completion.model", "gpt-3.5-turbo")?
        .set_default("completion.openai_url", "https://api.openai.com/v1/chat/completions")?
        .set_default("completion.openrouter_url", "https://openrouter.ai/api/v1/chat/completions")?
        .set_default("completion.openrouter_model", "openai/gpt-3.5-turbo")?
        .set_default("completion.referer", "https://chatmate.app")?
        .set_default("completion.max_tokens", 1000)?
        .set_default("completion.temperature", 0.7)?
        .set_default("completion.timeout_secs", 30)?
        .set_default("backend.url", "")?
        .set_default("backend.anon_key", "")?
        .set_default("limits.free_daily_messages", 50)?
        .set_default("limits.premium_daily_messages", 1000)?
        .set_default("limits.max_message_length", 1000)?
        .set_default("limits.send_timeout_secs", 60)?
        .set_default("features.voice", true)?
        .set_default("features.tts", true)?
        .set_default("features.premium", false)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // `CHATMATE_COMPLETION__API_KEY=sk-...` sets `Settings.completion.api_key`
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only, with a short send timeout. Ignores files and the environment.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        with_defaults()?
            .set_override("environment", "test")?
            .set_override("completion.api_key", "sk-test-key")?
            .set_override("limits.send_timeout_secs", 5)?
            .build()?
            .try_deserialize()
    }

    pub fn voice_output_enabled(&self) -> bool {
        self.features.voice && self.features.tts
    }

    /// Environment keys of the credentials that are still empty.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        [
            ("CHATMATE_BACKEND__URL", &self.backend.url),
            ("CHATMATE_BACKEND__ANON_KEY", &self.backend.anon_key),
            ("CHATMATE_COMPLETION__API_KEY", &self.completion.api_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect()
    }
}
