//! Completion endpoint access: the client contract, the HTTP client that
//! picks between the two supported providers, and the per-tone system prompts.

mod client;
pub mod prompts;

pub use client::{
    ChatTurn, CompletionClient, CompletionRequest, HttpCompletionClient, Provider, Role,
    FALLBACK_REPLY, OPENROUTER_KEY_PREFIX,
};

#[cfg(test)]
pub use client::MockCompletionClient;
