//! Data model and persistence for ChatMate.
//!
//! The identity provider, profile records and conversation records are
//! external services; this module defines their contracts and ships an
//! in-memory implementation of each.

pub mod backend;
pub mod memory;
pub mod models;

pub use backend::{ConversationStore, IdentityProvider, ProfileStore};
pub use memory::{MemoryBackend, MemoryIdentityProvider};
pub use models::{Chat, Identity, Message, NewMessage, Sender, Tone, User};
