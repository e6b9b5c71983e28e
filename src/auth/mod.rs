//! Authentication state for ChatMate.
//!
//! Mirrors the identity provider's session into local state, runs the
//! sign-in / sign-up / guest / sign-out flows, and enforces daily usage.

mod service;
mod session;
pub mod usage;
pub mod validation;

pub use service::{AuthState, AuthStore};
pub use session::SessionWatcher;
pub use usage::{UsageLimitConfig, UsageLimiter};
