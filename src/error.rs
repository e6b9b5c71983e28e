use std::time::Duration;
use thiserror::Error;

/// Every failure in the client surfaces as one of these. State containers keep
/// the `Display` form as their `error` string.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    AuthError(#[from] AuthError),

    #[error("{0}")]
    CompletionError(#[from] CompletionError),

    #[error("{0}")]
    StoreError(#[from] StoreError),

    #[error("{0}")]
    VoiceError(#[from] VoiceError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request was cancelled")]
    Aborted,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::ValidationError(message.into())
    }

    /// Validation failures never reached the network.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::ValidationError(_))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::CompletionError(CompletionError::RequestFailed("request timed out".into()))
        } else {
            AppError::CompletionError(CompletionError::RequestFailed(err.to_string()))
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account already exists for this email")]
    EmailInUse,

    #[error("User data not found")]
    ProfileNotFound,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Daily message limit ({limit}) reached. {hint}")]
    UsageLimitReached { limit: u32, hint: &'static str },

    #[error("Authentication failed: {0}")]
    Provider(String),
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("Write rejected: {0}")]
    WriteFailed(String),
}

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Failed to start recording. Please check microphone permissions.")]
    PermissionDenied,

    #[error("Recording failed: {0}")]
    Recording(String),

    #[error("Speech failed: {0}")]
    Speech(String),

    #[error("Audio playback failed: {0}")]
    Playback(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let store_err = StoreError::ChatNotFound("abc".into());
        let app_err: AppError = store_err.into();
        assert!(matches!(app_err, AppError::StoreError(StoreError::ChatNotFound(_))));
    }

    #[test]
    fn test_error_display() {
        let err = AppError::validation("Please fill in all fields");
        assert_eq!(err.to_string(), "Please fill in all fields");
        assert!(err.is_validation());

        let err = AppError::CompletionError(CompletionError::Status {
            status: 500,
            message: "Unknown error".into(),
        });
        assert_eq!(err.to_string(), "API error: 500 - Unknown error");

        let err = AppError::VoiceError(VoiceError::PermissionDenied);
        assert_eq!(
            err.to_string(),
            "Failed to start recording. Please check microphone permissions."
        );

        let err = AppError::AuthError(AuthError::UsageLimitReached {
            limit: 50,
            hint: "Upgrade to premium for more messages!",
        });
        assert_eq!(
            err.to_string(),
            "Daily message limit (50) reached. Upgrade to premium for more messages!"
        );
    }
}
