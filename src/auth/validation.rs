//! Form checks that run before any call to the identity provider.

use crate::error::AppError;
use crate::Result;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_sign_in(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::validation("Please fill in all fields"));
    }
    Ok(())
}

pub fn validate_sign_up(email: &str, password: &str, confirm_password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() || confirm_password.is_empty() {
        return Err(AppError::validation("Please fill in all fields"));
    }
    if password != confirm_password {
        return Err(AppError::validation("Passwords do not match"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
