use lazy_static::lazy_static;
use regex::Regex;

use crate::{ClientError, ClientResult};

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").unwrap();
}

pub const MIN_PASSWORD_LENGTH: usize = 6;

pub fn validate_email(email: &str) -> ClientResult<()> {
    if !EMAIL.is_match(email.trim()) {
        return Err(ClientError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> ClientResult<()> {
    if password.is_empty() {
        return Err(ClientError::Validation("Please enter your password".to_string()));
    }

    Ok(())
}

/// For passwords that are being set, rather than checked
pub fn validate_new_password(password: &str) -> ClientResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ClientError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    Ok(())
}

pub fn validate_name(name: &str) -> ClientResult<()> {
    if name.trim().is_empty() {
        return Err(ClientError::Validation("Please enter your name".to_string()));
    }

    Ok(())
}

/// Fails with a validation error naming the field when the text is blank
pub fn require_text(field: &str, value: &str) -> ClientResult<()> {
    if value.trim().is_empty() {
        return Err(ClientError::Validation(format!("{} is required", field)));
    }

    Ok(())
}
