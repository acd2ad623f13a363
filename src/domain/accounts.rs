//! Account credential rules.

use super::error::DomainError;

pub const MAX_USERNAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Usernames that would shadow a fixed top-level route.
const RESERVED_USERNAMES: &[&str] = &["new", "follow", "group", "auth", "media", "_health"];

/// Validate a username for signup and return it trimmed.
pub fn normalize_username(raw: &str) -> Result<String, DomainError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username", "This field is required."));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(DomainError::validation(
            "username",
            format!("Ensure this value has at most {MAX_USERNAME_LEN} characters."),
        ));
    }
    if !username.chars().all(is_username_char) {
        return Err(DomainError::validation(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }
    if RESERVED_USERNAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(username))
    {
        return Err(DomainError::validation(
            "username",
            "This username is not available.",
        ));
    }
    Ok(username.to_string())
}

/// Validate a new password against its confirmation.
pub fn check_new_password(password: &str, confirmation: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(
            "password",
            format!("This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."),
        ));
    }
    if password != confirmation {
        return Err(DomainError::validation(
            "password_confirmation",
            "The two password fields didn't match.",
        ));
    }
    Ok(())
}

/// Whether `next` may be used as a post-login redirect target.
///
/// Browsers drop tabs and newlines from URLs, so `/\t/host` would
/// become protocol-relative; whitespace and control characters are refused.
pub fn is_local_redirect(next: &str) -> bool {
    next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.chars().any(|ch| ch.is_control() || ch.is_whitespace())
}

fn is_username_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_')
}
