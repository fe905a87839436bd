// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Request validation module.

use lightnovel_common::{AuthCredentials, UserMetadata};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::auth::password::PasswordPolicy;

// Common validation constants
pub const USERNAME_MIN_LENGTH: usize = 3;
pub const USERNAME_MAX_LENGTH: usize = 32;
pub const DISPLAY_NAME_MIN_LENGTH: usize = 3;
pub const DISPLAY_NAME_MAX_LENGTH: usize = 64;
pub const DEVICE_NAME_MAX_LENGTH: usize = 255;
pub const EMAIL_MAX_LENGTH: usize = 255;
pub const IMAGE_URL_MAX_LENGTH: usize = 255;

// Regex patterns for validation
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]{3,32}$").expect("valid username pattern"));
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

/// Possible validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid device name: {0}")]
    InvalidDeviceName(String),

    #[error("Invalid display name: {0}")]
    InvalidDisplayName(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid session token: {0}")]
    InvalidSessionToken(String),
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::InvalidUsername(_) => "VAL_002",
            ValidationError::InvalidPassword(_) => "VAL_003",
            ValidationError::InvalidDeviceName(_) => "VAL_004",
            ValidationError::InvalidDisplayName(_) => "VAL_005",
            ValidationError::InvalidEmail(_) => "VAL_006",
            ValidationError::InvalidImage(_) => "VAL_007",
            ValidationError::InvalidSessionToken(_) => "VAL_008",
        }
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

fn is_printable(c: char) -> bool {
    c == ' ' || !(c.is_control() || c.is_whitespace())
}

/// Strip non-printable characters from both ends
pub fn trim_unprintable(value: &str) -> &str {
    value.trim_matches(|c: char| !is_printable(c))
}

/// Validate a username
pub fn validate_username(username: &str) -> ValidationResult<&str> {
    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::InvalidUsername(format!(
            "username must contain between {USERNAME_MIN_LENGTH} and {USERNAME_MAX_LENGTH} ASCII letters"
        )));
    }
    Ok(username)
}

/// Validate a device label
pub fn validate_device_name(device_name: &str) -> ValidationResult<&str> {
    if device_name.chars().count() > DEVICE_NAME_MAX_LENGTH {
        return Err(ValidationError::InvalidDeviceName(format!(
            "device name cannot exceed {DEVICE_NAME_MAX_LENGTH} characters"
        )));
    }
    Ok(device_name)
}

/// Validate a display name
pub fn validate_display_name(display_name: &str) -> ValidationResult<&str> {
    let len = display_name.chars().count();
    if !(DISPLAY_NAME_MIN_LENGTH..=DISPLAY_NAME_MAX_LENGTH).contains(&len) {
        return Err(ValidationError::InvalidDisplayName(format!(
            "display name must contain between {DISPLAY_NAME_MIN_LENGTH} and {DISPLAY_NAME_MAX_LENGTH} characters"
        )));
    }
    if !display_name.chars().all(is_printable) {
        return Err(ValidationError::InvalidDisplayName(
            "display name must only contain printable characters".to_string(),
        ));
    }
    Ok(display_name)
}

/// Validate an email address; an empty address means "none"
pub fn validate_email(email: &str) -> ValidationResult<&str> {
    if email.is_empty() {
        return Ok(email);
    }
    if email.chars().count() > EMAIL_MAX_LENGTH {
        return Err(ValidationError::InvalidEmail(format!(
            "email cannot exceed {EMAIL_MAX_LENGTH} characters"
        )));
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail(
            "email must be a valid address".to_string(),
        ));
    }
    Ok(email)
}

/// Validate an avatar image URL
pub fn validate_image_url(image: &str) -> ValidationResult<&str> {
    if image.chars().count() > IMAGE_URL_MAX_LENGTH {
        return Err(ValidationError::InvalidImage(format!(
            "image URL cannot exceed {IMAGE_URL_MAX_LENGTH} characters"
        )));
    }
    Ok(image)
}

/// Normalise and validate login/register credentials
pub fn validate_credentials(
    credentials: AuthCredentials,
    policy: &PasswordPolicy,
) -> ValidationResult<AuthCredentials> {
    let username = trim_unprintable(&credentials.username).to_string();
    let device_name = trim_unprintable(&credentials.device_name).to_string();

    validate_device_name(&device_name)?;
    validate_username(&username)?;
    policy.check(&credentials.password)?;

    Ok(AuthCredentials {
        username,
        password: credentials.password,
        device_name,
    })
}

/// Normalise and validate profile metadata
pub fn validate_metadata(metadata: UserMetadata) -> ValidationResult<UserMetadata> {
    let metadata = UserMetadata {
        username: trim_unprintable(&metadata.username).to_string(),
        display_name: metadata.display_name.trim().to_string(),
        email: metadata.email.trim().to_string(),
        image: metadata.image.trim().to_string(),
    };

    validate_username(&metadata.username)?;
    validate_display_name(&metadata.display_name)?;
    validate_email(&metadata.email)?;
    validate_image_url(&metadata.image)?;

    Ok(metadata)
}
