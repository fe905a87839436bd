// ============================
// lightnovel-backend/src/auth/password.rs
// ============================
//! Password hashing and verification.
use scrypt::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Params, Scrypt,
};
use thiserror::Error;

use crate::validation::ValidationError;

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest password accepted, in bytes
pub const HASH_INPUT_LIMIT: usize = 72;

const SALT_BYTES: usize = 16;

/// Errors raised while hashing
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("invalid scrypt parameters: {0}")]
    InvalidParams(String),

    #[error("hashing failed: {0}")]
    Hash(String),
}

/// Length bounds applied before a password ever reaches the hasher
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            max_length: HASH_INPUT_LIMIT,
        }
    }
}

impl PasswordPolicy {
    /// Check if a password fits the policy
    pub fn check(&self, password: &str) -> Result<(), ValidationError> {
        if password.len() < self.min_length || password.len() > self.max_length {
            return Err(ValidationError::InvalidPassword(format!(
                "password must contain between {} and {} characters",
                self.min_length, self.max_length
            )));
        }
        Ok(())
    }
}

/// Slow salted one-way hashing of account passwords.
///
/// `verify` must take the same time whether or not an account was found, so
/// callers without a stored hash verify against [`CredentialVerifier::placeholder_hash`].
pub trait CredentialVerifier: Send + Sync {
    /// Hash a plaintext password into a PHC string
    fn hash(&self, password: &str) -> Result<String, PasswordError>;

    /// Check a plaintext password against a PHC string
    fn verify(&self, password: &str, hash: &str) -> bool;

    /// A hash no password is expected to match, produced with the live parameters
    fn placeholder_hash(&self) -> &str;
}

/// scrypt-backed [`CredentialVerifier`]
#[derive(Debug, Clone)]
pub struct ScryptVerifier {
    params: Params,
    placeholder: String,
}

impl ScryptVerifier {
    /// Create a verifier with cost `2^log_n`
    pub fn new(log_n: u8) -> Result<Self, PasswordError> {
        let params = Params::new(log_n, 8, 1, Params::RECOMMENDED_LEN)
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        let placeholder = hash_with(&params, &hex::encode(rand::random::<[u8; 32]>()))?;
        Ok(Self { params, placeholder })
    }
}

fn hash_with(params: &Params, plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; SALT_BYTES]>())
        .map_err(|e| PasswordError::Hash(e.to_string()))?;
    let hash = Scrypt
        .hash_password_customized(plain.as_bytes(), None, None, *params, &salt)
        .map_err(|e| PasswordError::Hash(e.to_string()))?
        .to_string();
    Ok(hash)
}

impl CredentialVerifier for ScryptVerifier {
    fn hash(&self, password: &str) -> Result<String, PasswordError> {
        hash_with(&self.params, password)
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => {
                // Corrupt stored hash: still spend the time of a real comparison
                tracing::warn!("stored password hash could not be parsed");
                if let Ok(placeholder) = PasswordHash::new(&self.placeholder) {
                    let _ = Scrypt.verify_password(password.as_bytes(), &placeholder);
                }
                return false;
            },
        };
        Scrypt.verify_password(password.as_bytes(), &parsed_hash).is_ok()
    }

    fn placeholder_hash(&self) -> &str {
        &self.placeholder
    }
}
