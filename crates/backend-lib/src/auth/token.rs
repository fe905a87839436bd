// ============================
// crates/backend-lib/src/auth/token.rs
// ============================
/** Opaque 128-bit identifiers for sessions and accounts.
Both are random, travel as 32 lowercase hex characters and are stored
as raw bytes. */
use std::fmt;
use std::str::FromStr;

use lightnovel_common::ID_HEX_LENGTH;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::ValidationError;

/// Raw size of an identifier in bytes
pub const ID_BYTES: usize = 16;

/// Session token issued to a logged-in device
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken([u8; ID_BYTES]);

impl SessionToken {
    /** Generate a cryptographically secure random token
    # Returns
    A token carrying 128 bits of entropy */
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    /// Lowercase hex form used on the wire
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for SessionToken {
    type Err = ValidationError;

    /// Accepts exactly 32 hex characters in either case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_HEX_LENGTH {
            return Err(ValidationError::InvalidSessionToken(format!(
                "session token must be {ID_HEX_LENGTH} hex characters"
            )));
        }
        let mut bytes = [0u8; ID_BYTES];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| {
            ValidationError::InvalidSessionToken("session token must be hexadecimal".to_string())
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// Tokens are credentials; keep them out of logs
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({}…)", &self.to_hex()[..6])
    }
}

/// Account identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        self.0.as_bytes()
    }

    /// Lowercase hex form used on the wire
    pub fn to_hex(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation() {
        let token1 = SessionToken::generate();
        let token2 = SessionToken::generate();

        assert_ne!(token1, token2);
        assert_eq!(token1.to_hex().len(), ID_HEX_LENGTH);
        assert!(token1
            .to_hex()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_token_hex_round_trip() {
        let token = SessionToken::generate();
        let hex = token.to_hex();
        let parsed: SessionToken = hex.parse().unwrap();
        assert_eq!(parsed, token);
        assert_eq!(parsed.as_bytes().len(), ID_BYTES);
        assert_eq!(parsed.to_hex(), hex);

        // Upper-case input decodes to the same bytes and re-encodes lowercase
        let upper: SessionToken = hex.to_uppercase().parse().unwrap();
        assert_eq!(upper, token);
        assert!(upper.to_hex().eq_ignore_ascii_case(&hex.to_uppercase()));
    }

    #[test]
    fn test_token_rejects_wrong_shape() {
        assert!("".parse::<SessionToken>().is_err());
        assert!("abcd".parse::<SessionToken>().is_err());
        assert!("0".repeat(33).parse::<SessionToken>().is_err());
        assert!("0".repeat(31).parse::<SessionToken>().is_err());
        assert!("zz".repeat(16).parse::<SessionToken>().is_err());
        // 32 bytes of multi-byte characters must not slip through
        assert!("é".repeat(16).parse::<SessionToken>().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = SessionToken::generate();
        let debug = format!("{token:?}");
        assert!(!debug.contains(&token.to_hex()));
    }

    #[test]
    fn test_account_id_round_trip() {
        let id = AccountId::generate();
        let encoded = id.to_hex();
        assert_eq!(encoded.len(), ID_HEX_LENGTH);
        assert_eq!(hex::decode(&encoded).unwrap(), id.as_bytes().to_vec());
        assert_eq!(id.to_string(), encoded);
    }
}
