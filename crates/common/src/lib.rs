// ================
// crates/common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between light-novel clients and the account server.
//! This module defines the JSON request and response bodies of the account API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of a hex-encoded identifier on the wire (16 raw bytes)
pub const ID_HEX_LENGTH: usize = 32;

/// Credentials sent to `/accounts/login` and `/accounts/register`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthCredentials {
    /// Account name, ASCII letters only
    pub username: String,
    /// Plaintext password, hashed on arrival
    pub password: String,
    /// Free-text label of the device the session is for
    #[serde(default)]
    pub device_name: String,
}

/// A freshly issued session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Hex-encoded session token
    pub session: String,
    /// When the token stops being valid unless it is renewed
    pub expired_at: DateTime<Utc>,
}

/// Body carrying nothing but a session token (logout, renew, self)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionRequest {
    pub session: String,
}

/// Body of `/accounts/changepassword`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub session: String,
    pub old_password: String,
    pub new_password: String,
}

/// Body of `/accounts/delete`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeleteAccountRequest {
    pub session: String,
    pub password: String,
}

/// Editable profile fields of an account
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserMetadata {
    pub username: String,
    #[serde(alias = "displayname")]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub image: String,
}

/// Body of `/accounts/update`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateMetadataRequest {
    pub session: String,
    #[serde(flatten)]
    pub metadata: UserMetadata,
}

/// Public view of an account
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// Hex-encoded account id
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

/// Error envelope returned by every failing endpoint
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Stable error code plus a client-safe message
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
